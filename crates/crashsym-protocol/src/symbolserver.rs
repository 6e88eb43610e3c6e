//! Payloads of the system symbol lookup service.

use serde::{Deserialize, Serialize};

use crate::hex::HexValue;

/// One address to look up inside a system library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSymbolQuery
{
    pub object_uuid: String,
    pub object_name: String,
    /// Address relative to the image base.
    pub addr: HexValue,
}

/// Body of `POST /lookup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSymbolRequest
{
    pub sdk_id: String,
    pub cpu_name: String,
    pub symbols: Vec<SystemSymbolQuery>,
}

/// A symbol found in a system library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSymbolMatch
{
    pub object_name: String,
    pub symbol: String,
    pub addr: HexValue,
}

/// Response of `POST /lookup`: one entry per query, in query order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSymbolResponse
{
    #[serde(default)]
    pub symbols: Vec<Option<SystemSymbolMatch>>,
}
