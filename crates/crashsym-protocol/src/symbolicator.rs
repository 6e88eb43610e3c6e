//! Request and response payloads of the bulk symbolication service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::frame::{FrameTrust, SymbolicatedFrame};
use crate::hex::HexValue;
use crate::image::{CompleteObjectInfo, RawImage};

/// Register values of one thread, keyed by register name (`rip`, `pc`, ...).
pub type RegisterMap = BTreeMap<String, HexValue>;

/// Opaque identifier of an in-flight symbolication job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId
{
    pub fn as_str(&self) -> &str
    {
        &self.0
    }
}

impl std::fmt::Display for RequestId
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.write_str(&self.0)
    }
}

/// A frame submitted for symbolication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame
{
    pub instruction_addr: HexValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust: Option<FrameTrust>,
}

/// One thread's frames, crashing frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStacktrace
{
    #[serde(default)]
    pub registers: RegisterMap,
    pub frames: Vec<RequestFrame>,
}

/// Body of `POST /symbolicate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolicationRequest
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<u32>,
    #[serde(default)]
    pub sources: Vec<Value>,
    pub stacktraces: Vec<RequestStacktrace>,
    pub modules: Vec<RawImage>,
}

/// A thread as returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteStacktrace
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_requesting: Option<bool>,
    #[serde(default)]
    pub registers: RegisterMap,
    #[serde(default)]
    pub frames: Vec<SymbolicatedFrame>,
}

/// Payload of a completed job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedResponse
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<u32>,
    #[serde(default)]
    pub stacktraces: Vec<CompleteStacktrace>,
    #[serde(default)]
    pub modules: Vec<CompleteObjectInfo>,
    /// Only present for minidump jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crashed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_info: Option<Value>,
}

/// Any response of the service, discriminated by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SymbolicationResponse
{
    Pending
    {
        request_id: RequestId,
        #[serde(default)]
        retry_after: u64,
    },
    Completed(CompletedResponse),
    Failed
    {
        #[serde(default)]
        message: String,
    },
    Timeout,
    InternalError,
}

impl SymbolicationResponse
{
    /// Short status label used in logs and error annotations.
    pub fn status(&self) -> &'static str
    {
        match self {
            SymbolicationResponse::Pending { .. } => "pending",
            SymbolicationResponse::Completed(_) => "completed",
            SymbolicationResponse::Failed { .. } => "failed",
            SymbolicationResponse::Timeout => "timeout",
            SymbolicationResponse::InternalError => "internal_error",
        }
    }
}
