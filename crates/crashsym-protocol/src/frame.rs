//! Stack frame types on the wire.

use serde::{Deserialize, Serialize};

use crate::hex::HexValue;

/// How a stack frame was recovered by the stack walker.
///
/// This is a closed set: anything a client sends that is not one of the known
/// tags is read as [`FrameTrust::Unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameTrust
{
    /// Read directly from the thread context (the crashing frame).
    Context,
    /// Recovered with call frame information.
    Cfi,
    /// Provided already walked by the client.
    Prewalked,
    /// Recovered by following frame pointers.
    #[serde(rename = "fp")]
    FramePointer,
    /// Found by scanning, then validated with call frame information.
    CfiScan,
    /// Found by heuristically scanning stack memory.
    Scan,
    #[default]
    #[serde(rename = "none", other)]
    Unknown,
}

impl FrameTrust
{
    /// `true` for frames guessed from raw stack memory.
    pub const fn is_scan(self) -> bool
    {
        matches!(self, FrameTrust::Scan)
    }
}

/// Symbol information for one (possibly inlined) function at an address.
///
/// All fields are optional; merging a candidate into a frame only overwrites
/// the fields the candidate actually carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolCandidate
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_addr: Option<HexValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, alias = "sym_addr", skip_serializing_if = "Option::is_none")]
    pub symbol_addr: Option<HexValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_addr: Option<HexValue>,
}

/// Per-frame outcome reported by the symbolication service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus
{
    #[default]
    Symbolicated,
    MissingSymbol,
    UnknownImage,
    Missing,
    Malformed,
    #[serde(other)]
    Other,
}

/// A frame as returned by the symbolication service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolicatedFrame
{
    #[serde(default)]
    pub status: FrameStatus,
    /// Index of the request frame this result belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust: Option<FrameTrust>,
    #[serde(flatten)]
    pub candidate: SymbolCandidate,
}
