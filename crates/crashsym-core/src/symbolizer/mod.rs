//! # Local Symbolizers
//!
//! Turn what is known about a frame into symbol candidates.
//!
//! A symbolizer sees the lookup address, the matched image, and whatever
//! the remote services returned, and produces one candidate per function at
//! that address (several when functions were inlined), ordered caller-first.
//!
//! - [`MatchSymbolizer`] only reshapes remote and system symbol matches.
//! - [`DwarfSymbolizer`] reads local debug files and falls back to another
//!   symbolizer for images it has no file for.

pub mod demangle;
pub mod dwarf;
pub mod matches;

use crashsym_protocol::{FrameTrust, SymbolCandidate, SymbolicatedFrame, SystemSymbolMatch};
use smallvec::SmallVec;

pub use dwarf::DwarfSymbolizer;
pub use matches::MatchSymbolizer;

use crate::error::SymbolicationFailed;
use crate::types::{Address, DebugImage, SdkInfo};

/// Candidates for one frame; most frames have exactly one.
pub type Candidates = SmallVec<[SymbolCandidate; 2]>;

/// Everything a symbolizer may use for one frame
#[derive(Debug, Clone, Copy)]
pub struct SymbolizeRequest<'a>
{
    /// Lookup address (already adjusted).
    pub address: Address,
    pub image: Option<&'a DebugImage>,
    pub sdk: Option<&'a SdkInfo>,
    pub system_match: Option<&'a SystemSymbolMatch>,
    /// Results of the symbolication service; empty if it did not run.
    pub remote_matches: &'a [SymbolicatedFrame],
    pub trust: FrameTrust,
}

/// Produces symbol candidates for a frame
///
/// An empty list means "nothing known about this address", which is not a
/// failure. Failures carry the reason a user would need to fix.
pub trait Symbolizer: Send + Sync
{
    fn symbolize(&self, request: &SymbolizeRequest<'_>) -> Result<Candidates, SymbolicationFailed>;
}
