//! Candidates from remote results.

use crashsym_protocol::{FrameStatus, HexValue, SymbolCandidate, SymbolicatedFrame, SystemSymbolMatch};
use smallvec::smallvec;

use super::demangle::{demangle_symbol, detect_language, strip_symbol_prefix};
use super::{Candidates, SymbolizeRequest, Symbolizer};
use crate::error::{FailureReason, SymbolicationFailed};
use crate::in_app::is_known_third_party;

/// Symbolizer that only reshapes remote and system symbol matches
///
/// This is the default symbolizer: it never reads debug files itself.
///
/// - Symbolicated remote matches become the candidates.
/// - A remote failure becomes a [`SymbolicationFailed`], except for scanned
///   frames (dropped) and system libraries (answered from the system
///   symbol match if there is one).
/// - Without remote matches, a system symbol match is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchSymbolizer;

impl MatchSymbolizer
{
    pub fn new() -> Self
    {
        Self
    }

    fn remote_candidates(request: &SymbolizeRequest<'_>) -> Candidates
    {
        let package = request.image.and_then(|image| image.code_file());
        request
            .remote_matches
            .iter()
            .rev()
            .filter(|remote| remote.status == FrameStatus::Symbolicated)
            .map(|remote| {
                let mut candidate = remote.candidate.clone();
                if candidate.package.is_none() {
                    candidate.package = package.map(str::to_string);
                }
                candidate
            })
            .collect()
    }

    fn system_candidate(request: &SymbolizeRequest<'_>, found: &SystemSymbolMatch) -> SymbolCandidate
    {
        let symbol_addr = request
            .image
            .map_or(found.addr.value(), |image| image.start().value().saturating_add(found.addr.value()));
        SymbolCandidate {
            package: Some(found.object_name.clone()),
            lang: detect_language(&found.symbol).as_lang().map(str::to_string),
            symbol: Some(strip_symbol_prefix(&found.symbol).to_string()),
            function: Some(demangle_symbol(&found.symbol)),
            symbol_addr: Some(HexValue(symbol_addr)),
            ..SymbolCandidate::default()
        }
    }

    fn failure_reason(status: FrameStatus) -> FailureReason
    {
        match status {
            FrameStatus::MissingSymbol => FailureReason::MissingSymbol,
            FrameStatus::UnknownImage => FailureReason::UnknownImage,
            FrameStatus::Missing => FailureReason::MissingDebugFile,
            FrameStatus::Malformed => FailureReason::MalformedDebugFile,
            FrameStatus::Symbolicated | FrameStatus::Other => FailureReason::Internal,
        }
    }
}

impl Symbolizer for MatchSymbolizer
{
    fn symbolize(&self, request: &SymbolizeRequest<'_>) -> Result<Candidates, SymbolicationFailed>
    {
        let is_system_image = request
            .image
            .and_then(|image| image.code_file())
            .is_some_and(|code_file| is_known_third_party(code_file, request.sdk));

        if let Some(first) = request.remote_matches.first() {
            if first.status == FrameStatus::Symbolicated {
                return Ok(Self::remote_candidates(request));
            }
            if request.trust.is_scan() {
                return Ok(Candidates::new());
            }

            let mut failure = SymbolicationFailed::new(Self::failure_reason(first.status));
            if let Some(image) = request.image {
                failure = failure.with_image(image);
            }
            if !is_system_image {
                return Err(failure);
            }
            if request.system_match.is_none() {
                return match first.status {
                    FrameStatus::Missing => Ok(Candidates::new()),
                    _ => Err(failure),
                };
            }
        }

        Ok(request
            .system_match
            .map(|found| smallvec![Self::system_candidate(request, found)])
            .unwrap_or_default())
    }
}
