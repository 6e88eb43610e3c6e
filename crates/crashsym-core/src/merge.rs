//! # Frame Merging
//!
//! Turns one [`ResolvedFrame`] into the frames that replace it in the
//! output stack trace.

use tracing::{debug, trace};

use crate::cache::FrameCache;
use crate::error::EventError;
use crate::event::Frame;
use crate::resolved::ResolvedFrame;
use crate::symbolizer::{SymbolizeRequest, Symbolizer};
use crate::types::SdkInfo;

/// Result of merging a single frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome
{
    /// `None` keeps the raw frame as it is. `Some` replaces it, possibly by
    /// nothing at all.
    pub new_frames: Option<Vec<Frame>>,
    /// The input frame, with defaults filled in from its image.
    pub raw_frames: Vec<Frame>,
    pub errors: Vec<EventError>,
}

/// Combines symbol candidates with raw frames
pub struct FrameMerger<'a>
{
    symbolizer: &'a dyn Symbolizer,
    cache: Option<&'a FrameCache>,
    sdk: Option<&'a SdkInfo>,
}

impl<'a> FrameMerger<'a>
{
    pub fn new(symbolizer: &'a dyn Symbolizer, cache: Option<&'a FrameCache>, sdk: Option<&'a SdkInfo>) -> Self
    {
        Self { symbolizer, cache, sdk }
    }

    pub fn merge(&self, frame: &ResolvedFrame) -> MergeOutcome
    {
        let mut raw = frame.raw.clone();
        if raw.package.is_none() {
            raw.package = frame
                .image
                .as_ref()
                .and_then(|image| image.code_file())
                .map(str::to_string);
        }

        let candidates = match &frame.cache_value {
            Some(cached) => {
                trace!(addr = %frame.instruction_addr, "using cached symbols");
                cached.clone()
            }
            None => {
                let request = SymbolizeRequest {
                    address: frame.instruction_addr,
                    image: frame.image.as_ref(),
                    sdk: self.sdk,
                    system_match: frame.system_match.as_ref(),
                    remote_matches: &frame.remote_matches,
                    trust: raw.trust(),
                };
                match self.symbolizer.symbolize(&request) {
                    Ok(candidates) => {
                        let candidates = candidates.into_vec();
                        if !candidates.is_empty() {
                            if let (Some(cache), Some(key)) = (self.cache, frame.cache_key.as_ref()) {
                                cache.set(key, &candidates);
                            }
                        }
                        candidates
                    }
                    Err(failure) => {
                        debug!(addr = %frame.instruction_addr, reason = %failure, "frame symbolication failed");
                        let error = failure.to_event_error();
                        let mut annotated = raw.clone();
                        annotated.push_error(&error);
                        return MergeOutcome {
                            new_frames: Some(vec![annotated]),
                            raw_frames: vec![raw],
                            errors: vec![error],
                        };
                    }
                }
            }
        };

        if candidates.is_empty() {
            let new_frames = raw.trust().is_scan().then(Vec::new);
            return MergeOutcome {
                new_frames,
                raw_frames: vec![raw],
                errors: Vec::new(),
            };
        }

        let new_frames = candidates
            .iter()
            .map(|candidate| {
                let mut merged = raw.clone();
                merged.merge_candidate(candidate);
                merged
            })
            .collect();

        MergeOutcome {
            new_frames: Some(new_frames),
            raw_frames: vec![raw],
            errors: Vec::new(),
        }
    }
}
