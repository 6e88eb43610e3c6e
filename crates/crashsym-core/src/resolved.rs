//! Per-frame working state of one processing pass.

use crashsym_protocol::{SymbolCandidate, SymbolicatedFrame, SystemSymbolMatch};

use crate::cache::{FrameCache, FrameCacheKey};
use crate::event::{Frame, StacktraceLocation};
use crate::image_index::ImageIndex;
use crate::instruction::InstructionResolver;
use crate::types::{Address, DebugImage, RegisterSnapshot};

/// A frame selected for symbolication, with everything learned about it so far
///
/// `remote_matches` stays empty when the symbolication service did not run
/// or deliberately discarded the frame. Once the service ran it holds at
/// least one entry, even if that entry only repeats the raw address.
#[derive(Debug, Clone)]
pub struct ResolvedFrame
{
    pub location: StacktraceLocation,
    /// Position in the stack trace's frame list (caller-first).
    pub frame_index: usize,
    /// Distance from the crashing frame (0 = crashing frame).
    pub crash_index: usize,
    pub raw: Frame,
    /// Address to look up, after instruction adjustment.
    pub instruction_addr: Address,
    pub image: Option<DebugImage>,
    pub cache_key: Option<FrameCacheKey>,
    pub cache_value: Option<Vec<SymbolCandidate>>,
    pub system_match: Option<SystemSymbolMatch>,
    pub remote_matches: Vec<SymbolicatedFrame>,
}

impl ResolvedFrame
{
    /// Resolve the lookup address and image of `raw` and consult the frame cache.
    ///
    /// Returns `None` for frames without an instruction address.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        location: StacktraceLocation,
        frame_index: usize,
        crash_index: usize,
        raw: &Frame,
        registers: &RegisterSnapshot,
        resolver: &InstructionResolver,
        images: &ImageIndex,
        cache: Option<&FrameCache>,
    ) -> Option<Self>
    {
        let address = Address::from(raw.address()?);
        let instruction_addr = resolver.resolve(address, crash_index, registers, raw.trust());
        let image = images.find_image(instruction_addr).cloned();
        let cache_key = image
            .as_ref()
            .and_then(|image| FrameCacheKey::new(instruction_addr, image));
        let cache_value = cache
            .zip(cache_key.as_ref())
            .and_then(|(cache, key)| cache.get(key));

        Some(Self {
            location,
            frame_index,
            crash_index,
            raw: raw.clone(),
            instruction_addr,
            image,
            cache_key,
            cache_value,
            system_match: None,
            remote_matches: Vec::new(),
        })
    }

    /// Debug identifier of the matched image.
    pub fn debug_id(&self) -> Option<&str>
    {
        self.image.as_ref().map(DebugImage::debug_id)
    }

    /// Image-relative lookup address.
    pub fn rebased_address(&self) -> Option<u64>
    {
        self.image.as_ref()?.rebase(self.instruction_addr)
    }
}
