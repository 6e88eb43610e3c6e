//! Cache key derivation.

use serde::Serialize;

use crate::types::{Address, DebugImage};

/// Format version of cached frame results; bump when the stored shape changes.
pub const FRAME_CACHE_VERSION: u32 = 6;

const FRAME_KEY_PREFIX: &str = "native-frame:";

/// Key of the in-flight symbolication request of an event.
pub fn request_id_cache_key(event_id: &str, project: u64) -> String
{
    format!("symbolicator:{event_id}:{project}")
}

/// Key of the marker set once an event's minidump has been reprocessed.
pub fn minidump_reprocessed_cache_key(event_id: &str, project: u64) -> String
{
    format!("symbolicator-minidump-processed:{event_id}:{project}")
}

/// Identity of a symbol lookup, independent of the event it came from
///
/// Images load at different addresses in different processes, so the key
/// uses the image-relative address. Together with the debug id, the CPU
/// name, and the image size this pins down one instruction in one binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FrameCacheKey
{
    version: u32,
    rebased_address: u64,
    debug_id: String,
    arch: Option<String>,
    size: u64,
}

impl FrameCacheKey
{
    /// Key for looking up `address` in `image`, `None` if the address lies below the image.
    pub fn new(address: Address, image: &DebugImage) -> Option<Self>
    {
        Some(Self {
            version: FRAME_CACHE_VERSION,
            rebased_address: image.rebase(address)?,
            debug_id: image.debug_id().to_string(),
            arch: image.arch_name().map(str::to_string),
            size: image.size(),
        })
    }

    pub fn rebased_address(&self) -> u64
    {
        self.rebased_address
    }

    /// Storage key: a prefix and the md5 of the key tuple.
    pub fn digest(&self) -> String
    {
        let tuple = (
            self.version,
            self.rebased_address,
            self.debug_id.as_str(),
            self.arch.as_deref(),
            self.size,
        );
        let encoded = serde_json::to_vec(&tuple).unwrap_or_default();
        format!("{FRAME_KEY_PREFIX}{:x}", md5::compute(encoded))
    }
}
