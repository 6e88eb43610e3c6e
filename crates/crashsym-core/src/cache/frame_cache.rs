//! Memoized symbol results per frame.

use std::sync::Arc;
use std::time::Duration;

use crashsym_protocol::SymbolCandidate;
use tracing::{trace, warn};

use super::{FrameCacheKey, SharedCache};

/// Symbol results keyed by [`FrameCacheKey`], stored in a [`SharedCache`]
///
/// Last write wins. Entries that fail to decode are treated as misses.
#[derive(Clone)]
pub struct FrameCache
{
    cache: Arc<dyn SharedCache>,
    ttl: Duration,
}

impl FrameCache
{
    pub fn new(cache: Arc<dyn SharedCache>, ttl: Duration) -> Self
    {
        Self { cache, ttl }
    }

    pub fn get(&self, key: &FrameCacheKey) -> Option<Vec<SymbolCandidate>>
    {
        let digest = key.digest();
        let value = self.cache.get(&digest)?;
        match serde_json::from_value(value) {
            Ok(candidates) => {
                trace!(key = %digest, "frame cache hit");
                Some(candidates)
            }
            Err(err) => {
                warn!(key = %digest, error = %err, "dropping undecodable frame cache entry");
                None
            }
        }
    }

    pub fn set(&self, key: &FrameCacheKey, candidates: &[SymbolCandidate])
    {
        let digest = key.digest();
        match serde_json::to_value(candidates) {
            Ok(value) => self.cache.set(&digest, value, self.ttl),
            Err(err) => warn!(key = %digest, error = %err, "failed to encode frame cache entry"),
        }
    }
}

impl std::fmt::Debug for FrameCache
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("FrameCache").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests
{
    use crashsym_protocol::{HexValue, RawImage};
    use serde_json::json;

    use super::*;
    use crate::cache::{MemoryCache, SharedCache};
    use crate::types::{Address, DebugImage};

    fn key() -> FrameCacheKey
    {
        let raw = RawImage {
            ty: Some("macho".into()),
            image_addr: Some(HexValue(0x1000)),
            image_size: Some(0x1000),
            debug_id: Some("D1".into()),
            ..RawImage::default()
        };
        FrameCacheKey::new(Address::new(0x1500), &DebugImage::from_raw(0, &raw).unwrap()).unwrap()
    }

    #[test]
    fn test_round_trip_and_corrupt_entries()
    {
        let shared = Arc::new(MemoryCache::new());
        let cache = FrameCache::new(shared.clone(), Duration::from_secs(60));
        assert!(cache.get(&key()).is_none());

        let candidates = vec![SymbolCandidate {
            function: Some("main".into()),
            ..SymbolCandidate::default()
        }];
        cache.set(&key(), &candidates);
        assert_eq!(cache.get(&key()), Some(candidates));

        shared.set(&key().digest(), json!({"not": "a list"}), Duration::from_secs(60));
        assert!(cache.get(&key()).is_none());
    }
}
