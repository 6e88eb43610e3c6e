//! # Shared Cache
//!
//! Key-value storage shared between workers and across events.
//!
//! The pipeline stores three things here: per-frame symbol results, the id
//! of an in-flight symbolication request, and one-shot markers. All values
//! are JSON. Hosts plug in their own backend through [`SharedCache`];
//! [`MemoryCache`] is an in-process implementation with TTL expiry.

pub mod frame_cache;
pub mod keys;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

pub use frame_cache::FrameCache;
pub use keys::{FrameCacheKey, FRAME_CACHE_VERSION};

/// Cache backend shared by every worker processing events
///
/// `set_if_absent` must be atomic: of two concurrent callers for the same
/// key exactly one gets `true`.
pub trait SharedCache: Send + Sync
{
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value, ttl: Duration);

    /// Store `value` only if `key` holds nothing. Returns `true` if it was stored.
    fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> bool;

    fn delete(&self, key: &str);
}

#[derive(Debug, Clone)]
struct Entry
{
    value: Value,
    expires_at: Instant,
}

impl Entry
{
    fn is_live(&self, now: Instant) -> bool
    {
        now < self.expires_at
    }
}

/// In-memory [`SharedCache`] with per-entry TTL
///
/// Expired entries are dropped lazily when they are read or overwritten.
#[derive(Debug, Default)]
pub struct MemoryCache
{
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize
    {
        let now = Instant::now();
        self.entries.lock().values().filter(|entry| entry.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

impl SharedCache for MemoryCache
{
    fn get(&self, key: &str) -> Option<Value>
    {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Duration)
    {
        let expires_at = Instant::now() + ttl;
        self.entries.lock().insert(key.to_string(), Entry { value, expires_at });
    }

    fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> bool
    {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return false;
        }
        entries.insert(key.to_string(), Entry {
            value,
            expires_at: now + ttl,
        });
        true
    }

    fn delete(&self, key: &str)
    {
        self.entries.lock().remove(key);
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::Arc;
    use std::thread;

    use serde_json::json;

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_set_get_delete()
    {
        let cache = MemoryCache::new();
        assert!(cache.get("k").is_none());
        cache.set("k", json!(1), HOUR);
        assert_eq!(cache.get("k"), Some(json!(1)));
        cache.set("k", json!(2), HOUR);
        assert_eq!(cache.get("k"), Some(json!(2)));
        cache.delete("k");
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_expires_immediately()
    {
        let cache = MemoryCache::new();
        cache.set("k", json!(true), Duration::ZERO);
        assert!(cache.get("k").is_none());
        assert!(cache.set_if_absent("k", json!(false), HOUR));
        assert_eq!(cache.get("k"), Some(json!(false)));
    }

    #[test]
    fn test_set_if_absent_has_one_winner()
    {
        let cache = Arc::new(MemoryCache::new());
        let winners: usize = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.set_if_absent("request", json!(worker), HOUR))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| usize::from(handle.join().unwrap()))
            .sum();

        assert_eq!(winners, 1);
        assert!(cache.get("request").is_some());
    }
}
