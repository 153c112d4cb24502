//! # Result Cache
//! Per-subject TTL cache over extraction outcomes. Stale entries are ignored
//! lazily on read and overwritten by the next write; nothing sweeps them.
//! The cache is built once at startup and handed to the lookup path through
//! `AppState` — never reached through ambient globals, so every test can
//! construct a fresh one.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::extract::Candidate;

/// Diagnostics captured alongside a cached value when the lookup ran with
/// `debug` on.
#[derive(Debug, Clone, Serialize)]
pub struct DebugTrace {
    /// Ranked candidates with provenance, best first.
    pub candidates: Vec<Candidate>,
    /// Truncated raw body of the endpoint that produced the result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_snippet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: u64,
    pub ts_unix: u64,
    /// `None` when the entry is a suppressive zero from an exhausted chain.
    pub source: Option<String>,
    pub debug: Option<DebugTrace>,
}

/// Thread-safe subject-id → value cache with a fixed TTL.
#[derive(Debug)]
pub struct ValueCache {
    inner: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ValueCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Fresh entry for the key, or `None` (missing or stale).
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, now_unix())
    }

    /// Clock-injected variant for deterministic tests.
    pub fn get_at(&self, key: &str, now_unix: u64) -> Option<CacheEntry> {
        let map = self.inner.lock().expect("value cache mutex poisoned");
        map.get(key)
            .filter(|e| now_unix.saturating_sub(e.ts_unix) < self.ttl.as_secs())
            .cloned()
    }

    /// Store (or overwrite) the entry for a key, stamped with the current
    /// time. Every completed lookup writes here — including "could not
    /// extract", stored as zero to suppress request storms against a source
    /// that is already misbehaving.
    pub fn put(&self, key: &str, value: u64, source: Option<String>, debug: Option<DebugTrace>) {
        self.put_at(key, value, source, debug, now_unix());
    }

    /// Clock-injected variant for deterministic tests.
    pub fn put_at(
        &self,
        key: &str,
        value: u64,
        source: Option<String>,
        debug: Option<DebugTrace>,
        now_unix: u64,
    ) {
        let entry = CacheEntry {
            value,
            ts_unix: now_unix,
            source,
            debug,
        };
        let mut map = self.inner.lock().expect("value cache mutex poisoned");
        map.insert(key.to_string(), entry);
    }

    /// Unconditional removal; the next `get` misses regardless of age.
    /// Returns whether an entry existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut map = self.inner.lock().expect("value cache mutex poisoned");
        map.remove(key).is_some()
    }
}

/// Current UNIX time in seconds.
fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_1h() -> ValueCache {
        ValueCache::new(Duration::from_secs(3600))
    }

    #[test]
    fn put_then_get_within_ttl_hits() {
        let c = cache_1h();
        c.put_at("u:1", 54_321, Some("ep".into()), None, 1_000);
        let e = c.get_at("u:1", 1_500).expect("fresh entry");
        assert_eq!(e.value, 54_321);
        assert_eq!(e.source.as_deref(), Some("ep"));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let c = cache_1h();
        c.put_at("u:1", 9, None, None, 1_000);
        assert!(c.get_at("u:1", 1_000 + 3_599).is_some());
        assert!(c.get_at("u:1", 1_000 + 3_600).is_none());
    }

    #[test]
    fn invalidate_forces_miss_regardless_of_age() {
        let c = cache_1h();
        c.put_at("u:1", 9, None, None, 1_000);
        assert!(c.invalidate("u:1"));
        assert!(c.get_at("u:1", 1_001).is_none());
        // Second invalidation is a no-op.
        assert!(!c.invalidate("u:1"));
    }

    #[test]
    fn writes_overwrite_unconditionally() {
        let c = cache_1h();
        c.put_at("u:1", 1, None, None, 1_000);
        c.put_at("u:1", 2, Some("later".into()), None, 1_001);
        let e = c.get_at("u:1", 1_002).expect("entry");
        assert_eq!(e.value, 2);
        assert_eq!(e.source.as_deref(), Some("later"));
    }

    #[test]
    fn keys_are_independent() {
        let c = cache_1h();
        c.put_at("u:1", 1, None, None, 1_000);
        assert!(c.get_at("u:2", 1_000).is_none());
    }

    #[test]
    fn zero_ttl_never_hits() {
        let c = ValueCache::new(Duration::from_secs(0));
        c.put_at("u:1", 1, None, None, 1_000);
        assert!(c.get_at("u:1", 1_000).is_none());
    }
}
