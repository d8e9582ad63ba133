//! Pattern cache with explicit invalidation
//!
//! The cache is the only broadly shared mutable resource. Every pattern
//! upsert invalidates it wholesale; the next read lazily repopulates. When
//! repopulation fails, the last known snapshot is served with a staleness
//! flag instead of blocking the reader.

use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::store::SuccessPattern;
use crate::Result;

#[derive(Debug, Clone)]
struct Snapshot {
    patterns: Vec<SuccessPattern>,
    refreshed_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    valid: bool,
}

/// Cached pattern view handed to readers
#[derive(Debug, Clone)]
pub struct CachedPatterns {
    pub patterns: Vec<SuccessPattern>,
    /// True when the snapshot could not be refreshed and may lag the store
    pub stale: bool,
}

/// Invalidate-on-write, repopulate-on-read pattern cache
#[derive(Debug)]
pub struct PatternCache {
    state: RwLock<CacheState>,
    ttl: Duration,
}

impl PatternCache {
    pub fn new(ttl: Duration) -> Self {
        Self { state: RwLock::new(CacheState::default()), ttl }
    }

    /// Drop the cached view; the next read repopulates
    pub fn invalidate(&self) {
        self.state.write().expect("cache lock poisoned").valid = false;
    }

    pub fn is_valid(&self) -> bool {
        let state = self.state.read().expect("cache lock poisoned");
        state.valid
            && state
                .snapshot
                .as_ref()
                .map(|s| s.refreshed_at.elapsed() < self.ttl)
                .unwrap_or(false)
    }

    /// Read through the cache, refreshing from `refresh` when the cached
    /// view is invalid or expired. A failed refresh serves the previous
    /// snapshot flagged stale rather than propagating the error.
    pub fn read_with<F>(&self, refresh: F) -> CachedPatterns
    where
        F: FnOnce() -> Result<Vec<SuccessPattern>>,
    {
        if self.is_valid() {
            let state = self.state.read().expect("cache lock poisoned");
            if let Some(snapshot) = &state.snapshot {
                return CachedPatterns { patterns: snapshot.patterns.clone(), stale: false };
            }
        }

        match refresh() {
            Ok(patterns) => {
                let mut state = self.state.write().expect("cache lock poisoned");
                state.snapshot =
                    Some(Snapshot { patterns: patterns.clone(), refreshed_at: Instant::now() });
                state.valid = true;
                CachedPatterns { patterns, stale: false }
            }
            Err(error) => {
                warn!(%error, "cache refresh failed, serving stale snapshot");
                let state = self.state.read().expect("cache lock poisoned");
                CachedPatterns {
                    patterns: state
                        .snapshot
                        .as_ref()
                        .map(|s| s.patterns.clone())
                        .unwrap_or_default(),
                    stale: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineError;

    #[test]
    fn test_read_populates_then_hits_cache() {
        let cache = PatternCache::new(Duration::from_secs(60));
        let mut calls = 0;

        let view = cache.read_with(|| {
            calls += 1;
            Ok(Vec::new())
        });
        assert!(!view.stale);
        assert!(cache.is_valid());

        let view = cache.read_with(|| {
            calls += 1;
            Ok(Vec::new())
        });
        assert!(!view.stale);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_invalidate_forces_refresh() {
        let cache = PatternCache::new(Duration::from_secs(60));
        let mut calls = 0;
        let mut read = |cache: &PatternCache| {
            cache.read_with(|| {
                calls += 1;
                Ok(Vec::new())
            })
        };

        read(&cache);
        cache.invalidate();
        assert!(!cache.is_valid());
        read(&cache);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_failed_refresh_serves_stale_snapshot() {
        let cache = PatternCache::new(Duration::from_secs(60));

        cache.read_with(|| Ok(Vec::new()));
        cache.invalidate();

        let view = cache.read_with(|| Err(EngineError::Store("backend is down".into())));
        assert!(view.stale);
        assert!(view.patterns.is_empty());

        // An empty cache that fails refresh is also served stale, never an
        // error.
        let empty = PatternCache::new(Duration::from_secs(60));
        let view = empty.read_with(|| Err(EngineError::Store("backend is down".into())));
        assert!(view.stale);
    }

    #[test]
    fn test_expired_snapshot_is_refreshed() {
        let cache = PatternCache::new(Duration::from_millis(0));
        let mut calls = 0;

        cache.read_with(|| {
            calls += 1;
            Ok(Vec::new())
        });
        cache.read_with(|| {
            calls += 1;
            Ok(Vec::new())
        });
        assert_eq!(calls, 2);
    }
}
