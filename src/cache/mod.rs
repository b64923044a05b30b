pub mod generation;
pub mod keys;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::{Store, StoreError};

pub use generation::Generations;
pub use memory::MemoryCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for CacheError {
    fn from(value: StoreError) -> Self {
        Self::Backend(value.to_string())
    }
}

/// Key-value cache with per-entry TTL and glob invalidation.
pub trait Cache: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn put_raw(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// `*` matches any run of characters. Returns the number of removed entries.
    fn delete_by_pattern(&self, pattern: &str) -> Result<usize, CacheError>;
}

impl Cache for Store {
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.get_cache_entry(key, Utc::now())?)
    }

    fn put_raw(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Backend(format!("invalid ttl: {e}")))?;
        Ok(self.put_cache_entry(key, value, Utc::now() + ttl)?)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        Ok(self.delete_cache_entry(key)?)
    }

    fn delete_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let prefix = keys::literal_prefix(pattern);
        Ok(self.delete_cache_entries_matching(prefix, |key| keys::glob_match(pattern, key))?)
    }
}

pub const DEFAULT_TTL_JITTER_RATIO: f64 = 0.1;

pub fn apply_ttl_jitter(ttl: Duration, ratio: f64) -> Duration {
    let ratio = ratio.clamp(0.0, 0.9);
    let base_ms = ttl.as_millis() as f64;
    if base_ms <= 0.0 || ratio == 0.0 {
        return ttl;
    }
    let factor = rand::thread_rng().gen_range((1.0 - ratio)..=(1.0 + ratio));
    let jittered_ms = (base_ms * factor).round().max(1.0) as u64;
    Duration::from_millis(jittered_ms)
}

/// Typed, best-effort access to a [`Cache`]. Failures are logged and read as misses.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn Cache>,
    enabled: bool,
    jitter_ratio: f64,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn Cache>, enabled: bool, jitter_ratio: f64) -> Self {
        Self {
            backend,
            enabled,
            jitter_ratio,
        }
    }

    pub fn disabled(backend: Arc<dyn Cache>) -> Self {
        Self::new(backend, false, 0.0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let raw = match self.backend.get_raw(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(key, error = %e, "Cache read failed");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "Cache entry undecodable, dropping");
                let _ = self.backend.delete(key);
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if !self.enabled {
            return;
        }
        let raw = match serde_json::to_vec(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(key, error = %e, "Cache serialization failed");
                return;
            }
        };
        let ttl = apply_ttl_jitter(ttl, self.jitter_ratio);
        if let Err(e) = self.backend.put_raw(key, &raw, ttl) {
            tracing::debug!(key, error = %e, "Cache write failed");
        }
    }

    pub fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete(key) {
            tracing::debug!(key, error = %e, "Cache delete failed");
        }
    }

    /// Drop every cached view of one learner. Runs even when reads are disabled.
    pub fn invalidate_learner(&self, learner_id: &str) -> usize {
        match self.backend.delete_by_pattern(&keys::learner_pattern(learner_id)) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(learner_id, error = %e, "Cache invalidation failed");
                0
            }
        }
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("enabled", &self.enabled)
            .field("jitter_ratio", &self.jitter_ratio)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_ratio() {
        let base = Duration::from_secs(300);
        for _ in 0..100 {
            let ttl = apply_ttl_jitter(base, 0.1);
            assert!(ttl >= Duration::from_secs(270));
            assert!(ttl <= Duration::from_secs(330));
        }
        assert_eq!(apply_ttl_jitter(base, 0.0), base);
    }

    #[test]
    fn failing_backend_reads_as_miss() {
        let backend = Arc::new(MemoryCache::new());
        let layer = CacheLayer::new(backend.clone(), true, 0.0);
        layer.put("k", &42u32, Duration::from_secs(60));
        assert_eq!(layer.get::<u32>("k"), Some(42));

        backend.set_failing(true);
        assert_eq!(layer.get::<u32>("k"), None);
        layer.put("k2", &1u32, Duration::from_secs(60));
        assert_eq!(layer.invalidate_learner("anyone"), 0);
    }

    #[test]
    fn store_backend_invalidates_by_learner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("db").to_str().unwrap()).unwrap());
        let layer = CacheLayer::new(store.clone(), true, 0.1);

        layer.put(&keys::queue_key("ada", "g0", 20), &vec![1, 2], Duration::from_secs(60));
        layer.put(&keys::stats_key("ada", "g1"), &"s", Duration::from_secs(60));
        layer.put(&keys::stats_key("adam", "g0"), &"t", Duration::from_secs(60));

        assert_eq!(layer.invalidate_learner("ada"), 2);
        assert_eq!(
            layer.get::<String>(&keys::stats_key("adam", "g0")).as_deref(),
            Some("t")
        );
        assert_eq!(layer.get::<Vec<i32>>(&keys::queue_key("ada", "g0", 20)), None);
    }
}
