//! Cache store contract and the default in-memory implementation.

use std::sync::RwLock;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::key::PipelineCacheKey;
use crate::domain::validity::Validity;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_STORE_EVICT: &str = "trellis_cache_store_evict_total";

/// Output of a pipeline prefix, as kept by a cache store.
///
/// `validities` lines up one-to-one with the fragments of the key it is
/// stored under.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub validities: Vec<Validity>,
    pub content: Bytes,
    pub content_type: Option<String>,
    pub cached_at: OffsetDateTime,
}

impl CachedResponse {
    pub fn new(
        validities: Vec<Validity>,
        content: impl Into<Bytes>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            validities,
            content: content.into(),
            content_type,
            cached_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {message}")]
    Unavailable { message: String },
    #[error("cache store rejected entry: {message}")]
    Rejected { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Associative store shared by every pipeline instance.
///
/// Implementations must tolerate concurrent calls from many threads.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &PipelineCacheKey) -> Result<Option<CachedResponse>, StoreError>;

    /// Take ownership of `key`; callers hand over a copy, never their live key.
    fn store(&self, key: PipelineCacheKey, response: CachedResponse) -> Result<(), StoreError>;

    fn remove(&self, key: &PipelineCacheKey) -> Result<(), StoreError>;

    fn contains(&self, key: &PipelineCacheKey) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    fn clear(&self) -> Result<(), StoreError>;
}

/// Bounded in-memory store with least-recently-used eviction.
pub struct LruCacheStore {
    entries: RwLock<LruCache<PipelineCacheKey, CachedResponse>>,
}

impl LruCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.store_limit_non_zero())),
        }
    }

    /// Get the number of cached responses.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LruCacheStore {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl CacheStore for LruCacheStore {
    fn get(&self, key: &PipelineCacheKey) -> Result<Option<CachedResponse>, StoreError> {
        Ok(rw_write(&self.entries, SOURCE, "get").get(key).cloned())
    }

    fn store(&self, key: PipelineCacheKey, response: CachedResponse) -> Result<(), StoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "store");
        // `push` also hands back the previous value when replacing the same key.
        let replacing = entries.contains(&key);
        if entries.push(key, response).is_some() && !replacing {
            counter!(METRIC_STORE_EVICT).increment(1);
        }
        Ok(())
    }

    fn remove(&self, key: &PipelineCacheKey) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "remove").pop(key);
        Ok(())
    }

    fn contains(&self, key: &PipelineCacheKey) -> Result<bool, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "contains").contains(key))
    }

    fn clear(&self) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "clear").clear();
        Ok(())
    }
}
