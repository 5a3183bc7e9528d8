//! Cache store configuration.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_STORE_LIMIT: usize = 1000;

/// Settings for the default in-memory cache store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached responses kept by the LRU store.
    pub store_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_limit: DEFAULT_STORE_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            store_limit: settings.store_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the store limit as NonZeroUsize, clamping to 1 if zero.
    pub fn store_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.store_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
