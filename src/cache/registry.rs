//! Named cache stores shared by pipeline instances.
//!
//! Pipelines pick their store through the `cache-role` parameter; the
//! registry resolves that role to a shared [`CacheStore`] handle.

use std::sync::Arc;

use dashmap::DashMap;

use super::config::CacheConfig;
use super::store::{CacheStore, LruCacheStore};

/// Role under which the default in-memory store is registered.
pub const DEFAULT_STORE_ROLE: &str = "default";

pub struct StoreRegistry {
    stores: DashMap<String, Arc<dyn CacheStore>>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            stores: DashMap::new(),
        }
    }

    /// Registry holding one [`LruCacheStore`] under [`DEFAULT_STORE_ROLE`].
    pub fn with_default_store(config: &CacheConfig) -> Self {
        let registry = Self::new();
        registry.register(DEFAULT_STORE_ROLE, Arc::new(LruCacheStore::new(config)));
        registry
    }

    /// Register a store, replacing any store already bound to `role`.
    pub fn register(&self, role: impl Into<String>, store: Arc<dyn CacheStore>) {
        self.stores.insert(role.into(), store);
    }

    pub fn get(&self, role: &str) -> Option<Arc<dyn CacheStore>> {
        self.stores.get(role).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered roles, sorted.
    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.stores.iter().map(|entry| entry.key().clone()).collect();
        roles.sort();
        roles
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}
