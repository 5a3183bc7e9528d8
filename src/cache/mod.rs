//! Trellis cache stores.
//!
//! - [`CacheStore`]: the contract pipelines use to read and write cached
//!   prefixes. Implementations are shared across threads.
//! - [`LruCacheStore`]: bounded in-memory store, the default.
//! - [`StoreRegistry`]: resolves the `cache-role` parameter to a store.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! store_limit = 1000
//! ```

mod config;
mod lock;
mod registry;
mod store;

pub use config::CacheConfig;
pub use registry::{DEFAULT_STORE_ROLE, StoreRegistry};
pub use store::{CacheStore, CachedResponse, LruCacheStore, StoreError};
