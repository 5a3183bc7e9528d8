//! Application layer: event streams and the caching pipeline.

pub mod error;
pub mod pipeline;
pub mod stream;
