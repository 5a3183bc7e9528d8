//! Pipeline assembly and cached execution.

mod assembly;
mod caching;
mod chain;
mod component;
mod config;
mod environment;
mod registry;

pub use assembly::{PipelineAssemblyState, PipelineState};
pub use caching::{CacheLookup, CachingPipeline, ProcessOutcome};
pub use component::{Cacheable, Generator, Serializer, Transformer};
pub use config::{AUTO_CACHING_POINT_PARAM, CACHE_ROLE_PARAM, PipelineConfig, parse_switch};
pub use environment::{BufferedEnvironment, Environment};
pub use registry::{
    ComponentRegistry, GeneratorFactory, SerializerFactory, TransformerFactory,
};
