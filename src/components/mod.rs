//! Built-in pipeline components.
//!
//! | kind        | role        | cache key                      | validity            |
//! |-------------|-------------|--------------------------------|---------------------|
//! | generator   | `inline`    | params + text                  | digest of the text  |
//! | generator   | `file`      | path + params                  | mtime or digest     |
//! | transformer | `uppercase` | constant                       | always valid        |
//! | transformer | `wrap`      | element name                   | always valid        |
//! | transformer | `timestamp` | none                           | none                |
//! | serializer  | `xml`       | declaration flag               | always valid        |
//! | serializer  | `text`      | constant                       | always valid        |
//!
//! Every cacheable component accepts `cacheable = "false"` to opt out.

pub mod generators;
pub mod serializers;
pub mod transformers;

use crate::application::pipeline::ComponentRegistry;
use crate::domain::error::DomainError;
use crate::domain::parameters::Parameters;

pub use generators::{FileGenerator, InlineGenerator};
pub use serializers::{TextSerializer, XmlSerializer};
pub use transformers::{TimestampTransformer, UppercaseTransformer, WrapTransformer};

pub fn register_builtin(registry: &mut ComponentRegistry) {
    registry.register_generator("inline", || Box::new(InlineGenerator::default()));
    registry.register_generator("file", || Box::new(FileGenerator::default()));
    registry.register_transformer("uppercase", || Box::new(UppercaseTransformer::default()));
    registry.register_transformer("wrap", || Box::new(WrapTransformer::default()));
    registry.register_transformer("timestamp", || Box::new(TimestampTransformer::default()));
    registry.register_serializer("xml", || Box::new(XmlSerializer::default()));
    registry.register_serializer("text", || Box::new(TextSerializer::default()));
}

fn cacheable_param(params: &Parameters) -> Result<bool, DomainError> {
    Ok(params.get_bool("cacheable")?.unwrap_or(true))
}
