//! Contracts for pipeline stages.

use std::io::Write;

use crate::domain::error::DomainError;
use crate::domain::events::{Event, EventSink, StreamError};
use crate::domain::parameters::Parameters;
use crate::domain::validity::Validity;

/// Cacheability of a stage for the current request.
///
/// A stage takes part in caching only when it reports both a key and a
/// validity. Keys must be stable: equal keys at the same position promise
/// identical output for identical input.
pub trait Cacheable {
    fn cache_key(&self) -> Option<String> {
        None
    }

    fn validity(&self) -> Option<Validity> {
        None
    }
}

/// First stage: produces the event stream.
pub trait Generator: Cacheable + Send {
    fn setup(&mut self, source: Option<&str>, params: &Parameters) -> Result<(), DomainError>;

    fn generate(&mut self, sink: &mut dyn EventSink) -> Result<(), StreamError>;
}

/// Middle stage: rewrites events on their way downstream.
pub trait Transformer: Cacheable + Send {
    fn setup(&mut self, source: Option<&str>, params: &Parameters) -> Result<(), DomainError>;

    fn transform(&mut self, event: &Event, next: &mut dyn EventSink) -> Result<(), StreamError>;
}

/// Last stage: turns events into bytes.
pub trait Serializer: Cacheable + Send {
    fn setup(&mut self, source: Option<&str>, params: &Parameters) -> Result<(), DomainError>;

    fn mime_type(&self) -> Option<String> {
        None
    }

    fn serialize(&mut self, event: &Event, output: &mut dyn Write) -> Result<(), StreamError>;
}
