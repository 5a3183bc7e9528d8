use bytes::Bytes;

use crate::domain::events::{Event, EventSink, StreamError};

use super::compiler::{FORMAT_VERSION, HEADER_LEN, MAGIC};

/// Replays a compiled event stream into a sink.
///
/// The header is checked once on construction; the payload is decoded again
/// on every [`replay`](Self::replay), so one interpreter can feed any number
/// of consumers.
#[derive(Debug, Clone)]
pub struct EventInterpreter {
    compiled: Bytes,
}

impl EventInterpreter {
    pub fn new(compiled: Bytes) -> Result<Self, StreamError> {
        if compiled.is_empty() {
            return Err(StreamError::malformed("compiled event stream is empty"));
        }
        if compiled.len() < HEADER_LEN || &compiled[..MAGIC.len()] != MAGIC {
            return Err(StreamError::malformed("missing compiled event stream header"));
        }
        let version = compiled[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(StreamError::malformed(format!(
                "unsupported compiled event stream version {version}"
            )));
        }
        Ok(Self { compiled })
    }

    /// Decode the stored events without replaying them.
    pub fn events(&self) -> Result<Vec<Event>, StreamError> {
        Ok(rmp_serde::from_slice(&self.compiled[HEADER_LEN..])?)
    }

    pub fn replay(&self, sink: &mut dyn EventSink) -> Result<(), StreamError> {
        for event in self.events()? {
            sink.handle(&event)?;
        }
        Ok(())
    }
}
