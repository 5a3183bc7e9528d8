use bytes::{BufMut, Bytes, BytesMut};

use crate::domain::events::{Event, EventSink, StreamError};

/// Leading bytes of every compiled event stream.
pub const MAGIC: &[u8; 4] = b"TXEV";
/// Current compiled stream format.
pub const FORMAT_VERSION: u8 = 1;
pub(crate) const HEADER_LEN: usize = MAGIC.len() + 1;

/// Captures the events it receives so they can be stored as bytes.
#[derive(Debug, Default)]
pub struct EventCompiler {
    events: Vec<Event>,
}

impl EventCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events captured so far.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Compile everything captured so far into the replayable byte form.
    pub fn sax_fragment(&self) -> Result<Bytes, StreamError> {
        let payload = rmp_serde::to_vec(&self.events)?;
        let mut buffer = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buffer.put_slice(MAGIC);
        buffer.put_u8(FORMAT_VERSION);
        buffer.put_slice(&payload);
        Ok(buffer.freeze())
    }

    /// Compile a complete event sequence in one go.
    pub fn compile(events: &[Event]) -> Result<Bytes, StreamError> {
        let mut compiler = Self::new();
        for event in events {
            compiler.handle(event)?;
        }
        compiler.sax_fragment()
    }
}

impl EventSink for EventCompiler {
    fn handle(&mut self, event: &Event) -> Result<(), StreamError> {
        self.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_starts_with_header() {
        let bytes = EventCompiler::compile(&[Event::StartDocument, Event::EndDocument])
            .expect("compile");
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(bytes[4], FORMAT_VERSION);
        assert!(bytes.len() > HEADER_LEN);
    }

    #[test]
    fn fragment_can_be_taken_repeatedly() {
        let mut compiler = EventCompiler::new();
        compiler.handle(&Event::StartDocument).expect("handle");
        let first = compiler.sax_fragment().expect("compile");
        let second = compiler.sax_fragment().expect("compile");
        assert_eq!(first, second);
        assert_eq!(compiler.len(), 1);
    }
}
