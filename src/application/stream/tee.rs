use crate::domain::events::{Event, EventSink, StreamError};

use super::compiler::EventCompiler;

/// Forwards every event downstream and records a copy in a compiler.
pub struct TeeSink<'a> {
    next: Box<dyn EventSink + 'a>,
    capture: &'a mut EventCompiler,
}

impl<'a> TeeSink<'a> {
    pub fn new(next: Box<dyn EventSink + 'a>, capture: &'a mut EventCompiler) -> Self {
        Self { next, capture }
    }
}

impl EventSink for TeeSink<'_> {
    fn handle(&mut self, event: &Event) -> Result<(), StreamError> {
        self.capture.handle(event)?;
        self.next.handle(event)
    }
}
