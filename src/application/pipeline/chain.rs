//! Sinks wiring live stages together.

use std::io::Write;

use crate::domain::events::{Event, EventSink, StreamError};

use super::component::{Serializer, Transformer};

pub(crate) struct TransformerStage<'a> {
    transformer: &'a mut dyn Transformer,
    next: Box<dyn EventSink + 'a>,
}

impl<'a> TransformerStage<'a> {
    pub(crate) fn new(transformer: &'a mut dyn Transformer, next: Box<dyn EventSink + 'a>) -> Self {
        Self { transformer, next }
    }
}

impl EventSink for TransformerStage<'_> {
    fn handle(&mut self, event: &Event) -> Result<(), StreamError> {
        self.transformer.transform(event, &mut self.next)
    }
}

pub(crate) struct SerializerStage<'a> {
    serializer: &'a mut dyn Serializer,
    output: &'a mut dyn Write,
}

impl<'a> SerializerStage<'a> {
    pub(crate) fn new(serializer: &'a mut dyn Serializer, output: &'a mut dyn Write) -> Self {
        Self { serializer, output }
    }
}

impl EventSink for SerializerStage<'_> {
    fn handle(&mut self, event: &Event) -> Result<(), StreamError> {
        self.serializer.serialize(event, &mut *self.output)?;
        if matches!(event, Event::EndDocument) {
            self.output.flush()?;
        }
        Ok(())
    }
}
