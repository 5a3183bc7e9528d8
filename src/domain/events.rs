//! Structured document events flowing between pipeline stages.
//!
//! Stages never exchange text; they exchange a sequence of [`Event`]s modelled
//! after a SAX event log. Every stage that accepts events implements
//! [`EventSink`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Qualified element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    pub uri: String,
    pub local_name: String,
    pub qname: String,
}

impl QName {
    /// Name without a namespace; the qualified name equals the local name.
    pub fn local(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uri: String::new(),
            qname: name.clone(),
            local_name: name,
        }
    }

    pub fn namespaced(
        uri: impl Into<String>,
        local_name: impl Into<String>,
        qname: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            local_name: local_name.into(),
            qname: qname.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: QName::local(name),
            value: value.into(),
        }
    }
}

/// One structured output event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    StartDocument,
    EndDocument,
    StartPrefixMapping {
        prefix: String,
        uri: String,
    },
    EndPrefixMapping {
        prefix: String,
    },
    StartElement {
        name: QName,
        attributes: Vec<Attribute>,
    },
    EndElement {
        name: QName,
    },
    Characters(String),
    IgnorableWhitespace(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    Comment(String),
    StartCdata,
    EndCdata,
    StartDtd {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    EndDtd,
    StartEntity(String),
    EndEntity(String),
    SkippedEntity(String),
}

impl Event {
    /// Convenience constructor for an unqualified start tag.
    pub fn start(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self::StartElement {
            name: QName::local(name),
            attributes,
        }
    }

    /// Convenience constructor for an unqualified end tag.
    pub fn end(name: impl Into<String>) -> Self {
        Self::EndElement {
            name: QName::local(name),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Characters(text.into())
    }

    /// Stable lowercase label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::StartDocument => "start_document",
            Event::EndDocument => "end_document",
            Event::StartPrefixMapping { .. } => "start_prefix_mapping",
            Event::EndPrefixMapping { .. } => "end_prefix_mapping",
            Event::StartElement { .. } => "start_element",
            Event::EndElement { .. } => "end_element",
            Event::Characters(_) => "characters",
            Event::IgnorableWhitespace(_) => "ignorable_whitespace",
            Event::ProcessingInstruction { .. } => "processing_instruction",
            Event::Comment(_) => "comment",
            Event::StartCdata => "start_cdata",
            Event::EndCdata => "end_cdata",
            Event::StartDtd { .. } => "start_dtd",
            Event::EndDtd => "end_dtd",
            Event::StartEntity(_) => "start_entity",
            Event::EndEntity(_) => "end_entity",
            Event::SkippedEntity(_) => "skipped_entity",
        }
    }
}

/// Errors raised while producing, forwarding, encoding or decoding events.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("event stream encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("event stream decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("compiled event stream is malformed: {message}")]
    Malformed { message: String },
    #[error("unbalanced event stream: {message}")]
    Unbalanced { message: String },
    #[error("i/o error while writing events: {0}")]
    Io(#[from] std::io::Error),
    #[error("stage `{stage}` failed: {message}")]
    Stage { stage: String, message: String },
}

impl StreamError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    pub fn unbalanced(message: impl Into<String>) -> Self {
        Self::Unbalanced {
            message: message.into(),
        }
    }

    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Consumer of an event stream.
pub trait EventSink {
    fn handle(&mut self, event: &Event) -> Result<(), StreamError>;
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn handle(&mut self, event: &Event) -> Result<(), StreamError> {
        (**self).handle(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn handle(&mut self, event: &Event) -> Result<(), StreamError> {
        (**self).handle(event)
    }
}

/// Sink that records every event it receives. Useful when a caller needs the
/// events themselves rather than a compiled buffer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for EventLog {
    fn handle(&mut self, event: &Event) -> Result<(), StreamError> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Check that element, CDATA and document boundaries nest properly.
pub fn check_balanced(events: &[Event]) -> Result<(), StreamError> {
    let mut open: Vec<&QName> = Vec::new();
    let mut in_cdata = false;
    let mut document_open = false;

    for event in events {
        match event {
            Event::StartDocument => {
                if document_open {
                    return Err(StreamError::unbalanced("nested start_document"));
                }
                document_open = true;
            }
            Event::EndDocument => {
                if !open.is_empty() {
                    return Err(StreamError::unbalanced(format!(
                        "end_document with {} open element(s)",
                        open.len()
                    )));
                }
                document_open = false;
            }
            Event::StartElement { name, .. } => open.push(name),
            Event::EndElement { name } => match open.pop() {
                Some(expected) if expected == name => {}
                Some(expected) => {
                    return Err(StreamError::unbalanced(format!(
                        "expected </{}> but found </{}>",
                        expected.qname, name.qname
                    )));
                }
                None => {
                    return Err(StreamError::unbalanced(format!(
                        "</{}> without matching start",
                        name.qname
                    )));
                }
            },
            Event::StartCdata => in_cdata = true,
            Event::EndCdata => {
                if !in_cdata {
                    return Err(StreamError::unbalanced("end_cdata without start_cdata"));
                }
                in_cdata = false;
            }
            _ => {}
        }
    }

    if !open.is_empty() {
        return Err(StreamError::unbalanced(format!(
            "{} element(s) left open",
            open.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Vec<Event> {
        vec![
            Event::StartDocument,
            Event::start("page", vec![Attribute::new("id", "1")]),
            Event::text("hello"),
            Event::end("page"),
            Event::EndDocument,
        ]
    }

    #[test]
    fn event_log_records_in_order() {
        let mut log = EventLog::new();
        for event in document() {
            log.handle(&event).expect("log accepts events");
        }
        assert_eq!(log.len(), 5);
        assert_eq!(log.into_events(), document());
    }

    #[test]
    fn balanced_document_passes() {
        assert!(check_balanced(&document()).is_ok());
    }

    #[test]
    fn mismatched_end_tag_is_rejected() {
        let events = vec![
            Event::StartDocument,
            Event::start("a", Vec::new()),
            Event::end("b"),
            Event::EndDocument,
        ];
        let err = check_balanced(&events).expect_err("mismatch must fail");
        assert!(err.to_string().contains("expected </a>"));
    }

    #[test]
    fn unclosed_element_is_rejected() {
        let events = vec![Event::start("a", Vec::new())];
        assert!(check_balanced(&events).is_err());
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(Event::StartDocument.kind(), "start_document");
        assert_eq!(Event::text("x").kind(), "characters");
        assert_eq!(Event::end("x").kind(), "end_element");
    }
}
