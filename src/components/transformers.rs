//! Built-in transformers.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::application::pipeline::{Cacheable, Transformer};
use crate::domain::error::DomainError;
use crate::domain::events::{Attribute, Event, EventSink, StreamError};
use crate::domain::parameters::Parameters;
use crate::domain::validity::Validity;

use super::cacheable_param;

/// Upper-cases character data.
#[derive(Debug, Default)]
pub struct UppercaseTransformer {
    cacheable: bool,
}

impl Cacheable for UppercaseTransformer {
    fn cache_key(&self) -> Option<String> {
        self.cacheable.then(|| "uppercase".to_string())
    }

    fn validity(&self) -> Option<Validity> {
        self.cacheable.then_some(Validity::Nop)
    }
}

impl Transformer for UppercaseTransformer {
    fn setup(&mut self, _source: Option<&str>, params: &Parameters) -> Result<(), DomainError> {
        self.cacheable = cacheable_param(params)?;
        Ok(())
    }

    fn transform(&mut self, event: &Event, next: &mut dyn EventSink) -> Result<(), StreamError> {
        match event {
            Event::Characters(text) => next.handle(&Event::Characters(text.to_uppercase())),
            other => next.handle(other),
        }
    }
}

/// Wraps the root element in a new element.
#[derive(Debug, Default)]
pub struct WrapTransformer {
    element: String,
    class: Option<String>,
    cacheable: bool,
    depth: usize,
}

impl Cacheable for WrapTransformer {
    fn cache_key(&self) -> Option<String> {
        self.cacheable.then(|| {
            let mut key = Parameters::new().with("element", self.element.as_str());
            if let Some(class) = &self.class {
                key.set("class", class.as_str());
            }
            key.fingerprint()
        })
    }

    fn validity(&self) -> Option<Validity> {
        self.cacheable.then_some(Validity::Nop)
    }
}

impl Transformer for WrapTransformer {
    fn setup(&mut self, _source: Option<&str>, params: &Parameters) -> Result<(), DomainError> {
        let element = params.require("element")?.trim();
        if element.is_empty() || element.contains(char::is_whitespace) {
            return Err(DomainError::validation(format!(
                "`{element}` is not a valid element name"
            )));
        }
        self.element = element.to_string();
        self.class = params.get("class").map(str::to_string);
        self.cacheable = cacheable_param(params)?;
        self.depth = 0;
        Ok(())
    }

    fn transform(&mut self, event: &Event, next: &mut dyn EventSink) -> Result<(), StreamError> {
        match event {
            Event::StartElement { .. } => {
                if self.depth == 0 {
                    let attributes = self
                        .class
                        .iter()
                        .map(|class| Attribute::new("class", class.as_str()))
                        .collect();
                    next.handle(&Event::start(self.element.as_str(), attributes))?;
                }
                self.depth += 1;
                next.handle(event)
            }
            Event::EndElement { .. } => {
                next.handle(event)?;
                self.depth = self.depth.saturating_sub(1);
                if self.depth == 0 {
                    next.handle(&Event::end(self.element.as_str()))?;
                }
                Ok(())
            }
            other => next.handle(other),
        }
    }
}

/// Stamps the root element with the time of the request. Never cacheable.
#[derive(Debug, Default)]
pub struct TimestampTransformer {
    attribute: String,
    stamped: bool,
}

impl Cacheable for TimestampTransformer {}

impl Transformer for TimestampTransformer {
    fn setup(&mut self, _source: Option<&str>, params: &Parameters) -> Result<(), DomainError> {
        self.attribute = params.get_or("attribute", "generated-at").to_string();
        self.stamped = false;
        Ok(())
    }

    fn transform(&mut self, event: &Event, next: &mut dyn EventSink) -> Result<(), StreamError> {
        match event {
            Event::StartElement { name, attributes } if !self.stamped => {
                self.stamped = true;
                let now = OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .map_err(|err| StreamError::stage("timestamp", err.to_string()))?;
                let mut attributes = attributes.clone();
                attributes.push(Attribute::new(self.attribute.as_str(), now));
                next.handle(&Event::StartElement {
                    name: name.clone(),
                    attributes,
                })
            }
            other => next.handle(other),
        }
    }
}
