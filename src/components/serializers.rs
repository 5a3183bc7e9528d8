//! Built-in serializers.

use std::io::Write;

use crate::application::pipeline::{Cacheable, Serializer};
use crate::domain::error::DomainError;
use crate::domain::events::{Attribute, Event, StreamError};
use crate::domain::parameters::Parameters;
use crate::domain::validity::Validity;

use super::cacheable_param;

/// Writes events back out as XML text.
#[derive(Debug, Default)]
pub struct XmlSerializer {
    declaration: bool,
    cacheable: bool,
    pending_namespaces: Vec<(String, String)>,
    in_cdata: bool,
}

impl Cacheable for XmlSerializer {
    fn cache_key(&self) -> Option<String> {
        self.cacheable
            .then(|| format!("xml;declaration={}", self.declaration))
    }

    fn validity(&self) -> Option<Validity> {
        self.cacheable.then_some(Validity::Nop)
    }
}

impl Serializer for XmlSerializer {
    fn setup(&mut self, _source: Option<&str>, params: &Parameters) -> Result<(), DomainError> {
        self.declaration = params.get_bool("declaration")?.unwrap_or(true);
        self.cacheable = cacheable_param(params)?;
        self.pending_namespaces.clear();
        self.in_cdata = false;
        Ok(())
    }

    fn mime_type(&self) -> Option<String> {
        Some("text/xml".to_string())
    }

    fn serialize(&mut self, event: &Event, output: &mut dyn Write) -> Result<(), StreamError> {
        match event {
            Event::StartDocument => {
                if self.declaration {
                    output.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
                }
            }
            Event::EndDocument => output.write_all(b"\n")?,
            Event::StartPrefixMapping { prefix, uri } => {
                self.pending_namespaces.push((prefix.clone(), uri.clone()));
            }
            Event::StartElement { name, attributes } => {
                let mut tag = format!("<{}", name.qname);
                for (prefix, uri) in self.pending_namespaces.drain(..) {
                    if prefix.is_empty() {
                        tag.push_str(&format!(" xmlns=\"{}\"", escape_attribute(&uri)));
                    } else {
                        tag.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape_attribute(&uri)));
                    }
                }
                for Attribute { name, value } in attributes {
                    tag.push_str(&format!(" {}=\"{}\"", name.qname, escape_attribute(value)));
                }
                tag.push('>');
                output.write_all(tag.as_bytes())?;
            }
            Event::EndElement { name } => write!(output, "</{}>", name.qname)?,
            Event::Characters(text) => {
                if self.in_cdata {
                    output.write_all(text.as_bytes())?;
                } else {
                    output.write_all(escape_text(text).as_bytes())?;
                }
            }
            Event::IgnorableWhitespace(text) => output.write_all(text.as_bytes())?,
            Event::ProcessingInstruction { target, data } => {
                write!(output, "<?{target} {data}?>")?
            }
            Event::Comment(text) => write!(output, "<!--{text}-->")?,
            Event::StartCdata => {
                self.in_cdata = true;
                output.write_all(b"<![CDATA[")?;
            }
            Event::EndCdata => {
                self.in_cdata = false;
                output.write_all(b"]]>")?;
            }
            Event::StartDtd {
                name,
                public_id,
                system_id,
            } => {
                let mut doctype = format!("<!DOCTYPE {name}");
                match (public_id, system_id) {
                    (Some(public_id), Some(system_id)) => {
                        doctype.push_str(&format!(" PUBLIC \"{public_id}\" \"{system_id}\""))
                    }
                    (None, Some(system_id)) => {
                        doctype.push_str(&format!(" SYSTEM \"{system_id}\""))
                    }
                    _ => {}
                }
                doctype.push('>');
                output.write_all(doctype.as_bytes())?;
            }
            Event::SkippedEntity(name) => write!(output, "&{name};")?,
            Event::EndPrefixMapping { .. }
            | Event::EndDtd
            | Event::StartEntity(_)
            | Event::EndEntity(_) => {}
        }
        Ok(())
    }
}

/// Writes character data only.
#[derive(Debug, Default)]
pub struct TextSerializer {
    cacheable: bool,
}

impl Cacheable for TextSerializer {
    fn cache_key(&self) -> Option<String> {
        self.cacheable.then(|| "text".to_string())
    }

    fn validity(&self) -> Option<Validity> {
        self.cacheable.then_some(Validity::Nop)
    }
}

impl Serializer for TextSerializer {
    fn setup(&mut self, _source: Option<&str>, params: &Parameters) -> Result<(), DomainError> {
        self.cacheable = cacheable_param(params)?;
        Ok(())
    }

    fn mime_type(&self) -> Option<String> {
        Some("text/plain".to_string())
    }

    fn serialize(&mut self, event: &Event, output: &mut dyn Write) -> Result<(), StreamError> {
        match event {
            Event::Characters(text) | Event::IgnorableWhitespace(text) => {
                output.write_all(text.as_bytes())?
            }
            Event::EndElement { name } if name.local_name == "line" => output.write_all(b"\n")?,
            _ => {}
        }
        Ok(())
    }
}

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\n' => escaped.push_str("&#10;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::QName;

    fn render(serializer: &mut dyn Serializer, events: &[Event]) -> String {
        let mut output = Vec::new();
        for event in events {
            serializer.serialize(event, &mut output).expect("serialize");
        }
        String::from_utf8(output).expect("utf-8")
    }

    #[test]
    fn xml_serializer_escapes_text_and_attributes() {
        let mut serializer = XmlSerializer::default();
        serializer
            .setup(None, &Parameters::new().with("declaration", "false"))
            .expect("setup");
        let xml = render(
            &mut serializer,
            &[
                Event::StartDocument,
                Event::start("a", vec![Attribute::new("title", "\"q\" & <r>")]),
                Event::text("1 < 2 & 3"),
                Event::end("a"),
                Event::EndDocument,
            ],
        );
        assert_eq!(
            xml,
            "<a title=\"&quot;q&quot; &amp; &lt;r&gt;\">1 &lt; 2 &amp; 3</a>\n"
        );
    }

    #[test]
    fn xml_serializer_writes_namespaces_and_cdata() {
        let mut serializer = XmlSerializer::default();
        serializer.setup(None, &Parameters::new()).expect("setup");
        let xml = render(
            &mut serializer,
            &[
                Event::StartDocument,
                Event::StartPrefixMapping {
                    prefix: "x".into(),
                    uri: "urn:x".into(),
                },
                Event::StartElement {
                    name: QName::namespaced("urn:x", "a", "x:a"),
                    attributes: Vec::new(),
                },
                Event::StartCdata,
                Event::text("<raw>"),
                Event::EndCdata,
                Event::EndElement {
                    name: QName::namespaced("urn:x", "a", "x:a"),
                },
                Event::EndDocument,
            ],
        );
        insta::assert_snapshot!(
            xml.trim_end(),
            @r#"<?xml version="1.0" encoding="UTF-8"?><x:a xmlns:x="urn:x"><![CDATA[<raw>]]></x:a>"#
        );
    }

    #[test]
    fn text_serializer_keeps_only_text() {
        let mut serializer = TextSerializer::default();
        serializer.setup(None, &Parameters::new()).expect("setup");
        let text = render(
            &mut serializer,
            &[
                Event::start("document", Vec::new()),
                Event::start("line", Vec::new()),
                Event::text("one"),
                Event::end("line"),
                Event::start("line", Vec::new()),
                Event::text("two"),
                Event::end("line"),
                Event::end("document"),
            ],
        );
        assert_eq!(text, "one\ntwo\n");
        assert_eq!(serializer.mime_type().as_deref(), Some("text/plain"));
    }
}
