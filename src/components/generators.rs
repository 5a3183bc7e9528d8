//! Built-in generators.

use std::fs;
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::application::pipeline::{Cacheable, Generator};
use crate::domain::error::DomainError;
use crate::domain::events::{Attribute, Event, EventSink, StreamError};
use crate::domain::parameters::Parameters;
use crate::domain::validity::Validity;

use super::cacheable_param;

const DEFAULT_ROOT: &str = "document";

/// Emits a document holding the `src` text, one `<line>` per line.
#[derive(Debug, Default)]
pub struct InlineGenerator {
    text: String,
    root: String,
    cacheable: bool,
    params: Parameters,
}

impl Cacheable for InlineGenerator {
    fn cache_key(&self) -> Option<String> {
        self.cacheable
            .then(|| self.params.fingerprint_with(&self.text))
    }

    fn validity(&self) -> Option<Validity> {
        self.cacheable.then(|| Validity::digest_of(&self.text))
    }
}

impl Generator for InlineGenerator {
    fn setup(&mut self, source: Option<&str>, params: &Parameters) -> Result<(), DomainError> {
        self.text = source.unwrap_or_default().to_string();
        self.root = params.get_or("root", DEFAULT_ROOT).to_string();
        self.cacheable = cacheable_param(params)?;
        self.params = params.clone();
        Ok(())
    }

    fn generate(&mut self, sink: &mut dyn EventSink) -> Result<(), StreamError> {
        emit_lines(sink, &self.root, Vec::new(), &self.text)
    }
}

/// Which freshness token the file generator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FileValidity {
    #[default]
    Timestamp,
    Digest,
}

/// Reads a UTF-8 text file and emits one `<line>` per non-empty line.
#[derive(Debug, Default)]
pub struct FileGenerator {
    path: PathBuf,
    root: String,
    validity: FileValidity,
    cacheable: bool,
    params: Parameters,
}

impl Cacheable for FileGenerator {
    fn cache_key(&self) -> Option<String> {
        self.cacheable
            .then(|| self.params.fingerprint_with(&self.path.to_string_lossy()))
    }

    fn validity(&self) -> Option<Validity> {
        if !self.cacheable {
            return None;
        }
        match self.validity {
            FileValidity::Timestamp => {
                let modified = fs::metadata(&self.path).and_then(|meta| meta.modified()).ok()?;
                Some(Validity::timestamp(OffsetDateTime::from(modified)))
            }
            FileValidity::Digest => fs::read(&self.path).ok().map(Validity::digest_of),
        }
    }
}

impl Generator for FileGenerator {
    fn setup(&mut self, source: Option<&str>, params: &Parameters) -> Result<(), DomainError> {
        let source = source
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| DomainError::validation("`src` is required"))?;
        self.path = PathBuf::from(source);
        self.root = params.get_or("root", DEFAULT_ROOT).to_string();
        self.validity = match params.get_or("validity", "timestamp") {
            "timestamp" => FileValidity::Timestamp,
            "digest" => FileValidity::Digest,
            other => {
                return Err(DomainError::validation(format!(
                    "unknown validity `{other}`, expected `timestamp` or `digest`"
                )));
            }
        };
        self.cacheable = cacheable_param(params)?;
        self.params = params.clone();
        Ok(())
    }

    fn generate(&mut self, sink: &mut dyn EventSink) -> Result<(), StreamError> {
        let text = fs::read_to_string(&self.path)?;
        let attributes = vec![Attribute::new("src", self.path.display().to_string())];
        emit_lines(sink, &self.root, attributes, &text)
    }
}

fn emit_lines(
    sink: &mut dyn EventSink,
    root: &str,
    attributes: Vec<Attribute>,
    text: &str,
) -> Result<(), StreamError> {
    sink.handle(&Event::StartDocument)?;
    sink.handle(&Event::start(root, attributes))?;
    for line in text.lines().map(str::trim_end).filter(|line| !line.is_empty()) {
        sink.handle(&Event::start("line", Vec::new()))?;
        sink.handle(&Event::text(line))?;
        sink.handle(&Event::end("line"))?;
    }
    sink.handle(&Event::end(root))?;
    sink.handle(&Event::EndDocument)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::domain::events::{EventLog, check_balanced};

    #[test]
    fn inline_generator_emits_one_line_element_per_line() {
        let mut generator = InlineGenerator::default();
        generator
            .setup(Some("first\n\nsecond"), &Parameters::new())
            .expect("setup");
        let mut log = EventLog::new();
        generator.generate(&mut log).expect("generate");

        assert!(check_balanced(log.events()).is_ok());
        let lines = log
            .events()
            .iter()
            .filter(|event| matches!(event, Event::Characters(_)))
            .count();
        assert_eq!(lines, 2);
    }

    #[test]
    fn inline_generator_key_tracks_content_and_params() {
        let mut a = InlineGenerator::default();
        a.setup(Some("x"), &Parameters::new()).expect("setup");
        let mut b = InlineGenerator::default();
        b.setup(Some("x"), &Parameters::new().with("root", "page"))
            .expect("setup");
        assert_ne!(a.cache_key(), b.cache_key());
        assert!(a.validity().is_some());
    }

    #[test]
    fn inline_generator_key_keeps_params_and_text_apart() {
        let mut embedded = InlineGenerator::default();
        embedded
            .setup(Some("hello"), &Parameters::new().with("root", "x;zz=y"))
            .expect("setup");
        let mut split = InlineGenerator::default();
        split
            .setup(
                Some("hello"),
                &Parameters::new().with("root", "x").with("zz", "y"),
            )
            .expect("setup");
        assert_ne!(embedded.cache_key(), split.cache_key());

        let mut piped = InlineGenerator::default();
        piped
            .setup(Some("a|b"), &Parameters::new())
            .expect("setup");
        let mut plain = InlineGenerator::default();
        plain
            .setup(Some("b"), &Parameters::new().with("a", ""))
            .expect("setup");
        assert_ne!(piped.cache_key(), plain.cache_key());
    }

    #[test]
    fn cacheable_false_disables_caching() {
        let mut generator = InlineGenerator::default();
        generator
            .setup(Some("x"), &Parameters::new().with("cacheable", "false"))
            .expect("setup");
        assert!(generator.cache_key().is_none());
        assert!(generator.validity().is_none());
    }

    #[test]
    fn file_generator_requires_source() {
        let mut generator = FileGenerator::default();
        assert!(generator.setup(None, &Parameters::new()).is_err());
        assert!(generator.setup(Some("  "), &Parameters::new()).is_err());
    }

    #[test]
    fn file_generator_digest_follows_content() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "alpha").expect("write");

        let mut generator = FileGenerator::default();
        let source = file.path().to_string_lossy().into_owned();
        generator
            .setup(Some(&source), &Parameters::new().with("validity", "digest"))
            .expect("setup");
        let before = generator.validity().expect("digest validity");

        writeln!(file, "beta").expect("write");
        let after = generator.validity().expect("digest validity");
        assert_ne!(before, after);

        let mut log = EventLog::new();
        generator.generate(&mut log).expect("generate");
        assert!(log.events().contains(&Event::text("beta")));
    }

    #[test]
    fn file_generator_reports_timestamp_by_default() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let mut generator = FileGenerator::default();
        let source = file.path().to_string_lossy().into_owned();
        generator
            .setup(Some(&source), &Parameters::new())
            .expect("setup");
        assert!(matches!(generator.validity(), Some(Validity::TimeStamp(_))));
    }

    #[test]
    fn missing_file_is_not_cacheable_and_fails_to_generate() {
        let mut generator = FileGenerator::default();
        generator
            .setup(Some("/definitely/not/here.txt"), &Parameters::new())
            .expect("setup");
        assert!(generator.validity().is_none());
        let mut log = EventLog::new();
        assert!(matches!(
            generator.generate(&mut log),
            Err(StreamError::Io(_))
        ));
    }
}
