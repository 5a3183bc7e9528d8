//! Where pipeline output goes.

use std::io::{self, Write};

use bytes::Bytes;

/// Response side of a request as seen by a pipeline.
pub trait Environment {
    fn output(&mut self) -> &mut dyn Write;

    fn set_content_type(&mut self, content_type: &str);
}

/// Environment collecting the response in memory.
#[derive(Debug, Default)]
pub struct BufferedEnvironment {
    body: Vec<u8>,
    content_type: Option<String>,
}

impl BufferedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn into_body(self) -> Bytes {
        Bytes::from(self.body)
    }
}

impl Environment for BufferedEnvironment {
    fn output(&mut self) -> &mut dyn Write {
        &mut self.body
    }

    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }
}

/// Writer that forwards to the response and, when enabled, keeps a copy of
/// everything written so the complete response can be cached.
pub(crate) struct CachingWriter<'a> {
    inner: &'a mut dyn Write,
    captured: Option<Vec<u8>>,
}

impl<'a> CachingWriter<'a> {
    pub(crate) fn new(inner: &'a mut dyn Write, capture: bool) -> Self {
        Self {
            inner,
            captured: capture.then(Vec::new),
        }
    }

    pub(crate) fn into_captured(self) -> Option<Vec<u8>> {
        self.captured
    }
}

impl Write for CachingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        if let Some(captured) = self.captured.as_mut() {
            captured.extend_from_slice(&buf[..written]);
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
