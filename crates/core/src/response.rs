//! Transport-neutral description of how to answer a request for a file ID.

use std::fmt;
use std::io::Read;

pub enum ResponseBody {
    Empty,
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Status, headers and body for one asset request.
///
/// Built by [`AssetStore::get_response_for`](crate::AssetStore::get_response_for); the HTTP
/// layer only copies it onto its own response type.
#[derive(Debug)]
pub struct AssetResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl AssetResponse {
    pub fn stream(body: Box<dyn Read + Send>, content_type: &str) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".into(), content_type.into())],
            body: ResponseBody::Stream(body),
        }
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("Location".into(), location.into())],
            body: ResponseBody::Empty,
        }
    }

    pub fn error(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn location(&self) -> Option<&str> {
        self.header("Location")
    }

    /// Reads the whole body. Intended for tests and small files.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        if let ResponseBody::Stream(mut reader) = self.body {
            reader.read_to_end(&mut bytes)?;
        }
        Ok(bytes)
    }
}
