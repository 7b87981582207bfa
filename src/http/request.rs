//! Inbound/outbound request message.

use bytes::Bytes;

use crate::http::body::Body;
use crate::http::header::{self, Header};
use crate::http::Version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub version: Version,
    pub header: Header,
    pub body: Body,
}

impl Request {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            version: Version::Http11,
            header: Header::new(),
            body: Body::Empty,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    /// Builder-style header append.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.header.add(name, value);
        self
    }

    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }

    pub fn is_http10(&self) -> bool {
        self.version == Version::Http10
    }

    /// HTTP/1.1 is persistent unless `Connection: close`; HTTP/1.0 only with
    /// an explicit `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        if self.header.has_token(header::CONNECTION, "close") {
            return false;
        }
        match self.version {
            Version::Http11 => true,
            Version::Http10 => self.header.has_token(header::CONNECTION, "keep-alive"),
        }
    }

    /// Replace the body and fix up the framing headers.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        let body = body.into();
        self.header.remove(header::TRANSFER_ENCODING);
        self.header.set(header::CONTENT_LENGTH, body.len().to_string());
        self.body = Body::from(body);
    }

    /// `Proxy-Connection` is folded into `Connection` so keep-alive decisions
    /// only need to look at one header.
    pub fn fold_proxy_connection(&mut self) {
        let values: Vec<String> = self
            .header
            .get_all(header::PROXY_CONNECTION)
            .map(str::to_string)
            .collect();
        if values.is_empty() {
            return;
        }
        for value in values {
            self.header.add(header::CONNECTION, value);
        }
        self.header.remove(header::PROXY_CONNECTION);
    }

    /// Path and query of the request URI, even when it is absolute-form.
    pub fn path(&self) -> &str {
        let uri = self.uri.as_str();
        if let Some(rest) = uri.strip_prefix("http://").or_else(|| uri.strip_prefix("https://")) {
            return match rest.find('/') {
                Some(idx) => &rest[idx..],
                None => "/",
            };
        }
        uri
    }
}
