//! Response message and generated responses.
//!
//! # Responsibilities
//! - Model the upstream (or synthesized) response
//! - Build the error responses the connection handler writes on ABORT
//! - Keep-alive and redirect classification

use bytes::Bytes;

use crate::error::ProxyError;
use crate::http::body::Body;
use crate::http::header::{self, Header};
use crate::http::Version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub header: Header,
    pub body: Body,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            version: Version::Http11,
            status,
            reason: reason_phrase(status).to_string(),
            header: Header::new(),
            body: Body::Empty,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Interim response relayed for `Expect: 100-continue`.
    pub fn continue_100() -> Self {
        Self::new(100)
    }

    /// Synthetic answer to a CONNECT request.
    pub fn connection_established() -> Self {
        let mut res = Self::new(200);
        res.reason = "Connection established".to_string();
        res
    }

    /// A short `text/plain` response with a diagnostic message.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status).with_body("text/plain; charset=utf-8", message.into())
    }

    pub fn from_error(err: &ProxyError) -> Self {
        Self::error(err.status_code(), err.user_message())
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.header.add(name, value);
        self
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.header.set(header::CONTENT_TYPE, content_type);
        self.set_body(body);
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        let body = body.into();
        self.header.remove(header::TRANSFER_ENCODING);
        self.header.set(header::CONTENT_LENGTH, body.len().to_string());
        self.body = Body::from(body);
    }

    pub fn is_keep_alive(&self) -> bool {
        if self.header.has_token(header::CONNECTION, "close") {
            return false;
        }
        match self.version {
            Version::Http11 => true,
            Version::Http10 => self.header.has_token(header::CONNECTION, "keep-alive"),
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 1xx, 204 and 304 never carry a body.
    pub fn status_allows_body(&self) -> bool {
        !(self.status < 200 || self.status == 204 || self.status == 304)
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        417 => "Expectation Failed",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_from_unknown_host() {
        let res = Response::from_error(&ProxyError::UnknownHost { host: "x.invalid".into() });
        assert_eq!(res.status, 502);
        assert_eq!(res.reason, "Bad Gateway");
        let body = res.body.as_bytes().unwrap();
        assert!(std::str::from_utf8(body).unwrap().contains("DNS resolution failed"));
        assert_eq!(res.header.get("Content-Length"), Some(body.len().to_string().as_str()));
    }

    #[test]
    fn redirect_and_body_rules() {
        assert!(Response::new(302).is_redirect());
        assert!(!Response::new(304).is_redirect());
        assert!(!Response::new(204).status_allows_body());
        assert!(Response::new(200).status_allows_body());
    }
}
