//! HTTP/1.x message subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound bytes
//!     → codec.rs (start-line + headers via httparse, body framing)
//!     → request.rs / response.rs (message model)
//!     → header.rs (order-preserving multimap, keep-alive tokens)
//!     → body.rs (in-memory or still-pending body)
//!     → codec.rs (serialize back onto a socket)
//! ```
//!
//! # Design Decisions
//! - Only what the gateway core needs: no HTTP/2, no upgrades
//! - Header names keep their original spelling; lookups ignore case
//! - Bodies are buffered in memory once read

pub mod body;
pub mod codec;
pub mod header;
pub mod request;
pub mod response;

pub use body::{Body, Framing};
pub use header::Header;
pub use request::Request;
pub use response::Response;

/// Protocol version of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Version::Http10 => f.write_str("HTTP/1.0"),
            Version::Http11 => f.write_str("HTTP/1.1"),
        }
    }
}
