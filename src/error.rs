//! Error taxonomy for a single exchange.
//!
//! Every failure is scoped to one exchange or one inbound connection. The
//! connection handler turns whatever ends up here into a generated response
//! via [`ProxyError::status_code`]; the upstream client consults
//! [`ProxyError::is_retryable`] before trying the next destination.

use std::io;

/// Errors raised while reading, processing or forwarding one request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// DNS resolution of the upstream host failed.
    #[error("unknown host: {host}")]
    UnknownHost { host: String },

    /// The upstream actively refused the connection.
    #[error("connection to {target} refused")]
    ConnectionRefused { target: String },

    /// An I/O error while sending to or receiving from the upstream.
    #[error("I/O error talking to {target}: {source}")]
    UpstreamIo {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Connect or read deadline expired.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Stream closed before the start-line was complete.
    #[error("stream closed while reading first line; line so far: {line_so_far:?}")]
    EofWhileReadingFirstLine { line_so_far: String },

    /// Stream closed inside the header block.
    #[error("stream closed while reading header line; line so far: {line_so_far:?}")]
    EofWhileReadingHeader { line_so_far: String },

    /// The peer closed an idle keep-alive connection before the next request.
    #[error("no more requests on this connection")]
    NoMoreRequests,

    /// Head or body could not be parsed.
    #[error("malformed HTTP message: {0}")]
    MalformedMessage(String),

    /// The upstream answered with something that is not valid HTTP.
    #[error("invalid response from {target}: {message}")]
    UpstreamProtocol { target: String, message: String },

    /// A body exceeded `transport.max_body_size`.
    #[error("body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },

    /// The inbound connection failed while the upstream call needed it.
    #[error("client connection failed: {0}")]
    ClientIo(String),

    /// A destination URI the client cannot use.
    #[error("invalid destination {0}")]
    InvalidDestination(String),

    /// The upstream client was invoked without any destination.
    #[error("list of destinations is empty")]
    NoDestinations,

    /// An exchange was stopped externally while waiting.
    #[error("exchange terminated")]
    Terminated,

    /// The request phase fell off the end of the chain.
    #[error("interceptor chain ended without RETURN or ABORT after '{last}'; is the HTTP client missing?")]
    ChainMisconfigured { last: String },

    /// An interceptor failed or panicked.
    #[error("interceptor '{name}' failed: {message}")]
    Interceptor { name: String, message: String },

    /// The flow controller was run twice on the same exchange.
    #[error("exchange already processed")]
    ExchangeReused,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ProxyError {
    /// Status code of the response generated for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::UnknownHost { .. }
            | ProxyError::ConnectionRefused { .. }
            | ProxyError::EofWhileReadingFirstLine { .. }
            | ProxyError::EofWhileReadingHeader { .. }
            | ProxyError::UpstreamProtocol { .. } => 502,
            ProxyError::Timeout(_) => 504,
            ProxyError::MalformedMessage(_) | ProxyError::ClientIo(_) => 400,
            ProxyError::BodyTooLarge { .. } => 413,
            _ => 500,
        }
    }

    /// Short diagnostic text for the generated response body.
    pub fn user_message(&self) -> String {
        match self {
            ProxyError::UnknownHost { host } => {
                format!("DNS resolution failed: target host {host} is unknown.")
            }
            ProxyError::ConnectionRefused { target } => {
                format!("Target {target} is not reachable.")
            }
            ProxyError::Timeout(_) => "Upstream timed out.".to_string(),
            ProxyError::Terminated => "Exchange was terminated.".to_string(),
            ProxyError::MalformedMessage(_) | ProxyError::ClientIo(_) => "Bad request.".to_string(),
            ProxyError::UpstreamProtocol { target, .. } => {
                format!("Target {target} sent an invalid response.")
            }
            ProxyError::BodyTooLarge { .. } => "Payload too large.".to_string(),
            _ => "Internal server error.".to_string(),
        }
    }

    /// Whether the upstream client may move on to the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProxyError::UnknownHost { .. }
                | ProxyError::ConnectionRefused { .. }
                | ProxyError::UpstreamIo { .. }
                | ProxyError::Timeout(_)
                | ProxyError::EofWhileReadingFirstLine { .. }
                | ProxyError::EofWhileReadingHeader { .. }
                | ProxyError::NoMoreRequests
                | ProxyError::Io(_)
        )
    }

    /// Attach the upstream target to a plain I/O error.
    pub fn upstream(target: impl Into<String>, source: io::Error) -> Self {
        let target = target.into();
        match source.kind() {
            io::ErrorKind::ConnectionRefused => ProxyError::ConnectionRefused { target },
            io::ErrorKind::TimedOut => ProxyError::Timeout(target),
            _ => ProxyError::UpstreamIo { target, source },
        }
    }

    /// Attribute a failure on the upstream connection to `target`. Parse
    /// failures become `UpstreamProtocol`, never a client-side 400.
    pub fn from_upstream(target: &str, err: ProxyError) -> Self {
        match err {
            ProxyError::Io(e) => ProxyError::upstream(target, e),
            ProxyError::MalformedMessage(message) => ProxyError::UpstreamProtocol {
                target: target.to_string(),
                message,
            },
            ProxyError::BodyTooLarge { limit } => ProxyError::UpstreamProtocol {
                target: target.to_string(),
                message: format!("body exceeds {limit} bytes"),
            },
            other => other,
        }
    }

    /// Attribute a failure on the inbound connection to the client, so the
    /// upstream client does not retry it.
    pub fn from_client(err: ProxyError) -> Self {
        match err {
            ProxyError::Io(e) => ProxyError::ClientIo(e.to_string()),
            ProxyError::Timeout(what) => ProxyError::ClientIo(format!("timed out {what}")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_statuses_for_upstream_failures() {
        let dns = ProxyError::UnknownHost { host: "nowhere.invalid".into() };
        let refused = ProxyError::ConnectionRefused { target: "127.0.0.1:1".into() };
        let io = ProxyError::UpstreamIo {
            target: "127.0.0.1:1".into(),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "pipe"),
        };

        assert_eq!(dns.status_code(), 502);
        assert!(dns.user_message().contains("DNS resolution failed"));
        assert_eq!(refused.status_code(), 502);
        assert_eq!(io.status_code(), 500);
    }

    #[test]
    fn upstream_maps_error_kinds() {
        let err = ProxyError::upstream(
            "h:1",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert!(matches!(err, ProxyError::ConnectionRefused { .. }));

        let err = ProxyError::upstream("h:1", io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(err, ProxyError::UpstreamIo { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn upstream_parse_failures_are_bad_gateway() {
        let err = ProxyError::from_upstream("h:1", ProxyError::MalformedMessage("bad status line".into()));
        assert!(matches!(err, ProxyError::UpstreamProtocol { .. }));
        assert_eq!(err.status_code(), 502);
        assert!(!err.is_retryable());

        let err = ProxyError::from_upstream("h:1", ProxyError::BodyTooLarge { limit: 10 });
        assert_eq!(err.status_code(), 502);
        assert_eq!(ProxyError::MalformedMessage("x".into()).status_code(), 400);
    }

    #[test]
    fn client_side_failures_are_not_retried() {
        let reset = ProxyError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(reset.is_retryable());
        let err = ProxyError::from_client(reset);
        assert!(matches!(err, ProxyError::ClientIo(_)));
        assert!(!err.is_retryable());
        assert!(!ProxyError::from_client(ProxyError::Timeout("reading body".into())).is_retryable());
        assert_eq!(ProxyError::BodyTooLarge { limit: 1 }.status_code(), 413);
    }

    #[test]
    fn configuration_errors_are_not_retryable() {
        assert!(!ProxyError::NoDestinations.is_retryable());
        assert!(!ProxyError::InvalidDestination("ftp://x".into()).is_retryable());
        assert!(!ProxyError::Terminated.is_retryable());
    }
}
