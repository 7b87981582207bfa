//! Message bodies.

use bytes::Bytes;

/// How the end of a body is recognised on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body at all.
    Empty,
    Length(u64),
    Chunked,
    /// Body ends when the peer closes the connection.
    UntilClose,
}

/// A message body.
///
/// `Pending` means the body is still on the wire and has not been read from
/// the connection that delivered the head. Requests carrying
/// `Expect: 100-continue` stay pending until somebody asks for the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    Pending(Framing),
}

impl Body {
    pub fn is_pending(&self) -> bool {
        matches!(self, Body::Pending(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Full(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Length of a fully read body; zero otherwise.
    pub fn len(&self) -> usize {
        self.as_bytes().map(Bytes::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Body::Empty
        } else {
            Body::Full(bytes)
        }
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::from(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::from(Bytes::from(text))
    }
}
