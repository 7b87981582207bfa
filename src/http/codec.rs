//! HTTP/1.x head parsing and message serialization.
//!
//! # Responsibilities
//! - Read a start-line and header block, reporting where the stream ended
//! - Decide body framing (Content-Length, chunked, read-until-close)
//! - Read bodies into memory, bounded by a size limit, and write messages
//!   back out
//!
//! # Design Decisions
//! - Head bytes are collected line by line and handed to `httparse` in one go
//! - Chunked bodies are de-chunked on read and re-chunked as a single chunk
//!   on write, so the `Transfer-Encoding` header stays truthful
//! - Every message is serialized into one buffer and written with a single
//!   `write_all`

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProxyError;
use crate::http::body::{Body, Framing};
use crate::http::header::{self, Header};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::Version;

/// Default limit for a start-line plus header block.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Default limit for a decoded body.
pub const MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;

const MAX_HEADERS: usize = 128;
const MAX_CHUNK_LINE: usize = 4096;

/// Append one line (including the `\n`) to `buf`.
///
/// Returns `false` when the stream ended before the line was complete.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> Result<bool, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader).take(limit as u64).read_until(b'\n', buf).await?;
    if n > 0 && buf.last() == Some(&b'\n') {
        return Ok(true);
    }
    if n >= limit {
        return Err(ProxyError::MalformedMessage("message head too large".to_string()));
    }
    Ok(false)
}

fn is_blank(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}

fn lossy_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end().to_string()
}

/// Read a raw head: start-line plus headers, up to and including the empty line.
async fn read_head<R>(reader: &mut R, max: usize) -> Result<Vec<u8>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::with_capacity(512);

    // Stray empty lines between pipelined messages are skipped.
    loop {
        head.clear();
        if !read_line(reader, &mut head, max).await? {
            if head.is_empty() {
                return Err(ProxyError::NoMoreRequests);
            }
            return Err(ProxyError::EofWhileReadingFirstLine {
                line_so_far: lossy_line(&head),
            });
        }
        if !is_blank(&head) {
            break;
        }
    }

    loop {
        let start = head.len();
        let remaining = max.saturating_sub(start);
        if remaining == 0 {
            return Err(ProxyError::MalformedMessage("message head too large".to_string()));
        }
        if !read_line(reader, &mut head, remaining).await? {
            return Err(ProxyError::EofWhileReadingHeader {
                line_so_far: lossy_line(&head[start..]),
            });
        }
        if is_blank(&head[start..]) {
            return Ok(head);
        }
    }
}

fn collect_headers(fields: &[httparse::Header<'_>]) -> Header {
    let mut header = Header::new();
    for field in fields {
        header.add(field.name, String::from_utf8_lossy(field.value).into_owned());
    }
    header
}

fn version_of(minor: Option<u8>) -> Version {
    match minor {
        Some(0) => Version::Http10,
        _ => Version::Http11,
    }
}

/// Read a request head. The body is left on the wire as `Body::Pending`.
pub async fn read_request_head<R>(reader: &mut R, max: usize) -> Result<Request, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let raw = read_head(reader, max).await?;
    let mut fields = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut fields);
    match parsed.parse(&raw) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(ProxyError::MalformedMessage("incomplete request head".to_string()))
        }
        Err(e) => {
            let first_line = raw.split(|&b| b == b'\n').next().unwrap_or_default();
            return Err(ProxyError::MalformedMessage(format!(
                "request head: {e}; first line: {:?}",
                lossy_line(first_line)
            )));
        }
    }

    let mut request = Request {
        method: parsed.method.unwrap_or_default().to_string(),
        uri: parsed.path.unwrap_or_default().to_string(),
        version: version_of(parsed.version),
        header: collect_headers(parsed.headers),
        body: Body::Empty,
    };
    request.body = match request_framing(&request.header)? {
        Framing::Empty => Body::Empty,
        framing => Body::Pending(framing),
    };
    Ok(request)
}

/// Read a response head. `request_is_head` suppresses the body framing for
/// responses to HEAD requests.
pub async fn read_response_head<R>(
    reader: &mut R,
    max: usize,
    request_is_head: bool,
) -> Result<Response, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let raw = match read_head(reader, max).await {
        Err(ProxyError::NoMoreRequests) => {
            return Err(ProxyError::EofWhileReadingFirstLine {
                line_so_far: String::new(),
            })
        }
        other => other?,
    };
    let mut fields = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut fields);
    match parsed.parse(&raw) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(ProxyError::MalformedMessage("incomplete response head".to_string()))
        }
        Err(e) => return Err(ProxyError::MalformedMessage(format!("response head: {e}"))),
    }

    let mut response = Response {
        version: version_of(parsed.version),
        status: parsed.code.unwrap_or_default(),
        reason: parsed.reason.unwrap_or_default().to_string(),
        header: collect_headers(parsed.headers),
        body: Body::Empty,
    };
    response.body = match response_framing(&response, request_is_head)? {
        Framing::Empty => Body::Empty,
        framing => Body::Pending(framing),
    };
    Ok(response)
}

/// Requests without a length or chunked encoding have no body.
pub fn request_framing(header: &Header) -> Result<Framing, ProxyError> {
    if header.is_chunked() {
        return Ok(Framing::Chunked);
    }
    Ok(match header.content_length()? {
        Some(0) | None => Framing::Empty,
        Some(n) => Framing::Length(n),
    })
}

pub fn response_framing(response: &Response, request_is_head: bool) -> Result<Framing, ProxyError> {
    if request_is_head || !response.status_allows_body() {
        return Ok(Framing::Empty);
    }
    if response.header.is_chunked() {
        return Ok(Framing::Chunked);
    }
    Ok(match response.header.content_length()? {
        Some(0) => Framing::Empty,
        Some(n) => Framing::Length(n),
        None => Framing::UntilClose,
    })
}

/// Read a body with the given framing into memory.
///
/// Fails with `BodyTooLarge` as soon as more than `max` decoded bytes are
/// announced or received.
pub async fn read_body<R>(reader: &mut R, framing: Framing, max: u64) -> Result<Bytes, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    match framing {
        Framing::Empty => Ok(Bytes::new()),
        Framing::Length(len) => {
            if len > max {
                return Err(ProxyError::BodyTooLarge { limit: max });
            }
            let mut buf = Vec::new();
            (&mut *reader).take(len).read_to_end(&mut buf).await?;
            if (buf.len() as u64) < len {
                return Err(unexpected_eof("body shorter than Content-Length"));
            }
            Ok(Bytes::from(buf))
        }
        Framing::Chunked => read_chunked(reader, max).await,
        Framing::UntilClose => {
            let mut buf = Vec::new();
            (&mut *reader).take(max.saturating_add(1)).read_to_end(&mut buf).await?;
            if buf.len() as u64 > max {
                return Err(ProxyError::BodyTooLarge { limit: max });
            }
            Ok(Bytes::from(buf))
        }
    }
}

fn unexpected_eof(what: &str) -> ProxyError {
    ProxyError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, what.to_string()))
}

async fn read_chunked<R>(reader: &mut R, max: u64) -> Result<Bytes, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut out = BytesMut::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if !read_line(reader, &mut line, MAX_CHUNK_LINE).await? {
            return Err(unexpected_eof("stream ended inside chunk size line"));
        }
        let text = std::str::from_utf8(&line)
            .map_err(|_| ProxyError::MalformedMessage("chunk size is not ASCII".to_string()))?;
        let size_text = text.split(';').next().unwrap_or_default().trim();
        let size = u64::from_str_radix(size_text, 16)
            .map_err(|_| ProxyError::MalformedMessage(format!("invalid chunk size {size_text:?}")))?;
        if (out.len() as u64).saturating_add(size) > max {
            return Err(ProxyError::BodyTooLarge { limit: max });
        }

        if size == 0 {
            // Trailer fields are dropped.
            loop {
                line.clear();
                if !read_line(reader, &mut line, MAX_CHUNK_LINE).await? {
                    return Err(unexpected_eof("stream ended inside chunk trailer"));
                }
                if is_blank(&line) {
                    return Ok(out.freeze());
                }
            }
        }

        let mut chunk = Vec::new();
        (&mut *reader).take(size).read_to_end(&mut chunk).await?;
        if (chunk.len() as u64) < size {
            return Err(unexpected_eof("stream ended inside chunk"));
        }
        out.extend_from_slice(&chunk);

        line.clear();
        if !read_line(reader, &mut line, MAX_CHUNK_LINE).await? || !is_blank(&line) {
            return Err(ProxyError::MalformedMessage("chunk not terminated by CRLF".to_string()));
        }
    }
}

fn encode_fields(header: &Header, body: &Body, buf: &mut BytesMut) {
    for field in header.iter() {
        buf.extend_from_slice(field.name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(field.value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if let Body::Full(bytes) = body {
        if !header.is_chunked() && !header.contains(header::CONTENT_LENGTH) {
            buf.extend_from_slice(format!("{}: {}\r\n", header::CONTENT_LENGTH, bytes.len()).as_bytes());
        }
    }
    buf.extend_from_slice(b"\r\n");
}

pub fn encode_request_head(request: &Request, buf: &mut BytesMut) {
    buf.extend_from_slice(
        format!("{} {} {}\r\n", request.method, request.uri, request.version).as_bytes(),
    );
    encode_fields(&request.header, &request.body, buf);
}

pub fn encode_response_head(response: &Response, buf: &mut BytesMut) {
    buf.extend_from_slice(
        format!("{} {} {}\r\n", response.version, response.status, response.reason).as_bytes(),
    );
    encode_fields(&response.header, &response.body, buf);
}

/// Serialize an in-memory body. Pending bodies produce nothing.
pub fn encode_body(header: &Header, body: &Body, buf: &mut BytesMut) {
    let chunked = header.is_chunked();
    match body {
        Body::Full(bytes) if chunked => {
            buf.extend_from_slice(format!("{:x}\r\n", bytes.len()).as_bytes());
            buf.extend_from_slice(bytes);
            buf.extend_from_slice(b"\r\n0\r\n\r\n");
        }
        Body::Full(bytes) => buf.extend_from_slice(bytes),
        Body::Empty if chunked => buf.extend_from_slice(b"0\r\n\r\n"),
        Body::Empty | Body::Pending(_) => {}
    }
}

pub async fn write_request<W>(writer: &mut W, request: &Request, with_body: bool) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024 + request.body.len());
    encode_request_head(request, &mut buf);
    if with_body {
        encode_body(&request.header, &request.body, &mut buf);
    }
    writer.write_all(&buf).await?;
    writer.flush().await
}

pub async fn write_response<W>(writer: &mut W, response: &Response, with_body: bool) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(512 + response.body.len());
    encode_response_head(response, &mut buf);
    if with_body {
        encode_body(&response.header, &response.body, &mut buf);
    }
    writer.write_all(&buf).await?;
    writer.flush().await
}

pub async fn write_body<W>(writer: &mut W, header: &Header, body: &Body) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(body.len() + 16);
    encode_body(header, body, &mut buf);
    writer.write_all(&buf).await?;
    writer.flush().await
}
