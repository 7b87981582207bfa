//! Byte streams shared by inbound and upstream connections.
//!
//! # Responsibilities
//! - Unify plain TCP and TLS (server and client side) behind one type
//! - Buffered reading for the HTTP codec
//! - Socket-level operations the proxy needs: half-close, idle liveness check

use std::io;
use std::mem::MaybeUninit;
use std::net::Shutdown;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;

/// A TCP stream, optionally wrapped in TLS.
pub enum Stream {
    Plain(TcpStream),
    ServerTls(Box<tokio_rustls::server::TlsStream<TcpStream>>),
    ClientTls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Stream {
    /// The underlying TCP socket.
    pub fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Plain(tcp) => tcp,
            Stream::ServerTls(tls) => tls.get_ref().0,
            Stream::ClientTls(tls) => tls.get_ref().0,
        }
    }

    pub fn is_tls(&self) -> bool {
        !matches!(self, Stream::Plain(_))
    }
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::ServerTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Stream::ClientTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::ServerTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Stream::ClientTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::ServerTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Stream::ClientTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::ServerTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Stream::ClientTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A buffered connection, inbound or upstream.
pub struct Connection {
    io: BufReader<Stream>,
    read_closed: bool,
}

impl Connection {
    pub fn new(stream: Stream) -> Self {
        Self {
            io: BufReader::new(stream),
            read_closed: false,
        }
    }

    pub fn plain(tcp: TcpStream) -> Self {
        Self::new(Stream::Plain(tcp))
    }

    /// Buffered reader that also writes through to the stream.
    pub fn io(&mut self) -> &mut BufReader<Stream> {
        &mut self.io
    }

    pub fn stream(&self) -> &Stream {
        self.io.get_ref()
    }

    pub fn is_tls(&self) -> bool {
        self.stream().is_tls()
    }

    /// Bytes read from the socket but not consumed yet.
    pub fn buffered(&self) -> usize {
        self.io.buffer().len()
    }

    pub fn is_read_closed(&self) -> bool {
        self.read_closed
    }

    /// Stop receiving on the socket; the peer still gets our writes.
    pub fn shutdown_read(&mut self) -> io::Result<()> {
        self.read_closed = true;
        socket2::SockRef::from(self.stream().tcp()).shutdown(Shutdown::Read)
    }

    /// Close our write side (TLS streams send close_notify first).
    pub async fn shutdown_write(&mut self) -> io::Result<()> {
        self.io.get_mut().shutdown().await
    }

    /// Non-blocking check that the peer has not closed the socket and sent
    /// nothing unsolicited.
    ///
    /// TLS connections may carry post-handshake records (session tickets),
    /// so for them only a closed socket counts.
    pub fn is_idle_and_open(&self) -> bool {
        if self.buffered() > 0 {
            return false;
        }
        let mut peek_buf = [MaybeUninit::<u8>::uninit(); 1];
        match socket2::SockRef::from(self.stream().tcp()).peek(&mut peek_buf) {
            Ok(0) => false,
            Ok(_) => self.is_tls(),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(_) => false,
        }
    }

    /// Split into the stream and any bytes already buffered from it.
    pub fn into_parts(self) -> (Stream, Bytes) {
        let pending = Bytes::copy_from_slice(self.io.buffer());
        (self.io.into_inner(), pending)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.stream().tcp().peer_addr().ok())
            .field("tls", &self.is_tls())
            .field("buffered", &self.buffered())
            .finish()
    }
}
