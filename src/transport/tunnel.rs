//! CONNECT tunnels.
//!
//! # Responsibilities
//! - Ask a forward proxy to open a tunnel (`CONNECT host:port`)
//! - Relay bytes between the client and an established tunnel
//!
//! # Design Decisions
//! - One task per direction; each ends at EOF and shuts down the opposite
//!   write side, so half-closed tunnels drain correctly
//! - Relay tasks are detached from the connection handler

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::http::{codec, header, Request, Response};
use crate::net::stream::{Connection, Stream};
use crate::resilience::with_timeout;
use crate::transport::client::{ClientOptions, ForwardProxy};

/// Answer of a forward proxy to our CONNECT.
pub enum ProxyConnect {
    Established(TcpStream),
    /// Non-2xx answer, passed back to the caller unchanged.
    Refused(Response),
}

/// Send `CONNECT host:port` over `tcp` (already connected to `proxy`).
pub async fn connect_through_proxy(
    tcp: TcpStream,
    host: &str,
    port: u16,
    proxy: &ForwardProxy,
    options: &ClientOptions,
) -> Result<ProxyConnect, ProxyError> {
    let authority = format!("{host}:{port}");
    let target = proxy.authority();
    let mut request = Request::new("CONNECT", authority.clone()).with_header(header::HOST, authority.clone());
    if let Some(auth) = proxy.authorization() {
        request.header.set(header::PROXY_AUTHORIZATION, auth);
    }

    let mut conn = Connection::plain(tcp);
    let response = with_timeout(options.socket_timeout, || format!("CONNECT {authority} via {target}"), async {
        codec::write_request(conn.io(), &request, false)
            .await
            .map_err(|e| ProxyError::upstream(&target, e))?;
        codec::read_response_head(conn.io(), options.max_head_size, true)
            .await
            .map_err(|e| ProxyError::from_upstream(&target, e))
    })
    .await?;

    if !response.is_success() {
        tracing::warn!(proxy = %target, target = %authority, status = response.status, "Proxy refused CONNECT");
        return Ok(ProxyConnect::Refused(response));
    }

    let (stream, pending) = conn.into_parts();
    if !pending.is_empty() {
        return Err(ProxyError::UpstreamProtocol {
            target,
            message: "data sent before the tunnel was used".to_string(),
        });
    }
    match stream {
        Stream::Plain(tcp) => Ok(ProxyConnect::Established(tcp)),
        _ => Err(ProxyError::Tls("unexpected TLS stream to forward proxy".to_string())),
    }
}

async fn pump<R, W>(mut reader: R, mut writer: W, pending: bytes::Bytes) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !pending.is_empty() {
        writer.write_all(&pending).await?;
    }
    let copied = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.shutdown().await?;
    Ok(copied + pending.len() as u64)
}

/// Relay bytes between `client` and `upstream` until both directions end.
pub fn spawn_relay(client: Connection, upstream: Connection, exchange_id: Uuid) {
    let (client_stream, client_pending) = client.into_parts();
    let (upstream_stream, upstream_pending) = upstream.into_parts();
    let (client_rd, client_wr) = tokio::io::split(client_stream);
    let (upstream_rd, upstream_wr) = tokio::io::split(upstream_stream);

    tokio::spawn(async move {
        match pump(client_rd, upstream_wr, client_pending).await {
            Ok(bytes) => tracing::debug!(exchange_id = %exchange_id, bytes, "Tunnel client → upstream closed"),
            Err(e) => tracing::debug!(exchange_id = %exchange_id, error = %e, "Tunnel client → upstream failed"),
        }
    });
    tokio::spawn(async move {
        match pump(upstream_rd, client_wr, upstream_pending).await {
            Ok(bytes) => tracing::debug!(exchange_id = %exchange_id, bytes, "Tunnel upstream → client closed"),
            Err(e) => tracing::debug!(exchange_id = %exchange_id, error = %e, "Tunnel upstream → client failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let a = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (b, _) = listener.accept().await.unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn relay_copies_both_directions_and_propagates_eof() {
        let (mut client_side, proxy_inbound) = pair().await;
        let (proxy_outbound, mut upstream_side) = pair().await;

        spawn_relay(
            Connection::plain(proxy_inbound),
            Connection::plain(proxy_outbound),
            Uuid::new_v4(),
        );

        client_side.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        upstream_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        upstream_side.write_all(b"pong").await.unwrap();
        client_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        client_side.shutdown().await.unwrap();
        let mut rest = Vec::new();
        upstream_side.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn proxy_connect_reports_refusal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let proxy = ForwardProxy {
            host: "127.0.0.1".into(),
            port: addr.port(),
            username: None,
            password: None,
        };
        let options = Arc::new(ClientOptions::new(crate::net::tls::client_connector().unwrap()));
        let tcp = TcpStream::connect(addr).await.unwrap();

        match connect_through_proxy(tcp, "example.com", 443, &proxy, &options).await.unwrap() {
            ProxyConnect::Refused(response) => assert_eq!(response.status, 407),
            ProxyConnect::Established(_) => panic!("tunnel should have been refused"),
        }
    }
}
