//! Upstream client against raw-socket mocks.

use std::sync::Arc;
use std::time::Duration;

use proxy_gateway::exchange::Exchange;
use proxy_gateway::http::Request;
use proxy_gateway::net::tls;
use proxy_gateway::transport::{ClientOptions, UpstreamClient};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

mod common;

use common::read_response;

fn upstream_client() -> UpstreamClient {
    let options = Arc::new(ClientOptions::new(tls::client_connector().unwrap()));
    UpstreamClient::new(options)
}

fn exchange_to(addr: std::net::SocketAddr) -> Exchange {
    let mut exc = Exchange::new(Request::get("/"));
    exc.destinations = vec![format!("http://{addr}/")];
    exc
}

#[tokio::test]
async fn test_sequential_calls_share_one_socket() {
    let a = common::start_mock_upstream(200, "a").await;
    let b = common::start_mock_upstream(200, "b").await;
    let mut client = upstream_client();

    for _ in 0..2 {
        let res = client.call(&mut exchange_to(a.addr)).await.unwrap();
        assert_eq!(res.body.as_bytes().unwrap().as_ref(), b"a");
    }
    assert_eq!(a.connection_count(), 1);
    assert!(client.has_pooled_connection());

    client.call(&mut exchange_to(b.addr)).await.unwrap();
    assert_eq!(b.connection_count(), 1);

    // The single slot now holds b's connection.
    client.call(&mut exchange_to(a.addr)).await.unwrap();
    assert_eq!(a.connection_count(), 2);
}

#[tokio::test]
async fn test_closed_pooled_connection_is_replaced() {
    let upstream = common::start_programmable_upstream(|_| {
        (200, vec![("Connection".into(), "close".into())], "once".into())
    })
    .await;
    let mut client = upstream_client();

    client.call(&mut exchange_to(upstream.addr)).await.unwrap();
    assert!(!client.has_pooled_connection());
    client.call(&mut exchange_to(upstream.addr)).await.unwrap();
    assert_eq!(upstream.connection_count(), 2);
}

/// Upstream that answers the request head with an interim 100, then echoes
/// the body.
async fn start_continue_upstream() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let line = line.trim_end().to_ascii_lowercase();
            if line.is_empty() {
                break;
            }
            if let Some(v) = line.strip_prefix("content-length:") {
                length = v.trim().parse().unwrap();
            }
        }
        reader.get_mut().write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.unwrap();
        let mut body = vec![0; length];
        reader.read_exact(&mut body).await.unwrap();
        let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
        reader.get_mut().write_all(response.as_bytes()).await.unwrap();
        reader.get_mut().write_all(&body).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_expect_continue_is_relayed() {
    let upstream = start_continue_upstream().await;
    let (gateway, addr) = common::start_gateway(&format!(
        r#"
        [[rules]]
        name = "upload"
        target = {{ host = "127.0.0.1", port = {} }}
        "#,
        upstream.port()
    ))
    .await;

    let mut conn = BufReader::new(TcpStream::connect(addr).await.unwrap());
    conn.get_mut()
        .write_all(b"POST /upload HTTP/1.1\r\nHost: gw\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\n")
        .await
        .unwrap();

    let (status, _, _) = tokio::time::timeout(Duration::from_secs(3), read_response(&mut conn))
        .await
        .unwrap();
    assert_eq!(status, 100);

    conn.get_mut().write_all(b"hello").await.unwrap();
    let (status, _, body) = read_response(&mut conn).await;
    assert_eq!(status, 200);
    assert_eq!(body, "hello");

    gateway.shutdown(Duration::from_secs(1)).await;
}
