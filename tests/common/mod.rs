//! Shared utilities for integration tests: raw-socket mock upstreams and a
//! gateway started from inline TOML.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proxy_gateway::config::parse_config;
use proxy_gateway::Gateway;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// A request as the mock upstream received it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    pub connections: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Keep-alive upstream answering every request with `status` and `body`.
pub async fn start_mock_upstream(status: u16, body: &'static str) -> MockUpstream {
    start_programmable_upstream(move |_| (status, Vec::new(), body.to_string())).await
}

/// Upstream whose answer is computed from the request: status, extra
/// headers, body.
pub async fn start_programmable_upstream<F>(f: F) -> MockUpstream
where
    F: Fn(&Recorded) -> (u16, Vec<(String, String)>, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(AtomicUsize::new(0));
    let f = Arc::new(f);

    {
        let requests = Arc::clone(&requests);
        let connections = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                let requests = Arc::clone(&requests);
                let f = Arc::clone(&f);
                tokio::spawn(async move {
                    let mut reader = BufReader::new(socket);
                    while let Some(recorded) = read_request(&mut reader).await {
                        let close = recorded
                            .header("connection")
                            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
                            || recorded.request_line.ends_with("HTTP/1.0");
                        let (status, headers, body) = f(&recorded);
                        requests.lock().unwrap().push(recorded);

                        let mut response = format!("HTTP/1.1 {status} Mock\r\nContent-Length: {}\r\n", body.len());
                        for (name, value) in headers {
                            response.push_str(&format!("{name}: {value}\r\n"));
                        }
                        if close {
                            response.push_str("Connection: close\r\n");
                        }
                        response.push_str("\r\n");
                        response.push_str(&body);
                        if reader.get_mut().write_all(response.as_bytes()).await.is_err() || close {
                            break;
                        }
                    }
                });
            }
        });
    }

    MockUpstream {
        addr,
        requests,
        connections,
    }
}

async fn read_request(reader: &mut BufReader<TcpStream>) -> Option<Recorded> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.ok()? == 0 {
        return None;
    }
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    let length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await.ok()?;

    Some(Recorded {
        request_line: request_line.trim_end().to_string(),
        headers,
        body,
    })
}

/// Upstream that accepts and immediately resets every connection.
pub async fn start_reset_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = socket2::SockRef::from(&socket).set_linger(Some(Duration::ZERO));
            drop(socket);
        }
    });
    (addr, accepted)
}

/// Raw TCP echo server.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = socket.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    addr
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let spare = TcpListener::bind("127.0.0.1:0").await.unwrap();
    spare.local_addr().unwrap().port()
}

/// Start a gateway with one listener on an ephemeral port plus `rules_toml`.
pub async fn start_gateway(rules_toml: &str) -> (Gateway, SocketAddr) {
    let toml = format!(
        r#"
        [observability]
        metrics_enabled = false

        [transport]
        socket_timeout_ms = 5000

        [client]
        retry_delay_ms = 50
        connect_timeout_ms = 2000
        socket_timeout_ms = 5000

        [[listeners]]
        name = "test"
        bind_address = "127.0.0.1:0"

        {rules_toml}
        "#
    );
    let config = parse_config(&toml).unwrap();
    let gateway = Gateway::start(&config).await.unwrap();
    let addr: SocketAddr = gateway.listeners.list().await[0].address.parse().unwrap();
    (gateway, addr)
}

/// Read one HTTP/1.1 response with a Content-Length body from `reader`.
pub async fn read_response<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> (u16, Vec<(String, String)>, String) {
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await.unwrap();
    let status: u16 = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').unwrap();
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    let length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.parse::<usize>().unwrap())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await.unwrap();
    (status, headers, String::from_utf8(body).unwrap())
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
