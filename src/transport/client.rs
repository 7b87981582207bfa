//! Upstream HTTP client.
//!
//! # Responsibilities
//! - Perform one logical upstream call per exchange
//! - Retry connection-level failures across the destination list
//! - Reuse the previous connection when it still fits
//! - CONNECT tunnels, `Expect: 100-continue` relaying, HTTP/1.0 half-close
//!
//! # Data Flow
//! ```text
//! call(exchange)
//!     → attempt n: destination = destinations[n % len]
//!     → CONNECT? open tunnel, park it on the exchange, 200 Connection established
//!     → prepare request (URI form, Host, Proxy-Authorization)
//!     → pooled connection for the key, or connect (TCP → proxy CONNECT → TLS)
//!     → send head (+ body unless waiting for 100 Continue)
//!     → read response head, relay 100, skip other interim responses
//!     → read body, decide whether the connection goes back into the pool
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose, Engine as _};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::config::schema::{ClientConfig, TransportConfig};
use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::http::body::{Body, Framing};
use crate::http::{codec, header, Response};
use crate::net::stream::{Connection, Stream};
use crate::observability::metrics;
use crate::resilience::{with_timeout, RetryDecision, RetryPolicy};
use crate::transport::pool::{ConnectionKey, ConnectionPool, UpstreamConnection};
use crate::transport::tunnel::{self, ProxyConnect};

/// An upstream forward proxy every call is sent through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardProxy {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ForwardProxy {
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `Proxy-Authorization` value when credentials are configured.
    pub fn authorization(&self) -> Option<String> {
        let user = self.username.as_deref()?;
        let password = self.password.as_deref().unwrap_or_default();
        let token = general_purpose::STANDARD.encode(format!("{user}:{password}"));
        Some(format!("Basic {token}"))
    }
}

/// Settings shared by every upstream client of a gateway.
#[derive(Clone)]
pub struct ClientOptions {
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
    pub tcp_nodelay: bool,
    pub max_head_size: usize,
    pub max_body_size: u64,
    pub proxy: Option<ForwardProxy>,
    pub tls: TlsConnector,
}

impl ClientOptions {
    pub fn new(tls: TlsConnector) -> Self {
        Self {
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            socket_timeout: Duration::from_secs(60),
            tcp_nodelay: true,
            max_head_size: codec::MAX_HEAD_SIZE,
            max_body_size: codec::MAX_BODY_SIZE,
            proxy: None,
            tls,
        }
    }

    pub fn from_config(client: &ClientConfig, transport: &TransportConfig, tls: TlsConnector) -> Self {
        Self {
            retry: RetryPolicy::new(client.max_attempts, Duration::from_millis(client.retry_delay_ms)),
            connect_timeout: Duration::from_millis(client.connect_timeout_ms),
            socket_timeout: Duration::from_millis(client.socket_timeout_ms),
            tcp_nodelay: transport.tcp_nodelay,
            max_head_size: transport.max_head_size,
            max_body_size: transport.max_body_size,
            proxy: client.proxy.as_ref().map(|p| ForwardProxy {
                host: p.host.clone(),
                port: p.port,
                username: p.username.clone(),
                password: p.password.clone(),
            }),
            tls,
        }
    }
}

/// A parsed destination URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub tls: bool,
    pub host: String,
    pub port: u16,
    /// Path and query, origin-form.
    pub path: String,
    pub url: String,
}

impl Destination {
    pub fn parse(uri: &str) -> Result<Self, ProxyError> {
        let url = Url::parse(uri).map_err(|e| ProxyError::InvalidDestination(format!("{uri}: {e}")))?;
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(ProxyError::InvalidDestination(format!("{uri}: unsupported scheme {other}"))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| ProxyError::InvalidDestination(format!("{uri}: missing host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProxyError::InvalidDestination(format!("{uri}: missing port")))?;
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        Ok(Self {
            tls,
            host,
            port,
            path,
            url: uri.to_string(),
        })
    }

    /// `host:port` form used by CONNECT.
    pub fn parse_authority(authority: &str) -> Result<Self, ProxyError> {
        let invalid = || ProxyError::InvalidDestination(format!("CONNECT target {authority:?}"));
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            tls: false,
            host: host.to_string(),
            port,
            path: String::new(),
            url: authority.to_string(),
        })
    }

    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Value for the `Host` header; default ports are left out.
    pub fn host_header(&self) -> String {
        let default_port = if self.tls { 443 } else { 80 };
        if self.port == default_port {
            if self.host.contains(':') {
                format!("[{}]", self.host)
            } else {
                self.host.clone()
            }
        } else {
            self.authority()
        }
    }
}

/// Resolve `host` and connect to the first address that accepts.
pub(crate) async fn connect_tcp(host: &str, port: u16, options: &ClientOptions) -> Result<TcpStream, ProxyError> {
    let target = format!("{host}:{port}");
    let lookup = with_timeout(options.connect_timeout, || format!("resolving {host}"), async {
        tokio::net::lookup_host((host, port))
            .await
            .map_err(|_| ProxyError::UnknownHost { host: host.to_string() })
    })
    .await?;
    let addrs: Vec<_> = lookup.collect();
    if addrs.is_empty() {
        return Err(ProxyError::UnknownHost { host: host.to_string() });
    }

    let mut last_error = None;
    for addr in addrs {
        let attempt = with_timeout(options.connect_timeout, || format!("connecting to {target}"), async {
            TcpStream::connect(addr).await.map_err(|e| ProxyError::upstream(&target, e))
        })
        .await;
        match attempt {
            Ok(tcp) => {
                tcp.set_nodelay(options.tcp_nodelay)
                    .map_err(|e| ProxyError::upstream(&target, e))?;
                return Ok(tcp);
            }
            Err(err) => {
                tracing::debug!(address = %addr, error = %err, "Upstream connect failed");
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or(ProxyError::UnknownHost { host: host.to_string() }))
}

/// One connection handler's view of the upstream side.
pub struct UpstreamClient {
    options: Arc<ClientOptions>,
    pool: ConnectionPool,
}

impl UpstreamClient {
    pub fn new(options: Arc<ClientOptions>) -> Self {
        Self {
            options,
            pool: ConnectionPool::new(),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Whether an idle connection is kept for the next call.
    pub fn has_pooled_connection(&self) -> bool {
        !self.pool.is_empty()
    }

    /// Close the pooled connection.
    pub fn close(&mut self) {
        self.pool.clear();
    }

    /// Forward the exchange's request and return the upstream response.
    pub async fn call(&mut self, exc: &mut Exchange) -> Result<Response, ProxyError> {
        if exc.destinations.is_empty() {
            return Err(ProxyError::NoDestinations);
        }
        let policy = self.options.retry;
        let mut attempt = 0u32;

        loop {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if exc.control().is_stopped() {
                return Err(ProxyError::Terminated);
            }

            let destination = exc.destinations[attempt as usize % exc.destinations.len()].clone();
            match self.attempt(exc, &destination).await {
                Ok(response) => {
                    metrics::record_upstream_attempt("success");
                    tracing::debug!(
                        exchange_id = %exc.id(),
                        destination = %destination,
                        attempt = attempt + 1,
                        status = response.status,
                        "Upstream call succeeded"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    metrics::record_upstream_attempt("failure");
                    self.pool.clear();
                    match policy.decide(attempt, &err, exc.destinations.len()) {
                        RetryDecision::Retry => {
                            tracing::warn!(
                                exchange_id = %exc.id(),
                                destination = %destination,
                                attempt = attempt + 1,
                                max_attempts = policy.max_attempts,
                                error = %err,
                                "Upstream attempt failed, retrying"
                            );
                            attempt += 1;
                        }
                        RetryDecision::GiveUp => {
                            tracing::warn!(
                                exchange_id = %exc.id(),
                                destination = %destination,
                                attempts = attempt + 1,
                                error = %err,
                                "Upstream call failed"
                            );
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    async fn attempt(&mut self, exc: &mut Exchange, destination: &str) -> Result<Response, ProxyError> {
        if exc.request.is_connect() {
            let dest = Destination::parse_authority(destination)?;
            return self.open_tunnel(exc, &dest).await;
        }

        let dest = Destination::parse(destination)?;
        self.prepare_request(exc, &dest);

        let key = ConnectionKey {
            host: dest.host.clone(),
            port: dest.port,
            tls: dest.tls,
            proxy: self.options.proxy.as_ref().map(ForwardProxy::authority),
        };
        let mut upstream = match self.pool.take(&key) {
            Some(pooled) => pooled,
            None => self.connect(&key).await?,
        };

        let response = self.round_trip(&mut upstream, exc).await?;
        self.pool.put(upstream);
        Ok(response)
    }

    fn prepare_request(&self, exc: &mut Exchange, dest: &Destination) {
        match &self.options.proxy {
            Some(proxy) if !dest.tls => {
                exc.request.uri = dest.url.clone();
                if let Some(auth) = proxy.authorization() {
                    exc.request.header.set(header::PROXY_AUTHORIZATION, auth);
                }
            }
            _ => exc.request.uri = if dest.path.is_empty() { "/".to_string() } else { dest.path.clone() },
        }

        let adjust_host = exc.rule.as_ref().map(|r| r.target.adjust_host_header).unwrap_or(true);
        if adjust_host {
            exc.request.header.set(header::HOST, dest.host_header());
        }
    }

    async fn connect(&self, key: &ConnectionKey) -> Result<UpstreamConnection, ProxyError> {
        let options = &self.options;
        let stream = match &options.proxy {
            None => {
                let tcp = connect_tcp(&key.host, key.port, options).await?;
                if key.tls {
                    self.handshake(tcp, &key.host).await?
                } else {
                    Stream::Plain(tcp)
                }
            }
            Some(proxy) => {
                let tcp = connect_tcp(&proxy.host, proxy.port, options).await?;
                if key.tls {
                    match tunnel::connect_through_proxy(tcp, &key.host, key.port, proxy, options).await? {
                        ProxyConnect::Established(tcp) => self.handshake(tcp, &key.host).await?,
                        ProxyConnect::Refused(response) => {
                            return Err(ProxyError::ConnectionRefused {
                                target: format!("{}:{} via {} ({})", key.host, key.port, proxy.authority(), response.status),
                            })
                        }
                    }
                } else {
                    Stream::Plain(tcp)
                }
            }
        };
        tracing::debug!(key = %key, "Opened upstream connection");
        Ok(UpstreamConnection::new(key.clone(), Connection::new(stream)))
    }

    async fn handshake(&self, tcp: TcpStream, host: &str) -> Result<Stream, ProxyError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| ProxyError::Tls(format!("invalid server name {host}: {e}")))?;
        let connector = self.options.tls.clone();
        let tls = with_timeout(self.options.connect_timeout, || format!("TLS handshake with {host}"), async {
            connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| ProxyError::Tls(format!("handshake with {host}: {e}")))
        })
        .await?;
        Ok(Stream::ClientTls(Box::new(tls)))
    }

    async fn open_tunnel(&self, exc: &mut Exchange, dest: &Destination) -> Result<Response, ProxyError> {
        let options = &self.options;
        let tcp = match &options.proxy {
            None => connect_tcp(&dest.host, dest.port, options).await?,
            Some(proxy) => {
                let tcp = connect_tcp(&proxy.host, proxy.port, options).await?;
                match tunnel::connect_through_proxy(tcp, &dest.host, dest.port, proxy, options).await? {
                    ProxyConnect::Established(tcp) => tcp,
                    ProxyConnect::Refused(response) => return Ok(response),
                }
            }
        };
        tracing::debug!(exchange_id = %exc.id(), target = %dest.authority(), "Tunnel opened");
        exc.tunnel = Some(Connection::plain(tcp));
        exc.timings.upstream_sent = Some(Instant::now());
        exc.timings.upstream_received = exc.timings.upstream_sent;
        Ok(Response::connection_established())
    }

    async fn read_head(&self, upstream: &mut UpstreamConnection, target: &str, is_head: bool) -> Result<Response, ProxyError> {
        let max = self.options.max_head_size;
        with_timeout(self.options.socket_timeout, || format!("waiting for response from {target}"), async {
            codec::read_response_head(upstream.conn.io(), max, is_head)
                .await
                .map_err(|e| ProxyError::from_upstream(target, e))
        })
        .await
    }

    async fn round_trip(&self, upstream: &mut UpstreamConnection, exc: &mut Exchange) -> Result<Response, ProxyError> {
        let target = upstream.key.to_string();
        let socket_timeout = self.options.socket_timeout;
        let expect_continue = exc.request.header.is_100_continue_expected() && exc.request.body.is_pending();

        with_timeout(socket_timeout, || format!("sending request to {target}"), async {
            codec::write_request(upstream.conn.io(), &exc.request, !expect_continue)
                .await
                .map_err(|e| ProxyError::upstream(&target, e))
        })
        .await?;
        exc.timings.upstream_sent = Some(Instant::now());

        if exc.request.is_http10() {
            self.half_close(upstream, exc).await;
        }

        let is_head = exc.request.is_head();
        let mut response = self.read_head(upstream, &target, is_head).await?;

        if expect_continue {
            if response.status == 100 {
                self.relay_continue(upstream, exc, &target).await?;
                response = self.read_head(upstream, &target, is_head).await?;
            } else {
                // The body is still on the inbound connection and was never sent.
                upstream.keep_alive = false;
            }
        }
        while response.status / 100 == 1 && response.status != 101 {
            tracing::debug!(exchange_id = %exc.id(), status = response.status, "Skipping interim response");
            response = self.read_head(upstream, &target, is_head).await?;
        }

        let framing = match response.body {
            Body::Pending(framing) => framing,
            _ => Framing::Empty,
        };
        let max_body_size = self.options.max_body_size;
        let body = with_timeout(socket_timeout, || format!("reading response body from {target}"), async {
            codec::read_body(upstream.conn.io(), framing, max_body_size)
                .await
                .map_err(|e| ProxyError::from_upstream(&target, e))
        })
        .await?;
        if framing == Framing::UntilClose {
            upstream.keep_alive = false;
            response.header.set(header::CONTENT_LENGTH, body.len().to_string());
        }
        response.body = Body::from(body);
        if !response.is_keep_alive() {
            upstream.keep_alive = false;
        }
        exc.timings.upstream_received = Some(Instant::now());
        Ok(response)
    }

    /// Upstream said 100: pass it on, fetch the body from the client, send it.
    /// Inbound failures surface as `ClientIo` so the call is not retried.
    async fn relay_continue(&self, upstream: &mut UpstreamConnection, exc: &mut Exchange, target: &str) -> Result<(), ProxyError> {
        let socket_timeout = self.options.socket_timeout;
        let max_body_size = self.options.max_body_size;
        with_timeout(socket_timeout, || "reading request body from client".to_string(), async {
            exc.read_request_body(max_body_size).await
        })
        .await
        .map_err(ProxyError::from_client)?;

        with_timeout(socket_timeout, || format!("sending request body to {target}"), async {
            codec::write_body(upstream.conn.io(), &exc.request.header, &exc.request.body)
                .await
                .map_err(|e| ProxyError::upstream(target, e))
        })
        .await
    }

    /// HTTP/1.0: nothing more will be read from the client and nothing more
    /// written to the upstream.
    async fn half_close(&self, upstream: &mut UpstreamConnection, exc: &mut Exchange) {
        upstream.keep_alive = false;
        if let Some(source) = exc.source.as_mut() {
            if let Err(e) = source.shutdown_read() {
                tracing::debug!(exchange_id = %exc.id(), error = %e, "Inbound read shutdown failed");
            }
        }
        if !upstream.conn.is_tls() {
            if let Err(e) = upstream.conn.shutdown_write().await {
                tracing::debug!(exchange_id = %exc.id(), error = %e, "Upstream write shutdown failed");
            }
        }
    }
}
