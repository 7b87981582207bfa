//! TCP listener with backpressure, one per configured port.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections, TLS handshake when configured
//! - Enforce max_connections limit via semaphore
//! - Hand each connection to a `ConnectionHandler` task

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::config::ListenerConfig;
use crate::error::ProxyError;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::stream::{Connection, Stream};
use crate::net::tls;
use crate::transport::{ConnectionHandler, HandlerContext};

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(#[from] ProxyError),

    #[error("port {0} is already open")]
    PortInUse(u16),
}

/// A bound, accepting listener.
///
/// Connections already handed to a handler outlive `close`; only the accept
/// loop stops.
pub struct EndpointListener {
    config: ListenerConfig,
    local_addr: SocketAddr,
    tracker: ConnectionTracker,
    limit: Arc<Semaphore>,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl EndpointListener {
    pub async fn bind(
        config: &ListenerConfig,
        ctx: Arc<HandlerContext>,
    ) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ListenerError::InvalidAddress(config.bind_address.clone()))?;

        let acceptor = match &config.tls {
            Some(tls) => Some(tls::load_acceptor(
                Path::new(&tls.cert_path),
                Path::new(&tls.key_path),
            )?),
            None => None,
        };

        let listener = TcpListener::bind(addr).await.map_err(|source| ListenerError::Bind {
            address: config.bind_address.clone(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            address: config.bind_address.clone(),
            source,
        })?;

        tracing::info!(
            listener = %config.name,
            address = %local_addr,
            tls = acceptor.is_some(),
            max_connections = config.max_connections,
            "Listener bound"
        );

        let tracker = ConnectionTracker::new();
        let limit = Arc::new(Semaphore::new(config.max_connections));
        let shutdown = Shutdown::new();

        let accept = AcceptLoop {
            name: config.name.clone(),
            listener,
            local_port: local_addr.port(),
            acceptor,
            limit: Arc::clone(&limit),
            tracker: tracker.clone(),
            ctx,
        };
        let task = tokio::spawn(accept.run(shutdown.subscribe()));

        Ok(Self {
            config: config.clone(),
            local_addr,
            tracker,
            limit,
            shutdown,
            task,
        })
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    pub fn available_permits(&self) -> usize {
        self.limit.available_permits()
    }

    /// Stop accepting and wait for the accept loop to exit.
    pub async fn close(self) {
        self.shutdown.trigger();
        if let Err(e) = self.task.await {
            tracing::warn!(listener = %self.config.name, error = %e, "Accept loop ended abnormally");
        }
        tracing::info!(listener = %self.config.name, address = %self.local_addr, "Listener closed");
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }
}

struct AcceptLoop {
    name: String,
    listener: TcpListener,
    local_port: u16,
    acceptor: Option<TlsAcceptor>,
    limit: Arc<Semaphore>,
    tracker: ConnectionTracker,
    ctx: Arc<HandlerContext>,
}

impl AcceptLoop {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            // Permit first (backpressure), then accept.
            let permit = tokio::select! {
                _ = shutdown.recv() => break,
                permit = Arc::clone(&self.limit).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (tcp, peer) = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(listener = %self.name, error = %e, "Accept failed");
                        continue;
                    }
                },
            };

            tracing::debug!(
                listener = %self.name,
                peer_addr = %peer,
                available_permits = self.limit.available_permits(),
                "Connection accepted"
            );

            tokio::spawn(serve(
                tcp,
                peer,
                self.local_port,
                self.acceptor.clone(),
                Arc::clone(&self.ctx),
                self.tracker.clone(),
                permit,
            ));
        }
    }
}

async fn serve(
    tcp: TcpStream,
    peer: SocketAddr,
    local_port: u16,
    acceptor: Option<TlsAcceptor>,
    ctx: Arc<HandlerContext>,
    tracker: ConnectionTracker,
    _permit: OwnedSemaphorePermit,
) {
    let guard = tracker.track();
    let stream = match acceptor {
        None => Stream::Plain(tcp),
        Some(acceptor) => match tokio::time::timeout(ctx.socket_timeout, acceptor.accept(tcp)).await {
            Ok(Ok(tls)) => Stream::ServerTls(Box::new(tls)),
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, error = %e, "TLS handshake failed");
                return;
            }
            Err(_) => {
                tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, "TLS handshake timed out");
                return;
            }
        },
    };

    ConnectionHandler::new(ctx, peer, local_port)
        .run(Connection::new(stream))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::flow::{Flow, Interceptor, Outcome};
    use crate::exchange::Exchange;
    use crate::http::Response;
    use crate::transport::ClientOptions;
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Hello;

    #[async_trait]
    impl Interceptor for Hello {
        fn name(&self) -> &str {
            "hello"
        }

        fn flow(&self) -> Flow {
            Flow::REQUEST
        }

        async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
            exc.response = Some(Response::ok().with_body("text/plain", "hello"));
            Ok(Outcome::Return)
        }
    }

    fn context() -> Arc<HandlerContext> {
        let options = Arc::new(ClientOptions::new(tls::client_connector().unwrap()));
        Arc::new(HandlerContext::with_chain(
            vec![Arc::new(Hello)],
            options,
            &TransportConfig::default(),
        ))
    }

    fn config() -> ListenerConfig {
        ListenerConfig {
            name: "test".into(),
            bind_address: "127.0.0.1:0".into(),
            ..ListenerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_serves_and_closes() {
        let listener = EndpointListener::bind(&config(), context()).await.unwrap();
        let addr = listener.local_addr();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.starts_with("HTTP/1.1 200"));
        assert!(text.ends_with("hello"));

        listener.close().await;
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let mut config = config();
        config.bind_address = "not an address".into();
        let err = EndpointListener::bind(&config, context()).await.err().unwrap();
        assert!(matches!(err, ListenerError::InvalidAddress(_)));
    }
}
