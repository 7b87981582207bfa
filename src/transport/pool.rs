//! Single-slot upstream connection pool.
//!
//! Each upstream client keeps at most one idle connection. It is handed out
//! again only for the same (host, port, tls, proxy) key and only while the
//! socket is still open with nothing unread on it.

use std::fmt;

use crate::net::stream::Connection;

/// Identity of an upstream connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    /// Forward proxy the connection goes through, as `host:port`.
    pub proxy: Option<String>,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "https" } else { "http" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)?;
        if let Some(proxy) = &self.proxy {
            write!(f, " via {proxy}")?;
        }
        Ok(())
    }
}

/// An upstream connection together with its key.
#[derive(Debug)]
pub struct UpstreamConnection {
    pub key: ConnectionKey,
    pub conn: Connection,
    /// Cleared once the last response (or our own half-close) rules out
    /// another request on this socket.
    pub keep_alive: bool,
}

impl UpstreamConnection {
    pub fn new(key: ConnectionKey, conn: Connection) -> Self {
        Self {
            key,
            conn,
            keep_alive: true,
        }
    }

    pub fn is_reusable(&self) -> bool {
        self.keep_alive && self.conn.is_idle_and_open()
    }
}

#[derive(Debug, Default)]
pub struct ConnectionPool {
    slot: Option<UpstreamConnection>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the pooled connection if it fits `key`. A pooled connection
    /// that does not fit, or is no longer usable, is closed.
    pub fn take(&mut self, key: &ConnectionKey) -> Option<UpstreamConnection> {
        let pooled = self.slot.take()?;
        if pooled.key == *key && pooled.is_reusable() {
            tracing::trace!(key = %key, "Reusing pooled upstream connection");
            return Some(pooled);
        }
        tracing::trace!(pooled = %pooled.key, requested = %key, "Closing pooled upstream connection");
        None
    }

    /// Keep `conn` for the next call if it allows another request.
    pub fn put(&mut self, conn: UpstreamConnection) {
        if conn.keep_alive {
            self.slot = Some(conn);
        }
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    fn direct(host: &str, port: u16) -> ConnectionKey {
        ConnectionKey {
            host: host.to_string(),
            port,
            tls: false,
            proxy: None,
        }
    }

    async fn connected() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Connection::plain(client), server)
    }

    #[tokio::test]
    async fn reuses_only_for_matching_key() {
        let (conn, _server) = connected().await;
        let key = direct("localhost", 8080);
        let mut pool = ConnectionPool::new();

        pool.put(UpstreamConnection::new(key.clone(), conn));
        let reused = pool.take(&key);
        assert!(reused.is_some());

        pool.put(reused.unwrap());
        assert!(pool.take(&direct("localhost", 8081)).is_none());
        // Mismatch closed the pooled connection.
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn non_keep_alive_connections_are_not_pooled() {
        let (conn, _server) = connected().await;
        let mut upstream = UpstreamConnection::new(direct("localhost", 1), conn);
        upstream.keep_alive = false;

        let mut pool = ConnectionPool::new();
        pool.put(upstream);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn closed_peer_is_not_reused() {
        let (conn, server) = connected().await;
        let key = direct("localhost", 2);
        let mut pool = ConnectionPool::new();
        pool.put(UpstreamConnection::new(key.clone(), conn));

        drop(server);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(pool.take(&key).is_none());
    }
}
