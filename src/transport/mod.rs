//! Transport subsystem: inbound connection handling and upstream calls.
//!
//! # Data Flow
//! ```text
//! EndpointListener accepts (TLS handshake if configured)
//!     → handler.rs (keep-alive loop, one exchange per request)
//!     → flow controller runs the global chain
//!     → HttpClient interceptor → client.rs (retries, pooled connection)
//!         → pool.rs (single reusable upstream connection per handler)
//!         → tunnel.rs (CONNECT: proxy handshake, byte relay)
//! ```
//!
//! # Design Decisions
//! - One upstream client per inbound connection, never shared
//! - The handler owns the inbound connection; it lends it to the exchange
//!   for the duration of the chain

pub mod client;
pub mod handler;
pub mod pool;
pub mod tunnel;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::schema::TransportConfig;
use crate::exchange::ExchangeRegistry;
use crate::flow::Interceptor;
use crate::interceptors;
use crate::routing::RuleTable;

pub use client::{ClientOptions, UpstreamClient};
pub use handler::ConnectionHandler;

/// Everything a connection handler needs, shared by all connections.
pub struct HandlerContext {
    pub chain: Vec<Arc<dyn Interceptor>>,
    pub exchanges: Arc<ExchangeRegistry>,
    pub client: Arc<ClientOptions>,
    pub socket_timeout: Duration,
    pub max_head_size: usize,
    pub max_body_size: u64,
}

impl HandlerContext {
    /// Context running the standard global chain over `rules`.
    pub fn new(
        rules: Arc<ArcSwap<RuleTable>>,
        client: Arc<ClientOptions>,
        transport: &TransportConfig,
        exchanges: Arc<ExchangeRegistry>,
    ) -> Self {
        Self {
            chain: interceptors::global_chain(rules, Arc::clone(&client)),
            exchanges,
            client,
            socket_timeout: Duration::from_millis(transport.socket_timeout_ms),
            max_head_size: transport.max_head_size,
            max_body_size: transport.max_body_size,
        }
    }

    /// Context with a caller-supplied chain.
    pub fn with_chain(chain: Vec<Arc<dyn Interceptor>>, client: Arc<ClientOptions>, transport: &TransportConfig) -> Self {
        Self {
            chain,
            exchanges: Arc::new(ExchangeRegistry::new()),
            client,
            socket_timeout: Duration::from_millis(transport.socket_timeout_ms),
            max_head_size: transport.max_head_size,
            max_body_size: transport.max_body_size,
        }
    }
}
