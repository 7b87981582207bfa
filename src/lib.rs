//! HTTP reverse proxy / API gateway core.
//!
//! Requests run through an ordered chain of [`flow::Interceptor`]s driven by
//! the [`flow`] controller; the terminal unit forwards them with the
//! [`transport::UpstreamClient`].

// Core
pub mod exchange;
pub mod flow;
pub mod http;
pub mod transport;

// Routing and processing units
pub mod interceptors;
pub mod routing;

// Network
pub mod net;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::GatewayConfig;
pub use error::ProxyError;
pub use exchange::Exchange;
pub use lifecycle::{Gateway, Shutdown};
