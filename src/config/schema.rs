//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Inbound listeners, one per port.
    pub listeners: Vec<ListenerConfig>,

    /// Inbound socket settings.
    pub transport: TransportConfig,

    /// Upstream client settings.
    pub client: ClientConfig,

    /// Rules mapping requests to interceptor chains and targets.
    pub rules: Vec<RuleConfig>,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Name used in logs and the admin API.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for a listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Inbound connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Read/write deadline on inbound sockets, also the keep-alive idle limit.
    pub socket_timeout_ms: u64,

    /// Disable Nagle on upstream sockets.
    pub tcp_nodelay: bool,

    /// Largest accepted start-line plus header block.
    pub max_head_size: usize,

    /// Largest request or response body held in memory, in bytes.
    pub max_body_size: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_timeout_ms: 30_000,
            tcp_nodelay: true,
            max_head_size: 64 * 1024,
            max_body_size: 64 * 1024 * 1024,
        }
    }
}

/// Upstream client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Attempts per upstream call, including the first.
    pub max_attempts: u32,

    /// Pause between attempts.
    pub retry_delay_ms: u64,

    pub connect_timeout_ms: u64,

    pub socket_timeout_ms: u64,

    /// Forward proxy all upstream traffic goes through.
    pub proxy: Option<ProxyConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 250,
            connect_timeout_ms: 10_000,
            socket_timeout_ms: 60_000,
            proxy: None,
        }
    }
}

/// Upstream forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A rule: match conditions, interceptors and a target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Rule identifier for logging/metrics.
    pub name: String,

    /// Only match requests received on this listener port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Host header to match (exact match).
    #[serde(default)]
    pub host: Option<String>,

    /// Path prefix to match.
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Method to match.
    #[serde(default)]
    pub method: Option<String>,

    /// Rule priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Where matching requests are forwarded.
    #[serde(default)]
    pub target: TargetConfig,

    /// Interceptors run for matching requests, in order.
    #[serde(default)]
    pub interceptors: Vec<InterceptorConfig>,
}

/// Upstream target of a rule.
///
/// Either `url` (used verbatim) or `host`/`port` (request path appended).
/// Without either, only absolute-form requests (forward proxy use) and
/// CONNECT can be dispatched.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: Option<String>,
    pub port: u16,
    pub url: Option<String>,
    /// Use TLS towards `host`.
    pub tls: bool,
    /// Rewrite the Host header to the destination.
    pub adjust_host_header: bool,
    /// Alternative destinations tried on later attempts, same form as the
    /// primary one (full URLs with `url`, base URLs with `host`).
    pub failover: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 80,
            url: None,
            tls: false,
            adjust_host_header: true,
            failover: Vec::new(),
        }
    }
}

/// Which message a header interceptor edits.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Request,
    Response,
}

/// Built-in interceptors that can be attached to a rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterceptorConfig {
    /// Set a header on the request or the response.
    SetHeader {
        direction: Direction,
        name: String,
        value: String,
    },
    /// Answer directly without calling the upstream.
    Respond {
        status: u16,
        #[serde(default)]
        body: String,
        #[serde(default = "default_content_type")]
        content_type: String,
    },
    /// Park the exchange until released (or stopped) through the admin API.
    Hold,
}

fn default_content_type() -> String {
    "text/plain; charset=utf-8".to_string()
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
