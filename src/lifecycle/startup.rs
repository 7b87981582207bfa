//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Start background tasks (metrics, admin API)
//! - Bind listeners and begin accepting traffic
//! - Apply reloaded configuration
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)
//! - Reload swaps the rule table and reconciles listeners; client and
//!   transport settings need a restart

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;

use crate::admin::{self, AdminState};
use crate::config::GatewayConfig;
use crate::error::ProxyError;
use crate::exchange::ExchangeRegistry;
use crate::lifecycle::Shutdown;
use crate::net::{tls, ListenerError, ListenerRegistry};
use crate::observability::metrics;
use crate::routing::RuleTable;
use crate::transport::{ClientOptions, HandlerContext};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid {field} '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error(transparent)]
    Tls(#[from] ProxyError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A running gateway.
pub struct Gateway {
    pub rules: Arc<ArcSwap<RuleTable>>,
    pub exchanges: Arc<ExchangeRegistry>,
    pub listeners: Arc<ListenerRegistry>,
    shutdown: Shutdown,
    admin_task: Option<JoinHandle<()>>,
}

impl Gateway {
    pub async fn start(config: &GatewayConfig) -> Result<Self, StartupError> {
        let connector = tls::client_connector()?;
        let client = Arc::new(ClientOptions::from_config(
            &config.client,
            &config.transport,
            connector,
        ));
        let rules = Arc::new(ArcSwap::from_pointee(RuleTable::from_config(&config.rules)));
        let exchanges = Arc::new(ExchangeRegistry::new());
        let ctx = Arc::new(HandlerContext::new(
            Arc::clone(&rules),
            client,
            &config.transport,
            Arc::clone(&exchanges),
        ));
        let listeners = Arc::new(ListenerRegistry::new(ctx));
        let shutdown = Shutdown::new();

        tracing::info!(rules = rules.load().len(), "Rule table built");

        if config.observability.metrics_enabled {
            metrics::init_metrics(parse_addr(
                "observability.metrics_address",
                &config.observability.metrics_address,
            )?);
        }

        let admin_task = if config.admin.enabled {
            let addr = parse_addr("admin.bind_address", &config.admin.bind_address)?;
            let state = AdminState {
                exchanges: Arc::clone(&exchanges),
                listeners: Arc::clone(&listeners),
                rules: Arc::clone(&rules),
                api_key: Arc::from(config.admin.api_key.as_str()),
                started: Instant::now(),
            };
            let shutdown = shutdown.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = admin::serve(addr, state, shutdown).await {
                    tracing::error!(address = %addr, error = %e, "Admin API failed");
                }
            }))
        } else {
            None
        };

        for listener in &config.listeners {
            listeners.open(listener).await?;
        }

        Ok(Self {
            rules,
            exchanges,
            listeners,
            shutdown,
            admin_task,
        })
    }

    /// Apply a reloaded configuration.
    pub async fn apply(&self, config: &GatewayConfig) {
        self.rules.store(Arc::new(RuleTable::from_config(&config.rules)));
        let errors = self.listeners.reconcile(&config.listeners).await;
        tracing::info!(
            rules = self.rules.load().len(),
            listeners = config.listeners.len(),
            failed_listeners = errors.len(),
            "Configuration applied"
        );
    }

    /// Stop accepting, stop the admin API and wait up to `deadline` for
    /// in-flight connections.
    pub async fn shutdown(self, deadline: Duration) {
        self.shutdown.trigger();
        let drained = self.listeners.close_all(deadline).await;
        if !drained {
            tracing::warn!(
                exchanges = self.exchanges.len(),
                "Connections still open after shutdown deadline"
            );
        }
        if let Some(task) = self.admin_task {
            let _ = task.await;
        }
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}
