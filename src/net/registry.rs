//! Port → listener registry.
//!
//! Open and close are serialized by one async mutex, so two reloads can't
//! race on the same port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::ListenerConfig;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{EndpointListener, ListenerError};
use crate::transport::HandlerContext;

#[derive(Debug, Clone, Serialize)]
pub struct ListenerInfo {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tls: bool,
    pub active_connections: u64,
    pub max_connections: usize,
}

pub struct ListenerRegistry {
    ctx: Arc<HandlerContext>,
    listeners: Mutex<HashMap<u16, EndpointListener>>,
}

impl ListenerRegistry {
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        Self {
            ctx,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Bind a listener; returns the port it is bound to.
    pub async fn open(&self, config: &ListenerConfig) -> Result<u16, ListenerError> {
        let mut listeners = self.listeners.lock().await;
        if let Some(port) = configured_port(config) {
            if port != 0 && listeners.contains_key(&port) {
                return Err(ListenerError::PortInUse(port));
            }
        }
        let listener = EndpointListener::bind(config, Arc::clone(&self.ctx)).await?;
        let port = listener.port();
        listeners.insert(port, listener);
        Ok(port)
    }

    pub async fn close(&self, port: u16) -> bool {
        let listener = self.listeners.lock().await.remove(&port);
        match listener {
            Some(listener) => {
                listener.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every listener, then wait up to `deadline` for their
    /// connections to finish. Returns whether they all did.
    pub async fn close_all(&self, deadline: Duration) -> bool {
        let closing: Vec<EndpointListener> =
            self.listeners.lock().await.drain().map(|(_, l)| l).collect();
        let trackers: Vec<ConnectionTracker> = closing.iter().map(|l| l.tracker()).collect();
        for listener in closing {
            listener.close().await;
        }

        let started = Instant::now();
        for tracker in trackers {
            let left = deadline.saturating_sub(started.elapsed());
            if !tracker.drain(left).await {
                return false;
            }
        }
        true
    }

    /// Make the open listeners match `configs`.
    ///
    /// Listeners whose configuration is unchanged keep running (and keep
    /// their connections); changed or removed ones are closed, new ones are
    /// opened. Errors are collected so one bad port doesn't block the rest.
    pub async fn reconcile(&self, configs: &[ListenerConfig]) -> Vec<ListenerError> {
        let mut listeners = self.listeners.lock().await;
        let mut errors = Vec::new();

        let stale: Vec<u16> = listeners
            .iter()
            .filter(|(port, listener)| {
                !configs
                    .iter()
                    .any(|c| configured_port(c) == Some(**port) && c == listener.config())
            })
            .map(|(port, _)| *port)
            .collect();
        for port in stale {
            if let Some(listener) = listeners.remove(&port) {
                listener.close().await;
            }
        }

        for config in configs {
            let already_open = configured_port(config)
                .is_some_and(|port| port != 0 && listeners.contains_key(&port));
            if already_open {
                continue;
            }
            match EndpointListener::bind(config, Arc::clone(&self.ctx)).await {
                Ok(listener) => {
                    listeners.insert(listener.port(), listener);
                }
                Err(e) => {
                    tracing::error!(listener = %config.name, error = %e, "Failed to open listener");
                    errors.push(e);
                }
            }
        }
        errors
    }

    pub async fn list(&self) -> Vec<ListenerInfo> {
        let listeners = self.listeners.lock().await;
        let mut infos: Vec<ListenerInfo> = listeners
            .values()
            .map(|l| ListenerInfo {
                name: l.config().name.clone(),
                address: l.local_addr().to_string(),
                port: l.port(),
                tls: l.config().tls.is_some(),
                active_connections: l.active_connections(),
                max_connections: l.config().max_connections,
            })
            .collect();
        infos.sort_by_key(|i| i.port);
        infos
    }

    pub async fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.listeners.lock().await.keys().copied().collect();
        ports.sort_unstable();
        ports
    }
}

fn configured_port(config: &ListenerConfig) -> Option<u16> {
    config.bind_address.parse::<SocketAddr>().ok().map(|a| a.port())
}
