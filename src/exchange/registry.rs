//! Registry of exchanges currently in flight.
//!
//! The admin API lists entries and reaches their control blocks to release or
//! force-stop them. Entries are removed by the guard returned from
//! [`ExchangeRegistry::register`], so a panicking connection task cannot leak
//! them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::exchange::{Exchange, ExchangeControl};

#[derive(Debug)]
struct ExchangeEntry {
    method: String,
    uri: String,
    remote_addr: Option<SocketAddr>,
    local_port: u16,
    started: Instant,
    control: Arc<ExchangeControl>,
}

/// Snapshot of one live exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeInfo {
    pub id: Uuid,
    pub method: String,
    pub uri: String,
    pub remote_addr: Option<String>,
    pub local_port: u16,
    pub age_ms: u64,
    pub waiting: bool,
    pub stopped: bool,
}

#[derive(Debug, Default)]
pub struct ExchangeRegistry {
    entries: DashMap<Uuid, ExchangeEntry>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `exchange` until the returned guard is dropped.
    pub fn register(self: &Arc<Self>, exchange: &Exchange) -> RegistrationGuard {
        let id = exchange.id();
        self.entries.insert(
            id,
            ExchangeEntry {
                method: exchange.request.method.clone(),
                uri: exchange.request.uri.clone(),
                remote_addr: exchange.remote_addr,
                local_port: exchange.local_port,
                started: Instant::now(),
                control: exchange.control(),
            },
        );
        RegistrationGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    pub fn list(&self) -> Vec<ExchangeInfo> {
        let mut infos: Vec<ExchangeInfo> = self
            .entries
            .iter()
            .map(|entry| ExchangeInfo {
                id: *entry.key(),
                method: entry.method.clone(),
                uri: entry.uri.clone(),
                remote_addr: entry.remote_addr.map(|a| a.to_string()),
                local_port: entry.local_port,
                age_ms: entry.started.elapsed().as_millis() as u64,
                waiting: entry.control.is_waiting(),
                stopped: entry.control.is_stopped(),
            })
            .collect();
        infos.sort_by(|a, b| b.age_ms.cmp(&a.age_ms));
        infos
    }

    /// Returns `false` when no such exchange is in flight.
    pub fn release(&self, id: &Uuid) -> bool {
        match self.entries.get(id) {
            Some(entry) => {
                entry.control.release();
                true
            }
            None => false,
        }
    }

    pub fn stop(&self, id: &Uuid) -> bool {
        match self.entries.get(id) {
            Some(entry) => {
                entry.control.force_stop();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes the exchange from the registry when dropped.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<ExchangeRegistry>,
    id: Uuid,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.entries.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;

    #[test]
    fn guard_removes_entry() {
        let registry = Arc::new(ExchangeRegistry::new());
        let exchange = Exchange::new(Request::get("/held"));

        let guard = registry.register(&exchange);
        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, exchange.id());
        assert_eq!(listed[0].uri, "/held");

        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn stop_reaches_control_block() {
        let registry = Arc::new(ExchangeRegistry::new());
        let exchange = Exchange::new(Request::get("/"));
        let _guard = registry.register(&exchange);

        assert!(registry.stop(&exchange.id()));
        assert!(exchange.control().is_stopped());
        assert!(!registry.stop(&Uuid::new_v4()));
    }
}
