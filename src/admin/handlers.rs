use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::admin::AdminState;
use crate::exchange::ExchangeInfo;
use crate::net::ListenerInfo;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub listeners: usize,
    pub rules: usize,
    pub exchanges: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        listeners: state.listeners.ports().await.len(),
        rules: state.rules.load().len(),
        exchanges: state.exchanges.len(),
    })
}

pub async fn get_listeners(State(state): State<AdminState>) -> Json<Vec<ListenerInfo>> {
    Json(state.listeners.list().await)
}

pub async fn get_exchanges(State(state): State<AdminState>) -> Json<Vec<ExchangeInfo>> {
    Json(state.exchanges.list())
}

/// Let a held exchange continue.
pub async fn release_exchange(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if state.exchanges.release(&id) {
        tracing::info!(exchange_id = %id, "Exchange released by admin");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Force-stop an exchange; a held one fails with `Terminated`.
pub async fn stop_exchange(State(state): State<AdminState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.exchanges.stop(&id) {
        tracing::info!(exchange_id = %id, "Exchange stopped by admin");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
