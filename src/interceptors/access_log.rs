//! Access log, one event per finished exchange.

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::flow::{Flow, Interceptor, Outcome};

/// Logs the outcome of every exchange at info level.
///
/// Sits first in the global chain and only takes part in the unwind, so it
/// sees the final response or the abort.
#[derive(Debug, Default)]
pub struct AccessLog;

#[async_trait]
impl Interceptor for AccessLog {
    fn name(&self) -> &str {
        "access_log"
    }

    fn flow(&self) -> Flow {
        Flow::RESPONSE | Flow::ABORT
    }

    async fn handle_response(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        let status = exc.response.as_ref().map(|r| r.status).unwrap_or_default();
        tracing::info!(
            exchange_id = %exc.id(),
            remote_addr = ?exc.remote_addr,
            method = %exc.request.method,
            uri = %exc.request.uri,
            status,
            rule = %exc.rule_name(),
            elapsed_ms = exc.timings.received.elapsed().as_millis() as u64,
            "Request completed"
        );
        Ok(Outcome::Continue)
    }

    async fn handle_abort(&self, exc: &mut Exchange) -> Result<(), ProxyError> {
        tracing::info!(
            exchange_id = %exc.id(),
            remote_addr = ?exc.remote_addr,
            method = %exc.request.method,
            uri = %exc.request.uri,
            rule = %exc.rule_name(),
            error = exc.error().map(ToString::to_string).unwrap_or_default(),
            elapsed_ms = exc.timings.received.elapsed().as_millis() as u64,
            "Request aborted"
        );
        Ok(())
    }
}
