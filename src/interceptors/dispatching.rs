//! Computes the upstream destinations from the matched rule.

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::flow::{Flow, Interceptor, Outcome};
use crate::routing::Target;

#[derive(Debug, Default)]
pub struct Dispatching;

#[async_trait]
impl Interceptor for Dispatching {
    fn name(&self) -> &str {
        "dispatching"
    }

    fn flow(&self) -> Flow {
        Flow::REQUEST
    }

    async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        // Destinations set by an earlier unit win.
        if exc.destinations.is_empty() {
            exc.destinations = match exc.rule.as_deref() {
                Some(rule) => rule.target.destinations(&exc.request),
                None => Target::default().destinations(&exc.request),
            };
        }
        tracing::debug!(
            exchange_id = %exc.id(),
            destinations = ?exc.destinations,
            "Destinations computed"
        );
        Ok(Outcome::Continue)
    }
}
