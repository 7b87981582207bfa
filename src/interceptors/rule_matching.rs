//! Assigns the matching rule to the exchange.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::flow::{Flow, Interceptor, Outcome};
use crate::http::Response;
use crate::routing::RuleTable;

/// Looks the request up in the current rule table. Without a match the
/// exchange is answered with 404 right away.
pub struct RuleMatching {
    rules: Arc<ArcSwap<RuleTable>>,
}

impl RuleMatching {
    pub fn new(rules: Arc<ArcSwap<RuleTable>>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl Interceptor for RuleMatching {
    fn name(&self) -> &str {
        "rule_matching"
    }

    fn flow(&self) -> Flow {
        Flow::REQUEST
    }

    async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        let table = self.rules.load();
        match table.find(&exc.request, exc.local_port) {
            Some(rule) => {
                tracing::debug!(exchange_id = %exc.id(), rule = %rule.name, "Rule matched");
                exc.rule = Some(rule);
                Ok(Outcome::Continue)
            }
            None => {
                tracing::debug!(
                    exchange_id = %exc.id(),
                    uri = %exc.request.uri,
                    port = exc.local_port,
                    "No rule matched"
                );
                exc.response = Some(Response::error(404, "No rule matches this request"));
                Ok(Outcome::Return)
            }
        }
    }
}
