//! Runs the matched rule's own interceptors inside the global chain.

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::flow::{self, Flow, Interceptor, Outcome};

/// Nested chain over `exchange.rule.interceptors`.
///
/// The nested units share the exchange's unwind stack, so a later RETURN in
/// the global chain unwinds through them as well.
#[derive(Debug, Default)]
pub struct RuleChain;

#[async_trait]
impl Interceptor for RuleChain {
    fn name(&self) -> &str {
        "rule_chain"
    }

    fn flow(&self) -> Flow {
        Flow::REQUEST
    }

    async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        let Some(rule) = exc.rule.clone() else {
            return Ok(Outcome::Continue);
        };
        Ok(flow::invoke_request_handlers(exc, &rule.interceptors).await)
    }
}
