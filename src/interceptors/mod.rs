//! Built-in interceptors.
//!
//! # Data Flow
//! ```text
//! global chain:
//!     AccessLog     (response/abort only: one log event per exchange)
//!     RuleMatching  (assign rule, 404 + RETURN without one)
//!     Dispatching   (rule target → destination list)
//!     RuleChain     (the rule's own units, sharing the unwind stack)
//!     HttpClient    (upstream call, RETURN)
//!
//! per-rule units (from config):
//!     SetHeader | Respond | Hold
//! ```

pub mod access_log;
pub mod dispatching;
pub mod hold;
pub mod http_client;
pub mod respond;
pub mod rule_chain;
pub mod rule_matching;
pub mod set_header;

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::InterceptorConfig;
use crate::flow::Interceptor;
use crate::routing::RuleTable;
use crate::transport::ClientOptions;

pub use access_log::AccessLog;
pub use dispatching::Dispatching;
pub use hold::Hold;
pub use http_client::HttpClient;
pub use respond::Respond;
pub use rule_chain::RuleChain;
pub use rule_matching::RuleMatching;
pub use set_header::SetHeader;

/// The chain every inbound request runs through.
pub fn global_chain(
    rules: Arc<ArcSwap<RuleTable>>,
    client: Arc<ClientOptions>,
) -> Vec<Arc<dyn Interceptor>> {
    vec![
        Arc::new(AccessLog),
        Arc::new(RuleMatching::new(rules)),
        Arc::new(Dispatching),
        Arc::new(RuleChain),
        Arc::new(HttpClient::new(client)),
    ]
}

/// Instantiate a configured per-rule interceptor.
pub fn build(config: &InterceptorConfig) -> Arc<dyn Interceptor> {
    match config {
        InterceptorConfig::SetHeader {
            direction,
            name,
            value,
        } => Arc::new(SetHeader::new(*direction, name.clone(), value.clone())),
        InterceptorConfig::Respond {
            status,
            body,
            content_type,
        } => Arc::new(Respond::new(*status, content_type.clone(), body.clone())),
        InterceptorConfig::Hold => Arc::new(Hold),
    }
}
