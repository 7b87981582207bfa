//! Rule lookup.
//!
//! # Responsibilities
//! - Store compiled rules
//! - Look up the matching rule for a request
//! - Return matched rule or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction; replaced wholesale on reload
//! - O(n) scan in priority order (acceptable for typical rule counts)
//! - Equal priorities keep configuration order

use std::sync::Arc;

use crate::config::schema::RuleConfig;
use crate::http::Request;
use crate::routing::rule::Rule;

#[derive(Debug, Default)]
pub struct RuleTable {
    rules: Vec<Arc<Rule>>,
}

impl RuleTable {
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            rules: rules.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_config(configs: &[RuleConfig]) -> Self {
        Self::new(configs.iter().map(Rule::from_config).collect())
    }

    /// First rule, by priority, matching `req` received on `port`.
    pub fn find(&self, req: &Request, port: u16) -> Option<Arc<Rule>> {
        self.rules.iter().find(|rule| rule.matches(req, port)).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
