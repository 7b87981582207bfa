//! Rules: match conditions, a target and the rule's own interceptors.

use std::sync::Arc;

use crate::config::schema::{RuleConfig, TargetConfig};
use crate::flow::Interceptor;
use crate::http::Request;
use crate::interceptors;
use crate::routing::matcher::{
    AndMatcher, HostMatcher, Matcher, MethodMatcher, PathPrefixMatcher, PortMatcher,
};

/// Where a rule forwards requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: Option<String>,
    pub port: u16,
    pub url: Option<String>,
    pub tls: bool,
    pub adjust_host_header: bool,
    pub failover: Vec<String>,
}

impl Default for Target {
    fn default() -> Self {
        Self::from(&TargetConfig::default())
    }
}

impl From<&TargetConfig> for Target {
    fn from(config: &TargetConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            url: config.url.clone(),
            tls: config.tls,
            adjust_host_header: config.adjust_host_header,
            failover: config.failover.clone(),
        }
    }
}

impl Target {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn host(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port,
            ..Self::default()
        }
    }

    /// Destination URIs for `request`, primary first.
    ///
    /// CONNECT always goes to the requested authority. A fixed `url` and its
    /// failovers are used verbatim; a `host` target and its failover bases get
    /// the request path appended. Without a target only absolute-form request
    /// URIs can be forwarded.
    pub fn destinations(&self, request: &Request) -> Vec<String> {
        if request.is_connect() {
            return vec![request.uri.clone()];
        }
        if let Some(url) = &self.url {
            let mut all = vec![url.clone()];
            all.extend(self.failover.iter().cloned());
            return all;
        }
        let path = request.path();
        if let Some(host) = &self.host {
            let scheme = if self.tls { "https" } else { "http" };
            let mut all = vec![format!("{scheme}://{host}:{}{path}", self.port)];
            all.extend(
                self.failover
                    .iter()
                    .map(|base| format!("{}{path}", base.trim_end_matches('/'))),
            );
            return all;
        }
        if request.uri.starts_with("http://") || request.uri.starts_with("https://") {
            return vec![request.uri.clone()];
        }
        Vec::new()
    }
}

pub struct Rule {
    pub name: String,
    pub priority: u32,
    matcher: AndMatcher,
    pub target: Target,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Rule {
    /// A rule matching every request.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            matcher: AndMatcher::default(),
            target: Target::default(),
            interceptors: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn with_matchers(mut self, matchers: Vec<Box<dyn Matcher>>) -> Self {
        self.matcher = AndMatcher::new(matchers);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn from_config(config: &RuleConfig) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(port) = config.port {
            matchers.push(Box::new(PortMatcher::new(port)));
        }
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.clone())));
        }
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
        }
        if let Some(method) = &config.method {
            matchers.push(Box::new(MethodMatcher::new(method.clone())));
        }

        Self::new(config.name.clone())
            .with_priority(config.priority)
            .with_matchers(matchers)
            .with_target(Target::from(&config.target))
            .with_interceptors(config.interceptors.iter().map(interceptors::build).collect())
    }

    pub fn matches(&self, req: &Request, port: u16) -> bool {
        self.matcher.matches(req, port)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("matcher", &self.matcher)
            .field("target", &self.target)
            .field("interceptors", &self.interceptors.iter().map(|i| i.name()).collect::<Vec<_>>())
            .finish()
    }
}
