//! Rule matching logic.
//!
//! # Responsibilities
//! - Match host header (exact match, case-insensitive, port ignored)
//! - Match path prefix (case-sensitive)
//! - Match method and listener port
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use crate::http::{header, Request};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request, received on `port`, matches.
    fn matches(&self, req: &Request, port: u16) -> bool;
}

/// Host part of a `Host` header value or authority.
fn host_without_port(value: &str) -> &str {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    value.split(':').next().unwrap_or(value)
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request, _port: u16) -> bool {
        req.header
            .get(header::HOST)
            .map(|h| host_without_port(h).eq_ignore_ascii_case(&self.expected_host))
            .unwrap_or(false)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &Request, _port: u16) -> bool {
        req.path().starts_with(&self.prefix)
    }
}

#[derive(Debug, Clone)]
pub struct MethodMatcher {
    method: String,
}

impl MethodMatcher {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &Request, _port: u16) -> bool {
        req.method.eq_ignore_ascii_case(&self.method)
    }
}

/// Matches the local port the request arrived on.
#[derive(Debug, Clone)]
pub struct PortMatcher {
    port: u16,
}

impl PortMatcher {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Matcher for PortMatcher {
    fn matches(&self, _req: &Request, port: u16) -> bool {
        self.port == port
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Request, port: u16) -> bool {
        self.matchers.iter().all(|m| m.matches(req, port))
    }
}
