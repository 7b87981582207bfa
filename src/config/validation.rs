//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts > 0, status codes, addresses parse)
//! - Detect conflicting listeners and duplicate rule names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{GatewayConfig, InterceptorConfig, RuleConfig};

/// One semantic problem, with the path of the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn check_url(field: String, value: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
        Ok(_) => errors.push(ValidationError::new(field, format!("{value:?} must be an http(s) URL with a host"))),
        Err(e) => errors.push(ValidationError::new(field, format!("{value:?}: {e}"))),
    }
}

fn validate_rule(index: usize, rule: &RuleConfig, errors: &mut Vec<ValidationError>) {
    let prefix = format!("rules[{index}]");
    if rule.name.trim().is_empty() {
        errors.push(ValidationError::new(format!("{prefix}.name"), "must not be empty"));
    }
    if let Some(method) = &rule.method {
        if method.trim().is_empty() {
            errors.push(ValidationError::new(format!("{prefix}.method"), "must not be empty"));
        }
    }

    let target = &rule.target;
    if target.url.is_some() && target.host.is_some() {
        errors.push(ValidationError::new(
            format!("{prefix}.target"),
            "set either url or host, not both",
        ));
    }
    if let Some(url) = &target.url {
        check_url(format!("{prefix}.target.url"), url, errors);
    }
    if target.host.is_some() && target.port == 0 {
        errors.push(ValidationError::new(format!("{prefix}.target.port"), "must not be 0"));
    }
    for (i, failover) in target.failover.iter().enumerate() {
        check_url(format!("{prefix}.target.failover[{i}]"), failover, errors);
    }

    for (i, interceptor) in rule.interceptors.iter().enumerate() {
        let field = format!("{prefix}.interceptors[{i}]");
        match interceptor {
            InterceptorConfig::SetHeader { name, .. } if name.trim().is_empty() => {
                errors.push(ValidationError::new(format!("{field}.name"), "must not be empty"));
            }
            InterceptorConfig::Respond { status, .. } if !(200..=599).contains(status) => {
                errors.push(ValidationError::new(
                    format!("{field}.status"),
                    format!("{status} is not a final status code"),
                ));
            }
            _ => {}
        }
    }
}

/// Check everything serde cannot.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut ports = HashSet::new();
    for (i, listener) in config.listeners.iter().enumerate() {
        match listener.bind_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if addr.port() != 0 && !ports.insert(addr.port()) {
                    errors.push(ValidationError::new(
                        format!("listeners[{i}].bind_address"),
                        format!("port {} is used by another listener", addr.port()),
                    ));
                }
            }
            Err(e) => errors.push(ValidationError::new(
                format!("listeners[{i}].bind_address"),
                format!("{:?}: {e}", listener.bind_address),
            )),
        }
        if listener.max_connections == 0 {
            errors.push(ValidationError::new(format!("listeners[{i}].max_connections"), "must be > 0"));
        }
        if let Some(tls) = &listener.tls {
            if tls.cert_path.is_empty() || tls.key_path.is_empty() {
                errors.push(ValidationError::new(
                    format!("listeners[{i}].tls"),
                    "cert_path and key_path are required",
                ));
            }
        }
    }

    if config.transport.max_head_size < 1024 {
        errors.push(ValidationError::new("transport.max_head_size", "must be at least 1024"));
    }
    if config.transport.max_body_size == 0 {
        errors.push(ValidationError::new("transport.max_body_size", "must be > 0"));
    }
    if config.client.max_attempts == 0 {
        errors.push(ValidationError::new("client.max_attempts", "must be > 0"));
    }
    if config.client.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("client.connect_timeout_ms", "must be > 0"));
    }
    if let Some(proxy) = &config.client.proxy {
        if proxy.host.trim().is_empty() || proxy.port == 0 {
            errors.push(ValidationError::new("client.proxy", "host and port are required"));
        }
    }

    let mut names = HashSet::new();
    for (i, rule) in config.rules.iter().enumerate() {
        validate_rule(i, rule, &mut errors);
        if !rule.name.is_empty() && !names.insert(rule.name.as_str()) {
            errors.push(ValidationError::new(
                format!("rules[{i}].name"),
                format!("duplicate rule name {:?}", rule.name),
            ));
        }
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ListenerConfig, TargetConfig};

    fn rule(name: &str) -> RuleConfig {
        RuleConfig {
            name: name.to_string(),
            port: None,
            host: None,
            path_prefix: None,
            method: None,
            priority: 0,
            target: TargetConfig::default(),
            interceptors: Vec::new(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = GatewayConfig::default();
        config.listeners = vec![
            ListenerConfig {
                bind_address: "127.0.0.1:8080".into(),
                ..Default::default()
            },
            ListenerConfig {
                bind_address: "127.0.0.1:8080".into(),
                max_connections: 0,
                ..Default::default()
            },
        ];
        config.client.max_attempts = 0;
        config.transport.max_body_size = 0;
        let mut bad = rule("dup");
        bad.target.url = Some("ftp://files".into());
        bad.interceptors.push(InterceptorConfig::Respond {
            status: 100,
            body: String::new(),
            content_type: "text/plain".into(),
        });
        config.rules = vec![rule("dup"), bad];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"listeners[1].bind_address"));
        assert!(fields.contains(&"transport.max_body_size"));
        assert!(fields.contains(&"listeners[1].max_connections"));
        assert!(fields.contains(&"client.max_attempts"));
        assert!(fields.contains(&"rules[1].target.url"));
        assert!(fields.contains(&"rules[1].interceptors[0].status"));
        assert!(fields.contains(&"rules[1].name"));
    }

    #[test]
    fn test_admin_requires_key() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = " ".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "admin.api_key");
    }
}
