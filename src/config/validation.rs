//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AnchorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AnchorConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check the semantic constraints serde cannot express.
pub fn validate_config(config: &AnchorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.node.org.trim().is_empty() {
        errors.push(ValidationError::new("node.org", "must not be empty"));
    }
    if config.node.signing_key.trim().is_empty() {
        errors.push(ValidationError::new("node.signing_key", "must not be empty"));
    }

    check_socket_addr(&mut errors, "api.bind_address", &config.api.bind_address);
    if config.api.request_timeout_secs == 0 {
        errors.push(ValidationError::new("api.request_timeout_secs", "must be greater than 0"));
    }
    if config.api.sync_wait_timeout_secs == 0 {
        errors.push(ValidationError::new("api.sync_wait_timeout_secs", "must be greater than 0"));
    }

    let broadcast = &config.broadcast;
    if broadcast.batch_size == 0 {
        errors.push(ValidationError::new("broadcast.batch_size", "must be greater than 0"));
    }
    if broadcast.batch_payload_limit == 0 {
        errors.push(ValidationError::new("broadcast.batch_payload_limit", "must be greater than 0"));
    }
    if broadcast.batch_timeout_ms == 0 {
        errors.push(ValidationError::new("broadcast.batch_timeout_ms", "must be greater than 0"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            format!("{} exceeds max_delay_ms {}", retries.base_delay_ms, retries.max_delay_ms),
        ));
    }
    if retries.dispatch_timeout_secs == 0 {
        errors.push(ValidationError::new("retries.dispatch_timeout_secs", "must be greater than 0"));
    }

    check_url(&mut errors, "shared_storage.api_url", &config.shared_storage.api_url);
    check_url(&mut errors, "shared_storage.gateway_url", &config.shared_storage.gateway_url);
    check_url(&mut errors, "data_exchange.url", &config.data_exchange.url);
    check_url(&mut errors, "blockchain.rpc_url", &config.blockchain.rpc_url);
    for (i, failover) in config.blockchain.failover_urls.iter().enumerate() {
        check_url(&mut errors, &format!("blockchain.failover_urls[{}]", i), failover);
    }
    if config.blockchain.contract_address.parse::<alloy::primitives::Address>().is_err() {
        errors.push(ValidationError::new(
            "blockchain.contract_address",
            format!("'{}' is not a valid address", config.blockchain.contract_address),
        ));
    }
    if config.blockchain.gas_price_multiplier < 1.0 {
        errors.push(ValidationError::new("blockchain.gas_price_multiplier", "must be at least 1.0"));
    }

    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if let Err(e) = url::Url::parse(value) {
        errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e)));
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{}'", value)));
    }
}
