//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses and URLs are well formed
//! - Validate value ranges (budgets > 0, intervals > 0, thresholds finite)
//! - Detect duplicate token symbols and contracts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonitorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::MonitorConfig;
use crate::monitor::policy::parse_watch_address;

/// Largest decimal count whose scale still fits in a U256.
const MAX_TOKEN_DECIMALS: u8 = 77;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `chain.tokens[1].contract`.
    pub field: String,
    /// Human readable description.
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_chain(config, &mut errors);
    validate_rpc(config, &mut errors);
    validate_policy(config, &mut errors);
    validate_notifier(config, &mut errors);

    if config.scanner.scan_interval_ms == 0 {
        errors.push(ValidationError::new("scanner.scan_interval_ms", "must be greater than 0"));
    }
    if config.scanner.max_blocks_per_tick == 0 {
        errors.push(ValidationError::new("scanner.max_blocks_per_tick", "must be greater than 0"));
    }
    if config.scanner.update_queue_capacity == 0 {
        errors.push(ValidationError::new("scanner.update_queue_capacity", "must be greater than 0"));
    }
    if config.scanner.transaction_timeout_secs == 0 {
        errors.push(ValidationError::new("scanner.transaction_timeout_secs", "must be greater than 0"));
    }
    if config.health.unhealthy_threshold == 0 {
        errors.push(ValidationError::new("health.unhealthy_threshold", "must be greater than 0"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_chain(config: &MonitorConfig, errors: &mut Vec<ValidationError>) {
    let chain = &config.chain;

    if chain.name.trim().is_empty() {
        errors.push(ValidationError::new("chain.name", "must not be empty"));
    }
    if chain.native_symbol.trim().is_empty() {
        errors.push(ValidationError::new("chain.native_symbol", "must not be empty"));
    }
    if let Err(e) = chain.rpc_url.parse::<url::Url>() {
        errors.push(ValidationError::new("chain.rpc_url", format!("invalid URL: {}", e)));
    }
    for (i, failover) in chain.failover_urls.iter().enumerate() {
        if let Err(e) = failover.parse::<url::Url>() {
            errors.push(ValidationError::new(
                format!("chain.failover_urls[{}]", i),
                format!("invalid URL: {}", e),
            ));
        }
    }

    let mut symbols = HashSet::new();
    let mut contracts = HashSet::new();
    for (i, token) in chain.tokens.iter().enumerate() {
        if token.symbol.trim().is_empty() {
            errors.push(ValidationError::new(format!("chain.tokens[{}].symbol", i), "must not be empty"));
        }
        if token.symbol == chain.native_symbol {
            errors.push(ValidationError::new(
                format!("chain.tokens[{}].symbol", i),
                "collides with the native symbol",
            ));
        }
        if !symbols.insert(token.symbol.clone()) {
            errors.push(ValidationError::new(
                format!("chain.tokens[{}].symbol", i),
                format!("duplicate symbol '{}'", token.symbol),
            ));
        }
        match parse_watch_address(&token.contract) {
            Ok(address) => {
                if !contracts.insert(address) {
                    errors.push(ValidationError::new(
                        format!("chain.tokens[{}].contract", i),
                        "duplicate contract address",
                    ));
                }
            }
            Err(e) => errors.push(ValidationError::new(
                format!("chain.tokens[{}].contract", i),
                e.to_string(),
            )),
        }
        if token.decimals > MAX_TOKEN_DECIMALS {
            errors.push(ValidationError::new(
                format!("chain.tokens[{}].decimals", i),
                format!("must be at most {}", MAX_TOKEN_DECIMALS),
            ));
        }
    }
}

fn validate_rpc(config: &MonitorConfig, errors: &mut Vec<ValidationError>) {
    let rpc = &config.rpc;

    if rpc.timeout_secs == 0 {
        errors.push(ValidationError::new("rpc.timeout_secs", "must be greater than 0"));
    }
    if rpc.max_calls_per_second == 0 {
        errors.push(ValidationError::new("rpc.max_calls_per_second", "must be greater than 0"));
    }
    if rpc.max_calls_per_day == 0 {
        errors.push(ValidationError::new("rpc.max_calls_per_day", "must be greater than 0"));
    }
    if rpc.max_calls_per_day < rpc.max_calls_per_second {
        errors.push(ValidationError::new(
            "rpc.max_calls_per_day",
            "must not be lower than rpc.max_calls_per_second",
        ));
    }
    if config.retries.enabled && config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be greater than 0"));
    }
}

fn validate_policy(config: &MonitorConfig, errors: &mut Vec<ValidationError>) {
    let policy = &config.policy;

    let amounts = policy
        .thresholds
        .iter()
        .map(|(symbol, value)| (format!("policy.thresholds.{}", symbol), *value))
        .chain(
            policy
                .high_value_thresholds
                .iter()
                .map(|(symbol, value)| (format!("policy.high_value_thresholds.{}", symbol), *value)),
        );
    for (field, value) in amounts {
        if !value.is_finite() || value < 0.0 {
            errors.push(ValidationError::new(field, "must be a finite, non-negative amount"));
        }
    }

    for (i, address) in policy.watch_addresses.iter().enumerate() {
        if let Err(e) = parse_watch_address(address) {
            errors.push(ValidationError::new(format!("policy.watch_addresses[{}]", i), e.to_string()));
        }
    }
}

fn validate_notifier(config: &MonitorConfig, errors: &mut Vec<ValidationError>) {
    let notifier = &config.notifier;
    let Some(url) = &notifier.webhook_url else {
        return;
    };

    match url.parse::<url::Url>() {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        Ok(parsed) => errors.push(ValidationError::new(
            "notifier.webhook_url",
            format!("unsupported scheme '{}'", parsed.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("notifier.webhook_url", format!("invalid URL: {}", e))),
    }
    if notifier.timeout_secs == 0 {
        errors.push(ValidationError::new("notifier.timeout_secs", "must be greater than 0"));
    }
    if notifier.max_attempts == 0 {
        errors.push(ValidationError::new("notifier.max_attempts", "must be greater than 0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TokenConfig;

    fn usdt() -> TokenConfig {
        TokenConfig {
            symbol: "USDT".to_string(),
            contract: "0x55d398326f99059ff775485246999027b3197955".to_string(),
            decimals: 18,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&MonitorConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = MonitorConfig::default();
        config.chain.rpc_url = "not a url".to_string();
        config.rpc.max_calls_per_second = 0;
        config.policy.watch_addresses.push("0x1234".to_string());
        config.policy.thresholds.insert("USDT".to_string(), -1.0);

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"chain.rpc_url"));
        assert!(fields.contains(&"rpc.max_calls_per_second"));
        assert!(fields.contains(&"policy.watch_addresses[0]"));
        assert!(fields.contains(&"policy.thresholds.USDT"));
    }

    #[test]
    fn test_duplicate_tokens_rejected() {
        let mut config = MonitorConfig::default();
        config.chain.tokens = vec![usdt(), usdt()];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate symbol")));
        assert!(errors.iter().any(|e| e.message.contains("duplicate contract")));
    }

    #[test]
    fn test_excessive_decimals_rejected() {
        let mut config = MonitorConfig::default();
        let mut token = usdt();
        token.decimals = 78;
        config.chain.tokens = vec![token];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "chain.tokens[0].decimals");
    }

    #[test]
    fn test_webhook_settings_checked_only_when_set() {
        let mut config = MonitorConfig::default();
        config.notifier.timeout_secs = 0;
        assert!(validate_config(&config).is_ok());

        config.notifier.webhook_url = Some("ftp://hooks.internal/deposits".to_string());
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["notifier.webhook_url", "notifier.timeout_secs"]);

        config.notifier.webhook_url = Some("https://hooks.internal/deposits".to_string());
        config.notifier.timeout_secs = 10;
        assert!(validate_config(&config).is_ok());
    }
}
