//! Configuration validation logic.

use super::{ServerConfig, TlsConfig};

/// Validate a merged configuration.
pub fn validate(config: &ServerConfig) -> Result<(), String> {
    validate_positive("client_queue_capacity", config.client_queue_capacity as u64)?;
    validate_positive(
        "upstream_queue_capacity",
        config.upstream_queue_capacity as u64,
    )?;
    validate_positive("tool_concurrency_limit", config.tool_concurrency_limit as u64)?;
    validate_positive("setup_timeout_ms", config.setup_timeout_ms)?;
    validate_positive("drain_timeout_ms", config.drain_timeout_ms)?;
    validate_positive("tool_timeout_ms", config.tool_timeout_ms)?;
    validate_positive(
        "rate_limit_requests_per_second",
        config.rate_limit_requests_per_second as u64,
    )?;
    validate_positive("rate_limit_burst_size", config.rate_limit_burst_size as u64)?;
    if let Some(max) = config.max_sessions {
        validate_positive("max_sessions", max as u64)?;
    }
    if config.default_language.trim().is_empty() {
        return Err("default_language must not be empty".to_string());
    }
    url::Url::parse(&config.openai_realtime_url)
        .map_err(|e| format!("Invalid openai_realtime_url: {e}"))?;
    if let Some(tls) = &config.tls {
        validate_tls(tls)?;
    }
    Ok(())
}

fn validate_positive(field: &str, value: u64) -> Result<(), String> {
    if value == 0 {
        return Err(format!("{field} must be greater than zero"));
    }
    Ok(())
}

/// TLS files must exist.
fn validate_tls(tls: &TlsConfig) -> Result<(), String> {
    if !tls.cert_path.exists() {
        return Err(format!(
            "TLS certificate not found: {}",
            tls.cert_path.display()
        ));
    }
    if !tls.key_path.exists() {
        return Err(format!("TLS key not found: {}", tls.key_path.display()));
    }
    Ok(())
}
