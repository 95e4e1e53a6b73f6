//! Configuration validation rules.

use super::schema::RelayConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &RelayConfig) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.queue.capacity == 0 {
        errors.push("queue.capacity must be > 0".to_string());
    }

    if config.cache.max_entries == 0 {
        errors.push("cache.max_entries must be > 0".to_string());
    }
    if config.cache.default_ttl_secs == 0 {
        errors.push("cache.default_ttl_secs must be > 0".to_string());
    }

    if config.breaker.failure_threshold == 0 {
        errors.push("breaker.failure_threshold must be > 0".to_string());
    }

    if let Some(max_delay) = config.retry.max_delay_ms {
        if max_delay < config.retry.base_delay_ms {
            errors.push("retry.max_delay_ms must be >= retry.base_delay_ms".to_string());
        }
    }

    if config.durable.root.trim().is_empty() {
        errors.push("durable.root must not be empty".to_string());
    }

    if config.maintenance.enabled && config.maintenance.interval_s == 0 {
        errors.push("maintenance.interval_s must be > 0 when maintenance is enabled".to_string());
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "logging.level must be one of {}",
            LOG_LEVELS.join(", ")
        ));
    }
    if !matches!(config.logging.format.to_lowercase().as_str(), "text" | "json") {
        errors.push("logging.format must be text or json".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults() {
        validate_config(&RelayConfig::default()).unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_capacities() {
        let mut config = RelayConfig::default();
        config.queue.capacity = 0;
        config.cache.max_entries = 0;

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("queue.capacity"));
        assert!(err.contains("cache.max_entries"));
    }

    #[test]
    fn test_validate_retry_cap_below_base() {
        let mut config = RelayConfig::default();
        config.retry.base_delay_ms = 500;
        config.retry.max_delay_ms = Some(100);

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("retry.max_delay_ms"));
    }

    #[test]
    fn test_validate_logging() {
        let mut config = RelayConfig::default();
        config.logging.level = "loud".to_string();
        config.logging.format = "xml".to_string();

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("logging.level"));
        assert!(err.contains("logging.format"));
    }

    #[test]
    fn test_validate_disabled_maintenance_ignores_interval() {
        let mut config = RelayConfig::default();
        config.maintenance.enabled = false;
        config.maintenance.interval_s = 0;
        validate_config(&config).unwrap();
    }
}
