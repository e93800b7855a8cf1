use crate::config::types::{
    Config, CrawlerConfig, FrontierConfig, IdleConfig, InputsConfig, PopModeConfig, StoreBackend,
    StoreConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_frontier_config(&config.frontier)?;
    if let Some(idle) = &config.idle {
        validate_idle_config(idle)?;
    }
    validate_store_config(&config.store)?;
    validate_inputs_config(&config.inputs)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    if config.max_body_bytes < 1 {
        return Err(ConfigError::Validation(
            "max_body_bytes must be >= 1".to_string(),
        ));
    }

    if config.default_user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "default_user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_frontier_config(config: &FrontierConfig) -> Result<(), ConfigError> {
    if config.pop_mode == PopModeConfig::Bounded && config.pop_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "pop_timeout_ms must be >= 1ms in bounded pop mode".to_string(),
        ));
    }
    Ok(())
}

fn validate_idle_config(config: &IdleConfig) -> Result<(), ConfigError> {
    if config.interval_ms == 0 {
        return Err(ConfigError::Validation(
            "idle interval_ms must be >= 1ms".to_string(),
        ));
    }
    Ok(())
}

/// Validates store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    match config.backend {
        StoreBackend::Memory => {}
        StoreBackend::Sqlite => {
            if config.path.as_deref().map_or(true, |p| p.trim().is_empty()) {
                return Err(ConfigError::Validation(
                    "sqlite backend requires a database path".to_string(),
                ));
            }
        }
        StoreBackend::Redis => {
            let raw = config.url.as_deref().ok_or_else(|| {
                ConfigError::Validation("redis backend requires a url".to_string())
            })?;
            let url = Url::parse(raw)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid redis url: {}", e)))?;
            if url.scheme() != "redis" && url.scheme() != "rediss" {
                return Err(ConfigError::InvalidUrl(format!(
                    "Redis url '{}' must use the redis:// or rediss:// scheme",
                    raw
                )));
            }
        }
    }

    for (name, key) in [
        ("frontier_key", &config.frontier_key),
        ("visited_key", &config.visited_key),
        ("blacklist_key", &config.blacklist_key),
        ("handoff_key", &config.handoff_key),
        ("ingress_key", &config.ingress_key),
    ] {
        if key.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if !config.handoff && config.output_dir.as_deref().map_or(true, |d| d.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "output_dir is required when handoff is disabled".to_string(),
        ));
    }

    Ok(())
}

fn validate_inputs_config(config: &InputsConfig) -> Result<(), ConfigError> {
    for (name, path) in [
        ("seed_file", &config.seed_file),
        ("agents_file", &config.agents_file),
        ("proxy_file", &config.proxy_file),
        ("blacklist_file", &config.blacklist_file),
    ] {
        if path.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }
    Ok(())
}

/// Validates a domain string as accepted in blacklist files
pub(crate) fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    // Check for invalid characters
    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
