use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use mycelium::config::load_config;
///
/// let config = load_config(Path::new("mycelium.toml")).unwrap();
/// println!("Workers: {}", config.crawler.workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PopModeConfig, StoreBackend};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
workers = 4
max-retries = 3
request-timeout-ms = 10000

[frontier]
pop-mode = "blocking"

[idle]
interval-ms = 1000
max-idle = 5

[store]
backend = "redis"
url = "redis://127.0.0.1:6379/0"
handoff = true

[inputs]
seed-file = "./seed.txt"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.crawler.max_retries, 3);
        assert!(!config.crawler.retry_fetch_failures);
        assert!(config.crawler.shared_rotators);
        assert_eq!(config.frontier.pop_mode, PopModeConfig::Blocking);
        assert_eq!(config.idle.as_ref().map(|i| i.max_idle), Some(5));
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.frontier_key, "queue");
        assert_eq!(config.store.handoff_key, "fungicide");
        assert_eq!(config.inputs.seed_file.as_deref(), Some("./seed.txt"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
[crawler]
workers = 1
max-retries = 0
request-timeout-ms = 500

[store]
backend = "memory"
handoff = true
"#,
        )
        .unwrap();

        assert_eq!(config.frontier.pop_mode, PopModeConfig::Bounded);
        assert_eq!(config.frontier.pop_timeout_ms, 5000);
        assert!(config.idle.is_none());
        assert!(config.crawler.fetch_retry().is_none());
        assert!(config.crawler.default_user_agent.starts_with("mycelium/"));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/mycelium.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let result = parse_config(
            r#"
[crawler]
workers = 1
max-retries = 0
request-timeout-ms = 500

[store]
backend = "cassandra"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
workers = 0
max-retries = 3
request-timeout-ms = 10000

[store]
backend = "memory"
handoff = true
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
