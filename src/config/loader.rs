//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {var} has invalid value {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file, apply environment overrides, and validate the result.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ProxyConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay the supported environment variables onto `config`.
///
/// `lookup` abstracts the process environment so callers can supply a fixed map.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = parse_var::<u16, _>(&lookup, "SERVER_PORT")? {
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }
    if let Some(algorithm) = lookup("BALANCER_ALGORITHM") {
        config.balancer.algorithm = algorithm;
    }
    if let Some(enabled) = parse_var::<bool, _>(&lookup, "RATE_LIMITER_ENABLED")? {
        config.rate_limiter.enabled = enabled;
    }
    if let Some(capacity) = parse_var::<u64, _>(&lookup, "RATE_LIMITER_CAPACITY")? {
        config.rate_limiter.default_limit.capacity = capacity;
    }
    if let Some(rate) = parse_var::<u64, _>(&lookup, "RATE_LIMITER_RATE")? {
        config.rate_limiter.default_limit.rate_per_sec = rate;
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ClientKeyMode, InitialHealth};
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
[listener]
bind_address = "127.0.0.1:9000"

[balancer]
algorithm = "round_robin"

[[balancer.backends]]
url = "http://127.0.0.1:3001"

[[balancer.backends]]
url = "http://127.0.0.1:3002/api"

[rate_limiter]
enabled = true
key_by = "ip_port"

[rate_limiter.default_limit]
capacity = 2
rate_per_sec = 1

[[rate_limiter.overrides]]
client = "10.0.0.7"
capacity = 500
rate_per_sec = 50

[health_check]
interval_secs = 10
timeout_secs = 2
path = "/healthz"
initial_state = "pessimistic"
"#;

    #[test]
    fn test_load_sample_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.balancer.backends.len(), 2);
        assert_eq!(config.rate_limiter.default_limit.capacity, 2);
        assert_eq!(config.rate_limiter.key_by, ClientKeyMode::IpPort);
        assert_eq!(config.rate_limiter.overrides[0].client, "10.0.0.7");
        assert_eq!(config.health_check.path.as_deref(), Some("/healthz"));
        assert_eq!(config.health_check.initial_state, InitialHealth::Pessimistic);
        // untouched sections keep their defaults
        assert_eq!(config.rate_limiter.idle_retention_secs, 3600);
        assert_eq!(config.timeouts.request_secs, 30);
        assert_eq!(config.timeouts.idle_secs, 120);
        assert_eq!(config.rate_limiter.stop_timeout_secs, 5);
    }

    #[test]
    fn test_invalid_file_reports_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[balancer]\nalgorithm = \"round_robin\"\n").unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors, vec![ValidationError::NoBackends]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SERVER_PORT", "9100"),
            ("BALANCER_ALGORITHM", "least_conn"),
            ("RATE_LIMITER_ENABLED", "false"),
            ("RATE_LIMITER_CAPACITY", "7"),
            ("RATE_LIMITER_RATE", "3"),
        ]);
        let mut config = ProxyConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:9100");
        assert_eq!(config.balancer.algorithm, "least_conn");
        assert!(!config.rate_limiter.enabled);
        assert_eq!(config.rate_limiter.default_limit.capacity, 7);
        assert_eq!(config.rate_limiter.default_limit.rate_per_sec, 3);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = ProxyConfig::default();
        let err = apply_env_overrides(&mut config, |k| {
            (k == "RATE_LIMITER_CAPACITY").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "RATE_LIMITER_CAPACITY", .. }));
    }
}
