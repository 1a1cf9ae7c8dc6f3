//! Client configuration.
//!
//! Everything is constructor-injected; nothing here is read from global
//! state except by [`ClientConfig::from_env`].

use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::queue::QueueConfig;

pub const ENV_API_BASE_HREF: &str = "ASSESSMENT_API_BASE_HREF";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "ASSESSMENT_REQUEST_TIMEOUT_SECS";
pub const ENV_BATCH_SIZE: &str = "ASSESSMENT_BATCH_SIZE";
pub const ENV_SAMPLE_PERIOD_MS: &str = "ASSESSMENT_SAMPLE_PERIOD_MS";
pub const ENV_SERVER_PAGE_SIZE: &str = "ASSESSMENT_SERVER_PAGE_SIZE";

const DEFAULT_API_BASE_HREF: &str = "http://localhost:8000/api";

/// Configuration for the http backend and the queues built on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Prefix for every api path, e.g. `https://example.org/api`.
    pub api_base_href: String,

    /// Per-request timeout.
    pub request_timeout: Duration,

    pub queue: QueueConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_href: DEFAULT_API_BASE_HREF.to_string(),
            request_timeout: Duration::from_secs(30),
            queue: QueueConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_base_href: impl Into<String>) -> Self {
        Self {
            api_base_href: api_base_href.into(),
            ..Default::default()
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Read overrides from `ASSESSMENT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(href) = lookup(ENV_API_BASE_HREF) {
            config.api_base_href = href;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_REQUEST_TIMEOUT_SECS)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var::<usize>(&lookup, ENV_BATCH_SIZE)? {
            config.queue.batch_size = size;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_SAMPLE_PERIOD_MS)? {
            config.queue.sample_period = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var::<usize>(&lookup, ENV_SERVER_PAGE_SIZE)? {
            config.queue.server_page_size = size;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.api_base_href).map_err(|e| ConfigError::InvalidBaseHref {
            href: self.api_base_href.clone(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseHref {
                href: self.api_base_href.clone(),
                reason: "not a base url".to_string(),
            });
        }
        self.queue.validate()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_API_BASE_HREF, "https://school.example/api"),
            (ENV_REQUEST_TIMEOUT_SECS, "5"),
            (ENV_BATCH_SIZE, "10"),
            (ENV_SAMPLE_PERIOD_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.api_base_href, "https://school.example/api");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.queue.batch_size, 10);
        assert_eq!(config.queue.sample_period, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_number() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                name: ENV_BATCH_SIZE.to_string(),
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn test_queue_config_validated() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "40")])).unwrap_err();
        assert!(matches!(err, ConfigError::BatchExceedsPageSize { .. }));
    }

    #[test]
    fn test_invalid_base_href() {
        let err = ClientConfig::new("not a url").validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseHref { .. }));
    }
}
