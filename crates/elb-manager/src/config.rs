/// Environment-driven configuration
/// Covers the provider endpoint/transport settings and the manager's
/// control-plane port and default health check.

use crate::types::{HealthCheckSpec, Protocol, CONTROL_PLANE_PORT};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Read `key` through `lookup`, falling back to `default` when unset
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            ConfigError::InvalidConfig(format!("Invalid {}: {} ({})", key, raw, e))
        }),
        None => Ok(default),
    }
}

/// Provider endpoint and transport settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub region: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl ServiceConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: "us-east-1".to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 5_000,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup("ELB_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("ELB_ENDPOINT".to_string()))?;

        let defaults = Self::new(endpoint);
        let region = lookup("ELB_REGION").unwrap_or(defaults.region.clone());
        let request_timeout_secs =
            parse_var(&lookup, "ELB_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?;
        let max_retries = parse_var(&lookup, "ELB_MAX_RETRIES", defaults.max_retries)?;
        let backoff_base_ms = parse_var(&lookup, "ELB_BACKOFF_BASE_MS", defaults.backoff_base_ms)?;
        let backoff_max_ms = parse_var(&lookup, "ELB_BACKOFF_MAX_MS", defaults.backoff_max_ms)?;

        let config = ServiceConfig {
            region,
            request_timeout_secs,
            max_retries,
            backoff_base_ms,
            backoff_max_ms,
            ..defaults
        };
        config.validate()?;

        info!(
            "Service configuration loaded: endpoint={}, region={}, timeout={}s, max_retries={}",
            config.endpoint, config.region, config.request_timeout_secs, config.max_retries
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidConfig(format!(
                "Endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }
        if self.request_timeout_secs < 1 || self.request_timeout_secs > 300 {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be between 1 and 300 seconds".to_string(),
            ));
        }
        if self.max_retries > 10 {
            return Err(ConfigError::InvalidConfig(
                "Max retries must not exceed 10".to_string(),
            ));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "Backoff max ({}ms) must not be below backoff base ({}ms)",
                self.backoff_max_ms, self.backoff_base_ms
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Manager behaviour: which port is toggled and which health check is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub control_plane_port: u16,
    pub health_check: HealthCheckSpec,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            control_plane_port: CONTROL_PLANE_PORT,
            health_check: HealthCheckSpec::default(),
        }
    }
}

impl ManagerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let hc = defaults.health_check;

        let control_plane_port =
            parse_var(&lookup, "ELB_CONTROL_PLANE_PORT", defaults.control_plane_port)?;

        let protocol = match lookup("ELB_HEALTH_CHECK_PROTOCOL") {
            Some(raw) => Protocol::from_str(&raw)
                .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?,
            None => hc.protocol,
        };

        let health_check = HealthCheckSpec {
            protocol,
            path: lookup("ELB_HEALTH_CHECK_PATH").unwrap_or(hc.path),
            port: parse_var(&lookup, "ELB_HEALTH_CHECK_PORT", hc.port)?,
            interval_secs: parse_var(&lookup, "ELB_HEALTH_CHECK_INTERVAL_SECS", hc.interval_secs)?,
            timeout_secs: parse_var(&lookup, "ELB_HEALTH_CHECK_TIMEOUT_SECS", hc.timeout_secs)?,
            healthy_threshold: parse_var(
                &lookup,
                "ELB_HEALTH_CHECK_HEALTHY_THRESHOLD",
                hc.healthy_threshold,
            )?,
            unhealthy_threshold: parse_var(
                &lookup,
                "ELB_HEALTH_CHECK_UNHEALTHY_THRESHOLD",
                hc.unhealthy_threshold,
            )?,
        };

        if control_plane_port == 0 {
            return Err(ConfigError::InvalidConfig(
                "Control plane port must be between 1 and 65535".to_string(),
            ));
        }
        health_check
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        debug!(
            "Manager configuration loaded: control_plane_port={}, health_check={}",
            control_plane_port,
            health_check.target()
        );

        Ok(ManagerConfig {
            control_plane_port,
            health_check,
        })
    }
}
