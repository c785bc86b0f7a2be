//! Runtime configuration for the API binary, read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

use bazaar_observability::LogFormat;

pub const HTTP_ADDR_VAR: &str = "BAZAAR_HTTP_ADDR";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
pub const LOG_FORMAT_VAR: &str = "BAZAAR_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid socket address: {value}")]
    InvalidAddr { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub http_addr: SocketAddr,
    /// `json` (default) or `pretty`.
    pub log_format: LogFormat,
}

impl ApiConfig {
    /// Read configuration from the process environment.
    ///
    /// Log filtering (`RUST_LOG`) is applied by `bazaar-observability`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(HTTP_ADDR_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());

        let http_addr = raw.trim().parse().map_err(|_| ConfigError::InvalidAddr {
            var: HTTP_ADDR_VAR,
            value: raw.clone(),
        })?;

        let log_format = lookup(LOG_FORMAT_VAR)
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();

        Ok(Self { http_addr, log_format })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_all_interfaces_on_8080() {
        let config = ApiConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn reads_the_address_override() {
        let config = ApiConfig::from_lookup(|var| {
            (var == HTTP_ADDR_VAR).then(|| "127.0.0.1:9090".to_string())
        })
        .unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:9090".parse().unwrap());
    }

    #[test]
    fn reads_the_log_format() {
        let config = ApiConfig::from_lookup(|var| {
            (var == LOG_FORMAT_VAR).then(|| "pretty".to_string())
        })
        .unwrap();
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_malformed_addresses() {
        let err = ApiConfig::from_lookup(|_| Some("localhost".into())).unwrap_err();
        assert!(err.to_string().contains(HTTP_ADDR_VAR));
    }
}
