//! Server configuration
//!
//! Every setting resolves as command-line argument, then environment
//! variable, then built-in default.
//!
//! # Environment Variables
//!
//! - `INSPECTOR_PORT` / `PORT`: backend port (default 5050)
//! - `INSPECTOR_TIMEOUT_MS`: HTTP timeout in milliseconds (default 2000)
//! - `INSPECTOR_CACHE_TTL_MS`: probe cache TTL in milliseconds (default 3000)
//! - `INSPECTOR_WAIT_HEALTH_MS`: startup health wait budget (default: no wait)
//! - `RASPI_MCP_DEBUG`: any non-empty value enables stderr diagnostics

use crate::backend::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::error::ConfigError;
use crate::probe::DEFAULT_PROBE_TTL;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for local diagnostic commands
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Values given on the command line; `None` means "not given"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--port`
    pub port: Option<u16>,
    /// `--timeout-ms`
    pub timeout_ms: Option<u64>,
    /// `--cache-ttl-ms`
    pub cache_ttl_ms: Option<u64>,
    /// `--wait-health-ms`
    pub wait_health_ms: Option<u64>,
    /// `--debug`
    pub debug: bool,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Backend port on 127.0.0.1
    pub port: u16,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Probe cache TTL
    pub cache_ttl: Duration,
    /// Timeout for local commands
    pub command_timeout: Duration,
    /// Startup health wait budget, if any
    pub wait_health: Option<Duration>,
    /// Emit diagnostics on stderr
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: DEFAULT_PROBE_TTL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            wait_health: None,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Resolve against the process environment
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |name| env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup
    pub fn resolve<F>(overrides: ConfigOverrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match overrides.port {
            Some(port) => port,
            None => match lookup::<u16, _>(&env, "INSPECTOR_PORT")? {
                Some(port) => port,
                None => lookup::<u16, _>(&env, "PORT")?.unwrap_or(defaults.port),
            },
        };
        if port == 0 {
            return Err(invalid("port", "0", "port must be non-zero"));
        }

        let timeout_ms = match overrides.timeout_ms {
            Some(ms) => ms,
            None => lookup(&env, "INSPECTOR_TIMEOUT_MS")?
                .unwrap_or(defaults.timeout.as_millis() as u64),
        };
        if timeout_ms == 0 {
            return Err(invalid("timeout-ms", "0", "timeout must be non-zero"));
        }

        let cache_ttl_ms = match overrides.cache_ttl_ms {
            Some(ms) => ms,
            None => lookup(&env, "INSPECTOR_CACHE_TTL_MS")?
                .unwrap_or(defaults.cache_ttl.as_millis() as u64),
        };

        let wait_health_ms = match overrides.wait_health_ms {
            Some(ms) => Some(ms),
            None => lookup::<u64, _>(&env, "INSPECTOR_WAIT_HEALTH_MS")?,
        };

        let debug = overrides.debug
            || env("RASPI_MCP_DEBUG")
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);

        Ok(Self {
            port,
            timeout: Duration::from_millis(timeout_ms),
            cache_ttl: Duration::from_millis(cache_ttl_ms),
            command_timeout: defaults.command_timeout,
            wait_health: wait_health_ms.filter(|&ms| ms > 0).map(Duration::from_millis),
            debug,
        })
    }

    /// `http://127.0.0.1:<port>`
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

fn lookup<T, F>(env: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match env(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(name, &raw, &e.to_string())),
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::resolve(ConfigOverrides::default(), env_of(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.base_url(), "http://127.0.0.1:5050");
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let config = ServerConfig::resolve(
            ConfigOverrides::default(),
            env_of(&[
                ("INSPECTOR_PORT", "6060"),
                ("INSPECTOR_TIMEOUT_MS", "750"),
                ("INSPECTOR_CACHE_TTL_MS", "10000"),
                ("INSPECTOR_WAIT_HEALTH_MS", "5000"),
                ("RASPI_MCP_DEBUG", "1"),
            ]),
        )
        .unwrap();
        assert_eq!(config.port, 6060);
        assert_eq!(config.timeout, Duration::from_millis(750));
        assert_eq!(config.cache_ttl, Duration::from_secs(10));
        assert_eq!(config.wait_health, Some(Duration::from_secs(5)));
        assert!(config.debug);
    }

    #[test]
    fn test_arguments_override_environment() {
        let overrides = ConfigOverrides {
            port: Some(7070),
            timeout_ms: Some(100),
            ..Default::default()
        };
        let config = ServerConfig::resolve(
            overrides,
            env_of(&[("INSPECTOR_PORT", "6060"), ("INSPECTOR_TIMEOUT_MS", "750")]),
        )
        .unwrap();
        assert_eq!(config.port, 7070);
        assert_eq!(config.timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_port_fallback_variable() {
        let config =
            ServerConfig::resolve(ConfigOverrides::default(), env_of(&[("PORT", "8081")])).unwrap();
        assert_eq!(config.port, 8081);

        let config = ServerConfig::resolve(
            ConfigOverrides::default(),
            env_of(&[("PORT", "8081"), ("INSPECTOR_PORT", "9091")]),
        )
        .unwrap();
        assert_eq!(config.port, 9091);
    }

    #[test]
    fn test_unparseable_environment_is_error() {
        let err = ServerConfig::resolve(
            ConfigOverrides::default(),
            env_of(&[("INSPECTOR_TIMEOUT_MS", "soon")]),
        )
        .unwrap_err();
        let ConfigError::InvalidValue { name, value, .. } = err;
        assert_eq!(name, "INSPECTOR_TIMEOUT_MS");
        assert_eq!(value, "soon");
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(ServerConfig::resolve(
            ConfigOverrides {
                port: Some(0),
                ..Default::default()
            },
            env_of(&[])
        )
        .is_err());
        assert!(ServerConfig::resolve(
            ConfigOverrides::default(),
            env_of(&[("INSPECTOR_TIMEOUT_MS", "0")])
        )
        .is_err());
    }

    #[test]
    fn test_empty_debug_value_is_off() {
        let config =
            ServerConfig::resolve(ConfigOverrides::default(), env_of(&[("RASPI_MCP_DEBUG", "")]))
                .unwrap();
        assert!(!config.debug);
    }
}
