// Configuration module - resolves the exporter's runtime settings
//
// This module is responsible for:
// 1. Reading the YARN_PROMETHEUS_* environment variables
// 2. Applying the documented defaults for anything not set
// 3. Validating the listen address and the three upstream endpoint URLs
//
// All validation happens once at startup, before the first scrape. An
// unparsable address, port, timeout or endpoint URL is fatal.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::info;
use url::Url;

/// Errors that can occur while resolving the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid listen address '{value}': {source}")]
    InvalidListenAddr {
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("invalid endpoint port '{value}': {source}")]
    InvalidPort {
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid fetch timeout '{value}': must be a positive number of seconds")]
    InvalidTimeout { value: String },

    #[error("invalid endpoint URL '{value}': {source}")]
    InvalidEndpoint {
        value: String,
        source: url::ParseError,
    },
}

/// Runtime configuration for the exporter
///
/// Every field is overridable through an environment variable and has a
/// documented default:
///
/// | Variable | Default |
/// |---|---|
/// | `YARN_PROMETHEUS_LISTEN_ADDR` | `0.0.0.0:9113` |
/// | `YARN_PROMETHEUS_ENDPOINT_SCHEME` | `http` |
/// | `YARN_PROMETHEUS_ENDPOINT_HOST` | `localhost` |
/// | `YARN_PROMETHEUS_ENDPOINT_PORT` | `8088` |
/// | `YARN_CLUSTER_PROMETHEUS_ENDPOINT_PATH` | `ws/v1/cluster/metrics` |
/// | `YARN_APPS_PROMETHEUS_ENDPOINT_PATH` | `ws/v1/cluster/apps` |
/// | `YARN_SCHEDULER_PROMETHEUS_ENDPOINT_PATH` | `ws/v1/cluster/scheduler` |
/// | `YARN_PROMETHEUS_FETCH_TIMEOUT_SECS` | `10` |
/// | `YARN_PROMETHEUS_AUDIT_LOG_DIR` | `logs` |
///
/// A bare `:9113` listen address is accepted and binds all interfaces.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Address the /metrics server binds to
    pub listen_addr: SocketAddr,

    /// Scheme of the ResourceManager web UI (http or https)
    pub endpoint_scheme: String,

    /// Host of the ResourceManager web UI
    pub endpoint_host: String,

    /// Port of the ResourceManager web UI
    pub endpoint_port: u16,

    /// Path of the cluster metrics resource
    pub cluster_path: String,

    /// Path of the application list resource
    pub apps_path: String,

    /// Path of the scheduler queue resource
    pub scheduler_path: String,

    /// Upper bound for each upstream fetch
    pub fetch_timeout: Duration,

    /// Directory the audit log channel writes to
    pub audit_log_dir: PathBuf,
}

/// The three upstream endpoint URLs, validated at startup
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub cluster: Url,
    pub apps: Url,
    pub scheduler: Url,
}

impl ExporterConfig {
    /// Resolves the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration from an arbitrary variable lookup
    ///
    /// Separated from [`ExporterConfig::from_env`] so tests can feed
    /// variables without touching the process environment.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let listen_raw = get("YARN_PROMETHEUS_LISTEN_ADDR", "0.0.0.0:9113");
        let listen_addr = parse_listen_addr(&listen_raw)?;

        let port_raw = get("YARN_PROMETHEUS_ENDPOINT_PORT", "8088");
        let endpoint_port = port_raw
            .parse::<u16>()
            .map_err(|source| ConfigError::InvalidPort {
                value: port_raw.clone(),
                source,
            })?;

        let timeout_raw = get("YARN_PROMETHEUS_FETCH_TIMEOUT_SECS", "10");
        let timeout_secs = timeout_raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidTimeout { value: timeout_raw })?;

        Ok(ExporterConfig {
            listen_addr,
            endpoint_scheme: get("YARN_PROMETHEUS_ENDPOINT_SCHEME", "http"),
            endpoint_host: get("YARN_PROMETHEUS_ENDPOINT_HOST", "localhost"),
            endpoint_port,
            cluster_path: get(
                "YARN_CLUSTER_PROMETHEUS_ENDPOINT_PATH",
                "ws/v1/cluster/metrics",
            ),
            apps_path: get("YARN_APPS_PROMETHEUS_ENDPOINT_PATH", "ws/v1/cluster/apps"),
            scheduler_path: get(
                "YARN_SCHEDULER_PROMETHEUS_ENDPOINT_PATH",
                "ws/v1/cluster/scheduler",
            ),
            fetch_timeout: Duration::from_secs(timeout_secs),
            audit_log_dir: PathBuf::from(get("YARN_PROMETHEUS_AUDIT_LOG_DIR", "logs")),
        })
    }

    /// Builds and validates the three upstream endpoint URLs
    ///
    /// # Returns
    /// * `Ok(Endpoints)` - All three URLs parsed successfully
    /// * `Err(ConfigError)` - One of the URLs is unparsable (fatal at startup)
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        let endpoints = Endpoints {
            cluster: self.endpoint_url(&self.cluster_path)?,
            apps: self.endpoint_url(&self.apps_path)?,
            scheduler: self.endpoint_url(&self.scheduler_path)?,
        };

        info!("Cluster endpoint: {}", endpoints.cluster);
        info!("Applications endpoint: {}", endpoints.apps);
        info!("Scheduler endpoint: {}", endpoints.scheduler);

        Ok(endpoints)
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, ConfigError> {
        let raw = format!(
            "{}://{}:{}/{}",
            self.endpoint_scheme,
            self.endpoint_host,
            self.endpoint_port,
            path.trim_start_matches('/')
        );

        Url::parse(&raw).map_err(|source| ConfigError::InvalidEndpoint { value: raw, source })
    }
}

/// Parses the listen address, accepting the bare `:port` form
///
/// A bare `:9113` means "all interfaces"; deployments configured that way
/// keep working.
fn parse_listen_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    let normalized = if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_string()
    };

    normalized
        .parse::<SocketAddr>()
        .map_err(|source| ConfigError::InvalidListenAddr {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_env(_key: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::from_lookup(empty_env).unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9113".parse().unwrap());
        assert_eq!(config.endpoint_scheme, "http");
        assert_eq!(config.endpoint_host, "localhost");
        assert_eq!(config.endpoint_port, 8088);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));

        let endpoints = config.endpoints().unwrap();
        assert_eq!(
            endpoints.cluster.as_str(),
            "http://localhost:8088/ws/v1/cluster/metrics"
        );
        assert_eq!(
            endpoints.apps.as_str(),
            "http://localhost:8088/ws/v1/cluster/apps"
        );
        assert_eq!(
            endpoints.scheduler.as_str(),
            "http://localhost:8088/ws/v1/cluster/scheduler"
        );
    }

    #[test]
    fn test_overrides() {
        let config = ExporterConfig::from_lookup(|key| match key {
            "YARN_PROMETHEUS_LISTEN_ADDR" => Some("127.0.0.1:9999".to_string()),
            "YARN_PROMETHEUS_ENDPOINT_SCHEME" => Some("https".to_string()),
            "YARN_PROMETHEUS_ENDPOINT_HOST" => Some("rm.example.com".to_string()),
            "YARN_PROMETHEUS_ENDPOINT_PORT" => Some("8090".to_string()),
            "YARN_CLUSTER_PROMETHEUS_ENDPOINT_PATH" => Some("/custom/metrics".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9999".parse().unwrap());

        let endpoints = config.endpoints().unwrap();
        assert_eq!(
            endpoints.cluster.as_str(),
            "https://rm.example.com:8090/custom/metrics"
        );
    }

    #[test]
    fn test_bare_port_listen_addr() {
        let config = ExporterConfig::from_lookup(|key| match key {
            "YARN_PROMETHEUS_LISTEN_ADDR" => Some(":9113".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9113".parse().unwrap());
    }

    #[test]
    fn test_invalid_listen_addr_is_fatal() {
        let result = ExporterConfig::from_lookup(|key| match key {
            "YARN_PROMETHEUS_LISTEN_ADDR" => Some("not-an-address".to_string()),
            _ => None,
        });

        assert!(matches!(result, Err(ConfigError::InvalidListenAddr { .. })));
    }

    #[test]
    fn test_invalid_port_is_fatal() {
        let result = ExporterConfig::from_lookup(|key| match key {
            "YARN_PROMETHEUS_ENDPOINT_PORT" => Some("eighty".to_string()),
            _ => None,
        });

        assert!(matches!(result, Err(ConfigError::InvalidPort { .. })));
    }

    #[test]
    fn test_zero_timeout_is_fatal() {
        let result = ExporterConfig::from_lookup(|key| match key {
            "YARN_PROMETHEUS_FETCH_TIMEOUT_SECS" => Some("0".to_string()),
            _ => None,
        });

        assert!(matches!(result, Err(ConfigError::InvalidTimeout { .. })));
    }

    #[test]
    fn test_invalid_endpoint_url_is_fatal() {
        let config = ExporterConfig::from_lookup(|key| match key {
            "YARN_PROMETHEUS_ENDPOINT_HOST" => Some("bad host".to_string()),
            _ => None,
        })
        .unwrap();

        assert!(matches!(
            config.endpoints(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }
}
