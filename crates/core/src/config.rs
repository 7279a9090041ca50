//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::errors::{ConfigError, ConfigResult};

pub const DEFAULT_SOURCE_URL: &str = "https://api.coindesk.com/v1/bpi/currentprice.json";
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
const ENV_PREFIX: &str = "PRICECAST";
const DEFAULT_CONFIG_FILE: &str = "pricecast";

/// Complete service configuration, loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub fetch_interval_secs: u64,
    /// WebSocket listen address
    pub listen: String,
    pub grpc_listen: String,
    pub grpc_enabled: bool,
    pub store_uri: String,
    pub db_name: String,
    pub queue_capacity: usize,
    pub source_url: String,
    pub source_timeout_ms: u64,
    pub log_level: String,
    pub log_json: bool,
    pub stats_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fetch_interval_secs: 5,
            listen: "0.0.0.0:8080".to_string(),
            grpc_listen: "0.0.0.0:50051".to_string(),
            grpc_enabled: true,
            store_uri: "memory://".to_string(),
            db_name: "pricefetcher".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            source_url: DEFAULT_SOURCE_URL.to_string(),
            source_timeout_ms: 2000,
            log_level: "info".to_string(),
            log_json: false,
            stats_interval_secs: 60,
        }
    }
}

impl ServiceConfig {
    /// Load from `pricecast.toml` (or `$PRICECAST_CONFIG`) and `PRICECAST_*`
    /// environment variables, in that order of precedence
    pub fn load() -> ConfigResult<Self> {
        let file = std::env::var(format!("{ENV_PREFIX}_CONFIG"))
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_sources(Some(&file), None)
    }

    /// Load from an optional file and an explicit variable map (or the
    /// process environment when `env` is `None`)
    pub fn from_sources(
        file: Option<&str>,
        env: Option<HashMap<String, String>>,
    ) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(file) = file {
            builder = builder.add_source(config::File::with_name(file).required(false));
        }

        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(env.map(|vars| vars.into_iter().collect()));

        let cfg: ServiceConfig = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.fetch_interval_secs == 0 {
            return Err(ConfigError::Invalid("fetch_interval_secs must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0".into()));
        }
        if self.source_timeout_ms == 0 {
            return Err(ConfigError::Invalid("source_timeout_ms must be > 0".into()));
        }
        self.listen_addr()?;
        self.grpc_addr()?;
        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }

    pub fn listen_addr(&self) -> ConfigResult<SocketAddr> {
        parse_addr("listen", &self.listen)
    }

    pub fn grpc_addr(&self) -> ConfigResult<SocketAddr> {
        parse_addr("grpc_listen", &self.grpc_listen)
    }
}

fn parse_addr(field: &str, value: &str) -> ConfigResult<SocketAddr> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{field} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let cfg = ServiceConfig::from_sources(None, env(&[])).unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.fetch_interval(), Duration::from_secs(5));
        assert_eq!(cfg.source_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.queue_capacity, 100);
    }

    #[test]
    fn test_env_overrides() {
        let cfg = ServiceConfig::from_sources(
            None,
            env(&[
                ("PRICECAST_FETCH_INTERVAL_SECS", "1"),
                ("PRICECAST_LISTEN", "127.0.0.1:9000"),
                ("PRICECAST_GRPC_ENABLED", "false"),
                ("PRICECAST_DB_NAME", "history"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.fetch_interval(), Duration::from_secs(1));
        assert_eq!(cfg.listen_addr().unwrap().port(), 9000);
        assert!(!cfg.grpc_enabled);
        assert_eq!(cfg.db_name, "history");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = ServiceConfig::from_sources(None, env(&[("PRICECAST_FETCH_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_listen_rejected() {
        let cfg = ServiceConfig {
            listen: "not-an-address".to_string(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
