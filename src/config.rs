//! # Station configuration.
//!
//! Provides [`StationConfig`] centralized settings for the station runtime.
//!
//! Config is used in three places:
//! 1. **Registry**: topic base, client id, ack timeout and reconnect backoff ([`RegistryConfig`]).
//! 2. **Supervision**: retry tick and start timeout for workers and gates ([`SupervisionConfig`]).
//! 3. **Station**: event bus capacity, shutdown grace, store location, broker address
//!    ([`BrokerConfig`]) and logging.
//!
//! ## TOML layout
//! ```toml
//! grace_ms = 30000
//! bus_capacity = 1024
//!
//! [registry]
//! topic_base = "station"
//! client_id = "station"
//! ack_timeout_ms = 5000
//! reconnect_backoff_ms = 60000
//!
//! [broker]
//! host = "localhost"       # unset = no broker
//! port = 1883
//! keep_alive_ms = 30000
//!
//! [supervision]
//! retry_interval_ms = 5000
//! start_timeout_ms = 0      # 0 = no timeout
//!
//! [store]
//! path = "/var/lib/station/station.db"
//!
//! [logging]
//! filter = "info"
//! format = "pretty"
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for the station runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Maximum time to wait for workers to stop during shutdown.
    #[serde(rename = "grace_ms", with = "millis")]
    pub grace: Duration,

    /// Capacity of the runtime event bus ring buffer (min 1).
    pub bus_capacity: usize,

    /// Entity registry settings.
    pub registry: RegistryConfig,

    /// Supervisor and enable-gate settings.
    pub supervision: SupervisionConfig,

    /// Persistent store settings.
    pub store: StoreConfig,

    /// MQTT broker address.
    pub broker: BrokerConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl StationConfig {
    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parses a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            registry: RegistryConfig::default(),
            supervision: SupervisionConfig::default(),
            store: StoreConfig::default(),
            broker: BrokerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Entity registry settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Topic prefix; entity `gpio/wifi` maps to `{topic_base}/gpio/wifi`.
    pub topic_base: String,

    /// Client identifier presented to the broker.
    pub client_id: String,

    /// How long an ack-required change may stay pending before it is dropped.
    #[serde(rename = "ack_timeout_ms", with = "millis")]
    pub ack_timeout: Duration,

    /// Wait between a broker disconnect (or failed connect) and the next attempt.
    #[serde(rename = "reconnect_backoff_ms", with = "millis")]
    pub reconnect_backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            topic_base: "station".to_string(),
            client_id: "station".to_string(),
            ack_timeout: Duration::from_secs(5),
            reconnect_backoff: Duration::from_secs(60),
        }
    }
}

/// Supervisor and enable-gate settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    /// Period of the supervision tick (retry after crash, enable reconciliation).
    #[serde(rename = "retry_interval_ms", with = "millis")]
    pub retry_interval: Duration,

    /// Upper bound for one `start` call; `0` disables the bound.
    #[serde(rename = "start_timeout_ms", with = "millis")]
    pub start_timeout: Duration,
}

impl SupervisionConfig {
    /// Returns the start timeout as an `Option` (`0` → `None`).
    #[inline]
    pub fn start_timeout(&self) -> Option<Duration> {
        if self.start_timeout == Duration::ZERO {
            None
        } else {
            Some(self.start_timeout)
        }
    }
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            start_timeout: Duration::ZERO,
        }
    }
}

/// Persistent store settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. `None` keeps the store in memory.
    pub path: Option<PathBuf>,
}

/// MQTT broker address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host. `None` keeps entities local unless a broker is given to the builder.
    pub host: Option<String>,
    pub port: u16,
    #[serde(rename = "keep_alive_ms", with = "millis")]
    pub keep_alive: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 1883,
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Output format of the log layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when no environment override is set.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Serde adapter storing a [`Duration`] as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        s.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = StationConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, StationConfig::default());
        assert_eq!(cfg.registry.ack_timeout, Duration::from_secs(5));
        assert_eq!(cfg.registry.reconnect_backoff, Duration::from_secs(60));
        assert_eq!(cfg.supervision.retry_interval, Duration::from_secs(5));
        assert!(cfg.supervision.start_timeout().is_none());
        assert_eq!(cfg.broker.host, None);
        assert_eq!(cfg.broker.port, 1883);
    }

    #[test]
    fn broker_section_sets_address() {
        let cfg = StationConfig::from_toml_str(
            r#"
            [registry]
            client_id = "f4abc-10"

            [broker]
            host = "192.168.1.20"
            keep_alive_ms = 15000
            "#,
        )
        .unwrap();

        assert_eq!(cfg.broker.host.as_deref(), Some("192.168.1.20"));
        assert_eq!(cfg.broker.port, 1883);
        assert_eq!(cfg.broker.keep_alive, Duration::from_secs(15));
        assert_eq!(cfg.registry.client_id, "f4abc-10");
    }

    #[test]
    fn partial_document_overrides_only_given_keys() {
        let cfg = StationConfig::from_toml_str(
            r#"
            grace_ms = 1500

            [registry]
            topic_base = "f4abc"
            ack_timeout_ms = 250

            [supervision]
            start_timeout_ms = 2000

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.grace, Duration::from_millis(1500));
        assert_eq!(cfg.registry.topic_base, "f4abc");
        assert_eq!(cfg.registry.ack_timeout, Duration::from_millis(250));
        assert_eq!(cfg.registry.client_id, "station");
        assert_eq!(
            cfg.supervision.start_timeout(),
            Some(Duration::from_secs(2))
        );
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(cfg.store.path.is_none());
    }

    #[test]
    fn invalid_document_is_a_parse_error() {
        let err = StationConfig::from_toml_str("grace_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.toml");
        std::fs::write(&path, "[store]\npath = \"/tmp/station.db\"\n").unwrap();

        let cfg = StationConfig::from_file(&path).unwrap();
        assert_eq!(cfg.store.path, Some(PathBuf::from("/tmp/station.db")));
    }
}
