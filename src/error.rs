//! Error types used by the station runtime, its workers, and its collaborators.
//!
//! - [`WorkerError`]: raised by a worker's `start`/`stop`.
//! - [`StoreError`]: raised by persistent store backends.
//! - [`BrokerError`]: raised by broker transports.
//! - [`RegistryError`]: raised while registering entities.
//! - [`ConfigError`]: raised while loading configuration.
//! - [`RuntimeError`]: raised by the station itself during shutdown.
//!
//! Each enum exposes `as_label()` returning a short stable snake_case label for logs.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the station runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some workers did not stop in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the workers still running when the grace expired.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use stationkit::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # Errors produced by a worker's lifecycle hooks.
///
/// A failed `start` leaves the worker eligible for the next supervision tick.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Start or stop failed (serial port busy, client refused, ...).
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Start exceeded the configured start timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The hook panicked; the panic was caught at the supervision boundary.
    #[error("panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// Start was interrupted because the station is shutting down.
    #[error("context cancelled")]
    Canceled,
}

impl WorkerError {
    /// Shorthand for [`WorkerError::Fail`] from anything displayable.
    ///
    /// ```
    /// use stationkit::WorkerError;
    ///
    /// let err = WorkerError::fail("port /dev/ttyUSB0 busy");
    /// assert_eq!(err.to_string(), "execution failed: port /dev/ttyUSB0 busy");
    /// ```
    pub fn fail(error: impl std::fmt::Display) -> Self {
        WorkerError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Fail { .. } => "worker_failed",
            WorkerError::Timeout { .. } => "worker_timeout",
            WorkerError::Panicked { .. } => "worker_panicked",
            WorkerError::Canceled => "worker_canceled",
        }
    }
}

/// # Errors produced by persistent store backends.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// No row exists for the name.
    #[error("no row named {name:?}")]
    NotFound {
        /// Row key.
        name: String,
    },

    /// A row already exists for the name.
    #[error("row {name:?} already exists")]
    Duplicate {
        /// Row key.
        name: String,
    },

    /// Backend failure that is not tied to a specific driver.
    #[error("store backend: {reason}")]
    Backend {
        /// Failure description.
        reason: String,
    },

    /// SQLite driver failure.
    #[cfg(feature = "sqlite")]
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "store_not_found",
            StoreError::Duplicate { .. } => "store_duplicate",
            StoreError::Backend { .. } => "store_backend",
            #[cfg(feature = "sqlite")]
            StoreError::Sqlite(_) => "store_sqlite",
        }
    }
}

/// # Errors produced by broker transports.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The operation needs a live session.
    #[error("not connected")]
    NotConnected,

    /// The broker refused the connection.
    #[error("connection refused: {reason}")]
    Refused {
        /// Reason reported by the broker.
        reason: String,
    },

    /// The session closed while the operation was in flight.
    #[error("session closed")]
    Closed,
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::NotConnected => "broker_not_connected",
            BrokerError::Refused { .. } => "broker_refused",
            BrokerError::Closed => "broker_closed",
        }
    }
}

/// # Errors produced while registering entities.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegistryError {
    /// An entity with the same id is already registered.
    #[error("entity {id:?} is already registered")]
    DuplicateEntity {
        /// Entity id.
        id: String,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::DuplicateEntity { .. } => "registry_duplicate_entity",
        }
    }
}

/// # Errors produced while loading configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`StationConfig`](crate::StationConfig).
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => "config_io",
            ConfigError::Parse(_) => "config_parse",
        }
    }
}
