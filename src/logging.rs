//! # Tracing setup for the station process.
//!
//! Components log through `tracing` macros with structured fields (`entity`,
//! `worker`, `error`). This module installs the process-wide subscriber.
//!
//! ## Filter resolution
//! 1. `STATION_LOG` environment variable (e.g. `debug,stationkit::registry=trace`)
//! 2. `RUST_LOG`
//! 3. [`LoggingConfig::filter`]

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};

const LOG_ENV: &str = "STATION_LOG";

/// Installs the global tracing subscriber.
///
/// Returns `false` when a global subscriber was already installed (the call is then a no-op).
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = resolve_filter(config);

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().with_target(true).json().boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(format = ?config.format, "tracing initialised");
    }
    installed
}

fn resolve_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(directive) = std::env::var(LOG_ENV) {
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("invalid {LOG_ENV} directive ({err}); ignoring"),
        }
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
