//! # Supervised unit of work.
//!
//! A [`Worker`] is a long-running protocol handler (APRS-IS client, mesh radio BBS,
//! camera capture, serial ingestion) seen only through its lifecycle hooks. The common
//! handle type is [`WorkerRef`], an `Arc<dyn Worker>`.
//!
//! ## Contract
//! - `start` may block on I/O (open a serial port, connect a client, register
//!   entity subscriptions). It must be retryable: after a failed `start` the
//!   supervisor calls `stop` and tries again on a later tick.
//! - `stop` releases everything `start` acquired and is idempotent. Individual
//!   release failures are tolerated (see [`Resources`](crate::Resources)).
//! - The token passed to `start` is cancelled when the worker is stopped or the
//!   station shuts down; loops spawned by `start` should exit on it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;

/// # Start/stop strategy supervised by a [`Supervisor`](crate::Supervisor) or
/// [`EnableGate`](crate::EnableGate).
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use stationkit::{Worker, WorkerError};
///
/// struct Beacon;
///
/// #[async_trait]
/// impl Worker for Beacon {
///     fn name(&self) -> &str { "beacon" }
///
///     async fn start(&self, ctx: CancellationToken) -> Result<(), WorkerError> {
///         tokio::spawn(async move {
///             ctx.cancelled().await;
///         });
///         Ok(())
///     }
///
///     async fn stop(&self) -> Result<(), WorkerError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Returns a stable, human-readable worker name.
    fn name(&self) -> &str;

    /// Acquires the worker's resources and starts its background activity.
    async fn start(&self, ctx: CancellationToken) -> Result<(), WorkerError>;

    /// Releases everything acquired by `start`. Must be idempotent.
    async fn stop(&self) -> Result<(), WorkerError>;
}

/// Shared handle to a worker.
pub type WorkerRef = Arc<dyn Worker>;
