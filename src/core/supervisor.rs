//! # Supervisor: keeps one worker started, retrying after crashes.
//!
//! ```text
//!   run(token)
//!     interval(retry_interval), first tick immediately
//!     loop {
//!       ├─► token cancelled → return (the station stops the worker)
//!       └─► tick:
//!             state == Running → nothing to do
//!             otherwise        → ensure_started()
//!                                  ├─ Ok  → Running
//!                                  └─ Err → stop (quiet), log error, Retrying
//!     }
//! ```
//!
//! ## Rules
//! - The tick keeps running while the worker runs; the state check suppresses re-entry.
//! - A caught failure never ends the loop and never reaches the caller.
//! - [`Supervisor::shutdown`] stops the worker once if it is running.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use stationkit::{Bus, SupervisionConfig, Supervisor, WorkerError, WorkerFn, WorkerState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let worker = WorkerFn::arc(
//!     "aprs",
//!     |_ctx: CancellationToken| async { Ok::<_, WorkerError>(()) },
//!     || async { Ok::<_, WorkerError>(()) },
//! );
//! let sup = Supervisor::new(worker, &SupervisionConfig::default(), Bus::default());
//!
//! let token = CancellationToken::new();
//! let driver = tokio::spawn({
//!     let sup = sup.clone();
//!     let token = token.clone();
//!     async move { sup.run(token).await }
//! });
//!
//! let mut state = sup.watch_state();
//! state.wait_for(|s| *s == WorkerState::Running).await.unwrap();
//!
//! token.cancel();
//! driver.await.unwrap();
//! sup.shutdown().await.unwrap();
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::lifecycle::{Lifecycle, WorkerState};
use crate::config::SupervisionConfig;
use crate::error::WorkerError;
use crate::events::Bus;
use crate::workers::WorkerRef;

/// Retry-on-crash wrapper around one worker. Cheap to clone.
#[derive(Clone)]
pub struct Supervisor {
    life: Arc<Lifecycle>,
    retry_interval: Duration,
}

impl Supervisor {
    /// Creates a supervisor; nothing starts until [`Supervisor::run`] or [`Supervisor::start`].
    pub fn new(worker: WorkerRef, cfg: &SupervisionConfig, bus: Bus) -> Self {
        Self {
            life: Arc::new(Lifecycle::new(
                worker,
                bus,
                cfg.start_timeout(),
                cfg.retry_interval,
            )),
            retry_interval: cfg.retry_interval,
        }
    }

    /// Supervised worker's name.
    pub fn name(&self) -> &str {
        self.life.name()
    }

    /// Current worker state.
    pub fn state(&self) -> WorkerState {
        self.life.state()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.life.watch()
    }

    /// Number of start attempts so far.
    pub fn attempts(&self) -> u32 {
        self.life.attempts()
    }

    /// Starts the worker now unless it is running. `Ok(true)` when a start happened.
    pub async fn start(&self, token: &CancellationToken) -> Result<bool, WorkerError> {
        self.life.ensure_started(token).await
    }

    /// Stops the worker now if it is running. `Ok(true)` when a stop happened.
    ///
    /// While [`Supervisor::run`] is active the next tick starts the worker again.
    pub async fn stop(&self) -> Result<bool, WorkerError> {
        self.life.ensure_stopped().await
    }

    /// Drives the retry tick until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let mut tick = time::interval(self.retry_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    if self.life.state() != WorkerState::Running {
                        // failures are logged and published by the lifecycle
                        let _ = self.life.ensure_started(&token).await;
                    }
                }
            }
        }
    }

    /// Stops the worker once if it is running.
    pub async fn shutdown(&self) -> Result<bool, WorkerError> {
        self.life.ensure_stopped().await
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("worker", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::workers::WorkerFn;

    fn flaky(fail_first: usize, starts: Arc<AtomicUsize>, stops: Arc<AtomicUsize>) -> WorkerRef {
        WorkerFn::arc(
            "meshtastic",
            move |_ctx: CancellationToken| {
                let n = starts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < fail_first {
                        Err(WorkerError::fail("radio not responding"))
                    } else {
                        Ok(())
                    }
                }
            },
            move || {
                stops.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_on_each_tick_until_started() {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let sup = Supervisor::new(
            flaky(2, starts.clone(), stops.clone()),
            &SupervisionConfig::default(),
            Bus::new(16),
        );
        let token = CancellationToken::new();
        let driver = tokio::spawn({
            let (sup, token) = (sup.clone(), token.clone());
            async move { sup.run(token).await }
        });

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(sup.state(), WorkerState::Retrying);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 2);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 3);
        assert_eq!(sup.state(), WorkerState::Running);
        assert_eq!(stops.load(Ordering::SeqCst), 2);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 3, "running worker is not restarted");

        token.cancel();
        driver.await.unwrap();
        assert!(sup.shutdown().await.unwrap());
        assert!(!sup.shutdown().await.unwrap());
        assert_eq!(stops.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn explicit_start_and_stop() {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let sup = Supervisor::new(
            flaky(0, starts.clone(), stops.clone()),
            &SupervisionConfig::default(),
            Bus::new(16),
        );
        let token = CancellationToken::new();

        assert!(!sup.stop().await.unwrap());
        assert!(sup.start(&token).await.unwrap());
        assert!(!sup.start(&token).await.unwrap());
        assert!(sup.stop().await.unwrap());

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(sup.name(), "meshtastic");
    }
}
