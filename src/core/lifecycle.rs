//! # Worker lifecycle state machine shared by [`Supervisor`](super::Supervisor) and
//! [`EnableGate`](super::EnableGate).
//!
//! ```text
//!            ensure_started ok
//!   Stopped ──────────────────► Running
//!      ▲  │                       │
//!      │  │ ensure_started err    │ ensure_stopped
//!      │  ▼                       │
//!      │ Retrying ◄───────────────┘ (stop failed: Stopped, error reported)
//!      │  │
//!      └──┘ ensure_stopped (nothing to release)
//! ```
//!
//! ## Rules
//! - Transitions are serialized by an async mutex: a start and a stop never overlap.
//! - `ensure_started` on a running worker and `ensure_stopped` on a stopped worker
//!   are no-ops returning `Ok(false)`; neither calls the worker.
//! - A failed start calls `stop` (errors swallowed), logs at `error` and leaves the
//!   worker in `Retrying`; the caller decides when to try again.
//! - Each running period gets its own child token, cancelled before `stop` runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use super::runner::{start_once, stop_guarded, stop_quietly};
use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};
use crate::workers::WorkerRef;

/// Observable state of a supervised worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Not running and not waiting for a retry.
    Stopped,
    /// The last start failed; the next tick tries again.
    Retrying,
    /// Started successfully and not stopped since.
    Running,
}

struct Slot {
    state: WorkerState,
    run: Option<CancellationToken>,
}

pub(crate) struct Lifecycle {
    worker: WorkerRef,
    slot: Mutex<Slot>,
    state: watch::Sender<WorkerState>,
    bus: Bus,
    start_timeout: Option<Duration>,
    retry_interval: Duration,
    attempts: AtomicU32,
}

impl Lifecycle {
    pub(crate) fn new(
        worker: WorkerRef,
        bus: Bus,
        start_timeout: Option<Duration>,
        retry_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Stopped);
        Self {
            worker,
            slot: Mutex::new(Slot {
                state: WorkerState::Stopped,
                run: None,
            }),
            state,
            bus,
            start_timeout,
            retry_interval,
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.worker.name()
    }

    pub(crate) fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Starts the worker unless it is already running. `Ok(true)` when a start happened.
    pub(crate) async fn ensure_started(
        &self,
        parent: &CancellationToken,
    ) -> Result<bool, WorkerError> {
        let mut slot = self.slot.lock().await;
        if slot.state == WorkerState::Running {
            return Ok(false);
        }

        let name = self.worker.name();
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(worker = %name, attempt, "starting worker");
        self.bus.publish(
            Event::new(EventKind::WorkerStarting)
                .with_worker(name)
                .with_attempt(attempt),
        );

        let run = parent.child_token();
        match start_once(self.worker.as_ref(), run.clone(), self.start_timeout).await {
            Ok(()) => {
                slot.run = Some(run);
                self.set(&mut slot, WorkerState::Running);
                tracing::info!(worker = %name, attempt, "worker started");
                self.bus.publish(
                    Event::new(EventKind::WorkerStarted)
                        .with_worker(name)
                        .with_attempt(attempt),
                );
                Ok(true)
            }
            Err(WorkerError::Canceled) => {
                run.cancel();
                stop_quietly(self.worker.as_ref()).await;
                self.set(&mut slot, WorkerState::Stopped);
                tracing::debug!(worker = %name, "start interrupted by shutdown");
                Err(WorkerError::Canceled)
            }
            Err(err) => {
                run.cancel();
                stop_quietly(self.worker.as_ref()).await;
                self.set(&mut slot, WorkerState::Retrying);
                tracing::error!(
                    worker = %name,
                    attempt,
                    error = %err,
                    label = err.as_label(),
                    retry_in = ?self.retry_interval,
                    "worker crashed during start, stopped"
                );
                self.bus.publish(
                    Event::new(EventKind::WorkerFailed)
                        .with_worker(name)
                        .with_attempt(attempt)
                        .with_reason(err.to_string())
                        .with_delay(self.retry_interval),
                );
                Err(err)
            }
        }
    }

    /// Stops the worker if it is running. `Ok(true)` when a stop happened.
    ///
    /// A failed stop still leaves the worker `Stopped`: its resources were released
    /// on a best-effort basis and there is nothing left to retry.
    pub(crate) async fn ensure_stopped(&self) -> Result<bool, WorkerError> {
        let mut slot = self.slot.lock().await;
        match slot.state {
            WorkerState::Stopped => return Ok(false),
            WorkerState::Retrying => {
                self.set(&mut slot, WorkerState::Stopped);
                return Ok(false);
            }
            WorkerState::Running => {}
        }

        let name = self.worker.name();
        if let Some(run) = slot.run.take() {
            run.cancel();
        }
        let res = stop_guarded(self.worker.as_ref()).await;
        self.set(&mut slot, WorkerState::Stopped);

        match res {
            Ok(()) => {
                tracing::info!(worker = %name, "worker stopped");
                self.bus
                    .publish(Event::new(EventKind::WorkerStopped).with_worker(name));
                Ok(true)
            }
            Err(err) => {
                stop_quietly(self.worker.as_ref()).await;
                tracing::error!(worker = %name, error = %err, "worker crashed during stop");
                self.bus.publish(
                    Event::new(EventKind::StopFailed)
                        .with_worker(name)
                        .with_reason(err.to_string()),
                );
                Err(err)
            }
        }
    }

    fn set(&self, slot: &mut Slot, state: WorkerState) {
        slot.state = state;
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::workers::WorkerFn;

    struct Counted {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        life: Lifecycle,
    }

    fn counted(fail_first: usize) -> Counted {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let (s, t) = (starts.clone(), stops.clone());
        let worker = WorkerFn::arc(
            "aprs",
            move |_ctx: CancellationToken| {
                let n = s.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < fail_first {
                        Err(WorkerError::fail("connection refused"))
                    } else {
                        Ok(())
                    }
                }
            },
            move || {
                t.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        );
        Counted {
            starts,
            stops,
            life: Lifecycle::new(worker, Bus::new(32), None, Duration::from_secs(5)),
        }
    }

    #[tokio::test]
    async fn start_twice_starts_once() {
        let p = counted(0);
        let token = CancellationToken::new();

        assert!(p.life.ensure_started(&token).await.unwrap());
        assert!(!p.life.ensure_started(&token).await.unwrap());

        assert_eq!(p.starts.load(Ordering::SeqCst), 1);
        assert_eq!(p.life.state(), WorkerState::Running);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let p = counted(0);
        assert!(!p.life.ensure_stopped().await.unwrap());
        assert_eq!(p.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_start_stops_and_waits_for_retry() {
        let p = counted(1);
        let token = CancellationToken::new();
        let mut events = p.life.bus.subscribe();

        assert!(p.life.ensure_started(&token).await.is_err());
        assert_eq!(p.stops.load(Ordering::SeqCst), 1);
        assert_eq!(p.life.state(), WorkerState::Retrying);

        assert!(p.life.ensure_started(&token).await.unwrap());
        assert_eq!(p.life.attempts(), 2);

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            [
                EventKind::WorkerStarting,
                EventKind::WorkerFailed,
                EventKind::WorkerStarting,
                EventKind::WorkerStarted
            ]
        );
    }

    #[tokio::test]
    async fn stop_cancels_the_run_token() {
        let seen = Arc::new(parking_lot::Mutex::new(None::<CancellationToken>));
        let s = seen.clone();
        let worker = WorkerFn::arc(
            "mesh",
            move |ctx: CancellationToken| {
                *s.lock() = Some(ctx);
                async { Ok(()) }
            },
            || async { Ok(()) },
        );
        let life = Lifecycle::new(worker, Bus::new(8), None, Duration::from_secs(5));
        let parent = CancellationToken::new();

        life.ensure_started(&parent).await.unwrap();
        let run = seen.lock().clone().unwrap();
        assert!(!run.is_cancelled());

        assert!(life.ensure_stopped().await.unwrap());
        assert!(run.is_cancelled());
        assert!(!parent.is_cancelled());
        assert_eq!(life.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn failed_stop_reports_and_settles_stopped() {
        let stops = Arc::new(AtomicUsize::new(0));
        let t = stops.clone();
        let worker = WorkerFn::arc(
            "camera",
            |_ctx: CancellationToken| async { Ok(()) },
            move || {
                t.fetch_add(1, Ordering::SeqCst);
                async { Err(WorkerError::fail("device busy")) }
            },
        );
        let life = Lifecycle::new(worker, Bus::new(8), None, Duration::from_secs(5));
        life.ensure_started(&CancellationToken::new()).await.unwrap();

        assert!(life.ensure_stopped().await.is_err());
        assert_eq!(stops.load(Ordering::SeqCst), 2);
        assert_eq!(life.state(), WorkerState::Stopped);
    }
}
