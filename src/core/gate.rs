//! # EnableGate: runs a worker only while its boolean entity says so.
//!
//! Each gate owns a persisted `Entity<bool>` named `worker/{name}` and reconciles the
//! worker's state against it whenever the entity changes and on every tick.
//!
//! ```text
//!   enabled.changes(only if different) ──┐
//!                                        ├──► reconcile()
//!   interval(retry_interval) ────────────┘       │
//!                                                ├─ enabled  & !Running → ensure_started
//!                                                ├─ !enabled & Running  → ensure_stopped
//!                                                └─ otherwise           → no-op
//! ```
//!
//! ## Rules
//! - Reconciliation never starts or stops twice for the same desired state.
//! - A failed start follows the supervisor failure path (quiet stop, error log,
//!   `Retrying`); the next tick tries again while the entity stays enabled.
//! - A failed stop is logged and reported; the worker is considered stopped.
//! - The entity is restored from the store on registration, so the last enabled state
//!   survives a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::lifecycle::{Lifecycle, WorkerState};
use crate::config::SupervisionConfig;
use crate::entity::{Entity, EntityRef};
use crate::error::{RegistryError, WorkerError};
use crate::events::Bus;
use crate::registry::Registry;
use crate::workers::WorkerRef;

/// Id of the enable entity for a worker named `name`.
///
/// The name is lowercased and a trailing `app` suffix (with its separator) is dropped:
///
/// ```
/// use stationkit::enable_entity_id;
///
/// assert_eq!(enable_entity_id("AprsApp"), "worker/aprs");
/// assert_eq!(enable_entity_id("meshtastic_app"), "worker/meshtastic");
/// assert_eq!(enable_entity_id("camera"), "worker/camera");
/// ```
pub fn enable_entity_id(name: &str) -> String {
    let lower = name.to_lowercase();
    let stem = lower
        .strip_suffix("app")
        .map(|s| s.trim_end_matches(['_', '-', '.']))
        .filter(|s| !s.is_empty())
        .unwrap_or(lower.as_str());
    format!("worker/{stem}")
}

/// Enable/disable supervision of one worker. Cheap to clone.
#[derive(Clone)]
pub struct EnableGate {
    life: Arc<Lifecycle>,
    enabled: EntityRef<bool>,
    retry_interval: Duration,
}

impl EnableGate {
    /// Creates the gate and registers its enable entity with `registry`.
    pub async fn new(
        worker: WorkerRef,
        default_enabled: bool,
        registry: &Registry,
        cfg: &SupervisionConfig,
        bus: Bus,
    ) -> Result<Self, RegistryError> {
        let enabled = Entity::new(enable_entity_id(worker.name()), default_enabled)
            .persist()
            .publish()
            .into_ref();
        registry.register(&enabled).await?;

        Ok(Self {
            life: Arc::new(Lifecycle::new(
                worker,
                bus,
                cfg.start_timeout(),
                cfg.retry_interval,
            )),
            enabled,
            retry_interval: cfg.retry_interval,
        })
    }

    /// Gated worker's name.
    pub fn name(&self) -> &str {
        self.life.name()
    }

    /// The enable entity.
    pub fn enabled(&self) -> &EntityRef<bool> {
        &self.enabled
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

    /// One reconciliation step between the enable entity and the worker state.
    pub async fn reconcile(&self, token: &CancellationToken) -> Result<(), WorkerError> {
        let desired = self.enabled.get();
        match (desired, self.life.state()) {
            (true, WorkerState::Running) => Ok(()),
            (true, _) => self.life.ensure_started(token).await.map(drop),
            (false, WorkerState::Stopped) => Ok(()),
            (false, _) => self.life.ensure_stopped().await.map(drop),
        }
    }

    /// Drives reconciliation until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let mut changes = self.enabled.changes(true);
        let mut tick = time::interval(self.retry_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {}
                ev = changes.recv() => match ev {
                    Some(ev) => tracing::debug!(worker = %self.name(), enabled = ev.value, "enable state changed"),
                    None => break,
                },
            }
            // failures are logged and published by the lifecycle
            let _ = self.reconcile(&token).await;
        }
    }

    /// Stops the worker once if it is running.
    pub async fn shutdown(&self) -> Result<bool, WorkerError> {
        self.life.ensure_stopped().await
    }
}

impl std::fmt::Debug for EnableGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnableGate")
            .field("worker", &self.name())
            .field("enabled", &self.enabled.get())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::RegistryConfig;
    use crate::store::{MemoryStore, Store};
    use crate::workers::WorkerFn;

    struct Counts {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    fn counted(name: &'static str, fail_first: usize) -> (WorkerRef, Counts) {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let (s, t) = (starts.clone(), stops.clone());
        let worker: WorkerRef = WorkerFn::arc(
            name,
            move |_ctx: CancellationToken| {
                let n = s.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < fail_first {
                        Err(WorkerError::fail("tnc offline"))
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
        (worker, Counts { starts, stops })
    }

    fn registry(store: MemoryStore) -> (Arc<Registry>, Arc<MemoryStore>) {
        let store = Arc::new(store);
        let registry = Registry::new(RegistryConfig::default(), store.clone(), None, Bus::new(16));
        (registry, store)
    }

    #[tokio::test(start_paused = true)]
    async fn registers_persisted_enable_entity() {
        let (registry, store) = registry(MemoryStore::new());
        let (worker, _) = counted("AprsApp", 0);

        let gate = EnableGate::new(worker, true, &registry, &SupervisionConfig::default(), Bus::new(8))
            .await
            .unwrap();

        assert_eq!(gate.enabled().id(), "worker/aprs");
        assert!(gate.enabled().flags().persist);
        assert_eq!(
            store.get_by_name("worker/aprs").await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stored_enable_state_overrides_default() {
        let (registry, _) = registry(MemoryStore::with_rows([("worker/camera", "false")]));
        let (worker, counts) = counted("camera", 0);
        let gate = EnableGate::new(worker, true, &registry, &SupervisionConfig::default(), Bus::new(8))
            .await
            .unwrap();

        gate.reconcile(&CancellationToken::new()).await.unwrap();

        assert!(!gate.enabled().get());
        assert_eq!(counts.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_is_retried_on_next_tick_while_enabled() {
        let (registry, _) = registry(MemoryStore::new());
        let (worker, counts) = counted("meshtastic", 1);
        let gate = EnableGate::new(worker, true, &registry, &SupervisionConfig::default(), Bus::new(8))
            .await
            .unwrap();
        let token = CancellationToken::new();
        let driver = tokio::spawn({
            let (gate, token) = (gate.clone(), token.clone());
            async move { gate.run(token).await }
        });

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(gate.state(), WorkerState::Retrying);
        assert_eq!(counts.stops.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(gate.state(), WorkerState::Running);
        assert_eq!(counts.starts.load(Ordering::SeqCst), 2);

        token.cancel();
        driver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_a_retrying_worker_settles_stopped() {
        let (registry, _) = registry(MemoryStore::new());
        let (worker, counts) = counted("camera", usize::MAX);
        let gate = EnableGate::new(worker, true, &registry, &SupervisionConfig::default(), Bus::new(8))
            .await
            .unwrap();
        let token = CancellationToken::new();

        assert!(gate.reconcile(&token).await.is_err());
        assert_eq!(gate.state(), WorkerState::Retrying);

        gate.enabled().request_change(false);
        gate.reconcile(&token).await.unwrap();

        assert_eq!(gate.state(), WorkerState::Stopped);
        assert_eq!(counts.stops.load(Ordering::SeqCst), 1);
    }
}
