//! # Station: the process-wide context.
//!
//! One [`Station`] is built at process start and passed by reference to every
//! component. It owns the runtime event bus, the subscriber set, the entity registry
//! and every supervised unit, and tears them down explicitly on shutdown.
//!
//! ## Architecture
//! ```text
//! StationBuilder::build()
//!   ├─► Bus ──► listener ──► SubscriberSet::emit
//!   └─► Registry (store, broker)
//!
//! station.register(entity)       ──► Registry::register
//! station.supervise(worker)      ──► Supervisor   ┐
//! station.gate(worker, default)  ──► EnableGate   ┴─► units
//!
//! start():  Registry::start (broker loop), one driver task per unit
//! run():    start() ─► wait for SIGINT/SIGTERM/SIGQUIT or request_shutdown() ─► shutdown()
//!
//! shutdown():
//!   publish ShutdownRequested ─► cancel drivers
//!   within grace: join drivers, stop every running unit
//!     ├─ Ok      → AllStoppedWithin
//!     └─ timeout → GraceExceeded, Err(RuntimeError::GraceExceeded{stuck})
//!   Registry::shutdown (tasks, broker session) ─► drain subscribers
//! ```
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use stationkit::{Entity, Station, StationConfig, WorkerError, WorkerFn};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let station = Station::builder(StationConfig::default()).build()?;
//!
//! let wifi = Entity::new("gpio/wifi", false).persist().publish().require_ack().into_ref();
//! station.register(&wifi).await?;
//!
//! let beacon = WorkerFn::arc(
//!     "beacon",
//!     |_ctx: CancellationToken| async { Ok::<_, WorkerError>(()) },
//!     || async { Ok::<_, WorkerError>(()) },
//! );
//! station.gate(beacon, false).await?;
//!
//! station.start();
//! station.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::builder::StationBuilder;
use super::gate::EnableGate;
use super::lifecycle::WorkerState;
use super::shutdown;
use super::supervisor::Supervisor;
use crate::config::StationConfig;
use crate::entity::{EntityRef, EntityValue};
use crate::error::{RegistryError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::registry::Registry;
use crate::subscribers::SubscriberSet;
use crate::workers::WorkerRef;

#[derive(Clone)]
enum Unit {
    Supervised(Supervisor),
    Gated(EnableGate),
}

impl Unit {
    fn name(&self) -> &str {
        match self {
            Unit::Supervised(s) => s.name(),
            Unit::Gated(g) => g.name(),
        }
    }

    fn state(&self) -> WorkerState {
        match self {
            Unit::Supervised(s) => s.state(),
            Unit::Gated(g) => g.state(),
        }
    }

    async fn drive(self, token: CancellationToken) {
        match self {
            Unit::Supervised(s) => s.run(token).await,
            Unit::Gated(g) => g.run(token).await,
        }
    }

    async fn stop(&self) {
        // failures are logged and published by the lifecycle
        let _ = match self {
            Unit::Supervised(s) => s.shutdown().await,
            Unit::Gated(g) => g.shutdown().await,
        };
    }
}

/// Process-wide station context.
pub struct Station {
    cfg: StationConfig,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    registry: Arc<Registry>,
    units: Mutex<Vec<Unit>>,
    token: CancellationToken,
    listener_token: CancellationToken,
    drivers: Mutex<JoinSet<()>>,
    listener: Mutex<Option<tokio::task::JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Station {
    /// Starts building a station.
    pub fn builder(cfg: StationConfig) -> StationBuilder {
        StationBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: StationConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        registry: Arc<Registry>,
    ) -> Arc<Self> {
        let station = Arc::new(Self {
            cfg,
            bus,
            subs,
            registry,
            units: Mutex::new(Vec::new()),
            token: CancellationToken::new(),
            listener_token: CancellationToken::new(),
            drivers: Mutex::new(JoinSet::new()),
            listener: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });
        station.subscriber_listener();
        station
    }

    /// Station configuration.
    pub fn config(&self) -> &StationConfig {
        &self.cfg
    }

    /// Runtime event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Entity registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registers an entity with the registry.
    pub async fn register<T: EntityValue>(&self, entity: &EntityRef<T>) -> Result<(), RegistryError> {
        self.registry.register(entity).await
    }

    /// Supervises `worker` with retry-on-crash; it starts on the first tick after
    /// [`Station::start`].
    pub fn supervise(&self, worker: WorkerRef) -> Supervisor {
        let sup = Supervisor::new(worker, &self.cfg.supervision, self.bus.clone());
        self.add_unit(Unit::Supervised(sup.clone()));
        sup
    }

    /// Gates `worker` behind a persisted `worker/{name}` boolean entity.
    pub async fn gate(
        &self,
        worker: WorkerRef,
        default_enabled: bool,
    ) -> Result<EnableGate, RegistryError> {
        let gate = EnableGate::new(
            worker,
            default_enabled,
            &self.registry,
            &self.cfg.supervision,
            self.bus.clone(),
        )
        .await?;
        self.add_unit(Unit::Gated(gate.clone()));
        Ok(gate)
    }

    /// Connects the registry to the broker and starts driving every unit.
    ///
    /// Units added afterwards are driven as soon as they are added.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.start();
        let units = self.units.lock().clone();
        tracing::info!(units = units.len(), "station started");
        for unit in units {
            self.spawn_driver(unit);
        }
    }

    /// Starts the station and runs until a termination signal or
    /// [`Station::request_shutdown`], then shuts down.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        self.start();
        tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => match res {
                Ok(signal) => tracing::info!(signal, "termination signal received"),
                Err(err) => {
                    tracing::error!(error = %err, "cannot listen for termination signals");
                    self.token.cancelled().await;
                }
            },
            _ = self.token.cancelled() => {}
        }
        self.shutdown().await
    }

    /// Makes a pending [`Station::run`] return through shutdown.
    pub fn request_shutdown(&self) {
        self.token.cancel();
    }

    /// Names of the workers currently running.
    pub fn running_workers(&self) -> Vec<String> {
        self.units
            .lock()
            .iter()
            .filter(|u| u.state() == WorkerState::Running)
            .map(|u| u.name().to_string())
            .collect()
    }

    /// Stops every unit within the configured grace, then the registry and the
    /// subscribers. Only the first call does anything.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(grace = ?self.cfg.grace, "station shutting down");
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.token.cancel();

        let grace = self.cfg.grace;
        let mut drivers = std::mem::take(&mut *self.drivers.lock());
        let units = self.units.lock().clone();
        let stop_all = async {
            while drivers.join_next().await.is_some() {}
            futures::future::join_all(units.iter().map(|u| u.stop())).await;
        };

        let res = match tokio::time::timeout(grace, stop_all).await {
            Ok(()) => {
                tracing::info!("all workers stopped within grace");
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck = self.running_workers();
                tracing::error!(?grace, ?stuck, "shutdown grace exceeded");
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        };

        self.registry.shutdown().await;
        self.listener_token.cancel();
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }
        self.subs.shutdown().await;
        res
    }

    fn add_unit(&self, unit: Unit) {
        self.units.lock().push(unit.clone());
        if self.started.load(Ordering::Acquire) && !self.token.is_cancelled() {
            self.spawn_driver(unit);
        }
    }

    fn spawn_driver(&self, unit: Unit) {
        let token = self.token.child_token();
        self.drivers.lock().spawn(unit.drive(token));
    }

    /// Forwards bus events to the subscriber set; drains what is left once cancelled.
    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.listener_token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(&ev);
                        }
                        break;
                    }
                }
            }
        });
        *self.listener.lock() = Some(handle);
    }
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("units", &self.units.lock().len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
