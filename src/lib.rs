//! # stationkit
//!
//! **Stationkit** is the runtime core of an off-grid solar radio station: it keeps
//! the station's state entities in sync with a persistent store and an MQTT
//! broker, and keeps the station's long-running workers (APRS, Meshtastic, weather,
//! watchdog, ...) alive.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Entity<T> (gpio/wifi, feature/sleep, battery/voltage, ...)
//!      │ request_change / confirm_or_force / set_from_string
//!      ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry                                                         │
//! │  - restore from Store on register                                 │
//! │  - change link: ValueChanged ─► Store upsert, Broker publish      │
//! │  - ack watcher: pending request expires after ack_timeout         │
//! │  - connection loop: connect, subscribe {base}/#, route, backoff   │
//! └──────┬───────────────────────────────┬────────────────────────────┘
//!        ▼                               ▼
//!     Store (SQLite / memory)         Broker (retained, no-local)
//!
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Station (process context)                                        │
//! │  - Supervisor: start, retry on the next tick after a crash        │
//! │  - EnableGate: start/stop following a persisted worker/{name}     │
//! │  - shutdown within grace                                          │
//! └──────┬────────────────────────────────────────────────────────────┘
//!        │ WorkerStarting, WorkerFailed, AckExpired, PublishFailed, ...
//!        ▼
//!   Bus (broadcast) ─► subscriber_listener ─► SubscriberSet ─► sub.on_event()
//! ```
//!
//! ### Ack-required changes
//! ```text
//! request_change(v) ──► pending = v, ChangeRequested ──► publish on the broker
//!                                    │
//!   MCU confirms ─► confirm_or_force(v) ─► value = v, ValueChanged ─► store + broker
//!   no answer within ack_timeout       ─► pending cleared, AckExpired
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Entities**      | Typed observable values with optional acknowledgement.       | [`Entity`], [`EntityHandle`], [`EntityFlags`] |
//! | **Registry**      | Store restore, change mirroring, broker routing.             | [`Registry`], [`Store`], [`Broker`]         |
//! | **Supervision**   | Retry-on-crash and enable/disable of workers.                | [`Supervisor`], [`EnableGate`], [`Worker`]  |
//! | **Station**       | Process context and graceful shutdown.                       | [`Station`], [`StationBuilder`]             |
//! | **Subscriber API**| Hook into runtime events.                                    | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors for every component.                            | [`WorkerError`], [`RuntimeError`]           |
//! | **Configuration** | TOML-backed runtime settings.                                | [`StationConfig`]                           |
//!
//! ## Optional features
//! - `sqlite` (default): [`SqliteStore`], used by the builder when `store.path` is set.
//! - `mqtt` (default): [`MqttBroker`], used by the builder when `broker.host` is set.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use stationkit::{MemoryBroker, Station, StationConfig, StationEntities, WorkerError, WorkerFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new();
//!     let station = Station::builder(StationConfig::default())
//!         .with_broker(Arc::new(broker.client("station")))
//!         .build()?;
//!
//!     let entities = StationEntities::new();
//!     entities.register_all(station.registry()).await?;
//!
//!     let aprs = WorkerFn::arc(
//!         "AprsApp",
//!         |_ctx: CancellationToken| async { Ok::<_, WorkerError>(()) },
//!         || async { Ok::<_, WorkerError>(()) },
//!     );
//!     station.gate(aprs, true).await?;
//!
//!     station.start();
//!     entities.gpio_wifi.request_change(true);
//!
//!     station.shutdown().await?;
//!     Ok(())
//! }
//! ```
pub mod broker;
pub mod catalog;
mod config;
mod core;
mod entity;
mod error;
mod events;
mod logging;
mod registry;
mod store;
mod subscribers;
mod workers;

// ---- Public re-exports ----

pub use broker::{Broker, BrokerMessage, BrokerRef, MemoryBroker, MemoryClient};
pub use catalog::{LoraMessage, LoraNetwork, MeshtasticNode, StationEntities};
pub use config::{
    BrokerConfig, LogFormat, LoggingConfig, RegistryConfig, StationConfig, StoreConfig, SupervisionConfig,
};
pub use core::{
    EnableGate, Station, StationBuilder, Supervisor, WorkerState, enable_entity_id,
};
pub use entity::{
    ChangeRequested, DEFAULT_STREAM_CAPACITY, DynEntity, Entity, EntityFlags, EntityHandle,
    EntityRef, EntityStream, EntityValue, StreamEvent, ValueChanged,
};
pub use error::{BrokerError, ConfigError, RegistryError, RuntimeError, StoreError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use logging::init_tracing;
pub use registry::{ConnectionState, Registry};
pub use store::{MemoryStore, Store, StoreRef};
pub use subscribers::{Subscribe, SubscriberSet};
pub use workers::{Resources, Worker, WorkerFn, WorkerRef};

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
#[cfg(feature = "mqtt")]
pub use broker::MqttBroker;
