//! Runtime core: worker lifecycle, supervision and the station context.
//!
//! The public API from this module is [`Station`] (with its [`StationBuilder`]),
//! [`Supervisor`] and [`EnableGate`].
//!
//! Internal modules:
//! - [`runner`]: one guarded `start`/`stop` call with timeout, cancellation and panic capture;
//! - [`lifecycle`]: the `Stopped`/`Retrying`/`Running` state machine shared by both drivers;
//! - [`supervisor`]: retry-on-crash driver;
//! - [`gate`]: enable/disable driver bound to a persisted boolean entity;
//! - [`station`]: owns the bus, registry and units, and shuts them down within a grace;
//! - [`shutdown`]: cross-platform termination signal handling.

mod builder;
mod gate;
mod lifecycle;
mod runner;
mod shutdown;
mod station;
mod supervisor;

pub use builder::StationBuilder;
pub use gate::{EnableGate, enable_entity_id};
pub use lifecycle::WorkerState;
pub(crate) use runner::panic_message;
pub use station::Station;
pub use supervisor::Supervisor;
