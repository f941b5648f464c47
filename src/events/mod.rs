//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Registry` (entity side effects, broker connection),
//!   `Supervisor` / `EnableGate` (worker lifecycle), `Station` (shutdown),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the station listener, which fans out to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
