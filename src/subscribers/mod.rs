//! # Event subscribers.
//!
//! User-supplied observers of the runtime [`Bus`](crate::events::Bus): alerting,
//! watchdog feeds, dashboards.
//!
//! ```text
//!   Registry / Supervisor / EnableGate ── publish(Event) ──► Bus
//!                                                            │
//!                                              Station listener
//!                                                            │
//!                                                  SubscriberSet::emit
//!                                              ┌─────────┼─────────┐
//!                                              ▼         ▼         ▼
//!                                           Alerts   Watchdog   Custom
//! ```
//!
//! - [`Subscribe`] trait implemented by observers
//! - [`SubscriberSet`] bounded, panic-isolated fan-out

mod subscribe;
mod subscriber_set;

pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
