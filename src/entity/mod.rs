//! # Entities: typed, observable station values.
//!
//! An [`Entity<T>`] is a single addressable value (a GPIO level, a voltage threshold,
//! a list of radio nodes) with two streams:
//!
//! ```text
//!                     ┌──────────────────────────┐
//!  request_change ───►│        Entity<T>         │──► changes()          ValueChanged<T>
//!  confirm_or_force ─►│ value · previous ·       │
//!  set_from_string ──►│ pending · generation     │──► change_requests()  ChangeRequested<T>
//!                     └──────────────────────────┘
//! ```
//!
//! - [`Entity`] the value cell and its change protocol
//! - [`EntityFlags`] persist / publish / ack-required switches
//! - [`EntityHandle`] / [`DynEntity`] type-erased view used by the registry
//! - [`EntityStream`] subscription with the optional "only if different" filter

mod cell;
mod event;
mod handle;
mod stream;
mod value;

pub use cell::{DEFAULT_STREAM_CAPACITY, Entity, EntityRef};
pub use event::{ChangeRequested, StreamEvent, ValueChanged};
pub use handle::{DynEntity, EntityHandle};
pub use stream::EntityStream;
pub use value::{EntityFlags, EntityValue};
