//! # Worker abstractions.
//!
//! - [`Worker`] trait for a supervised start/stop unit
//! - [`WorkerFn`] closure-backed implementation
//! - [`WorkerRef`] shared reference (`Arc<dyn Worker>`)
//! - [`Resources`] bag of everything a running worker holds

mod resources;
mod worker;
mod worker_fn;

pub use resources::Resources;
pub use worker::{Worker, WorkerRef};
pub use worker_fn::WorkerFn;
