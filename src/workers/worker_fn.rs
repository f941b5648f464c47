//! # Function-backed worker (`WorkerFn`)
//!
//! [`WorkerFn`] wraps two closures, `start: Fn(CancellationToken) -> Fut` and
//! `stop: Fn() -> Fut`, producing a fresh future per call. State shared between the
//! two lives in an `Arc` captured by both closures.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use tokio_util::sync::CancellationToken;
//! use stationkit::{WorkerError, WorkerFn, WorkerRef};
//!
//! let open = Arc::new(AtomicBool::new(false));
//! let (a, b) = (open.clone(), open.clone());
//!
//! let w: WorkerRef = WorkerFn::arc(
//!     "serial",
//!     move |_ctx: CancellationToken| {
//!         let open = a.clone();
//!         async move {
//!             open.store(true, Ordering::SeqCst);
//!             Ok::<_, WorkerError>(())
//!         }
//!     },
//!     move || {
//!         let open = b.clone();
//!         async move {
//!             open.store(false, Ordering::SeqCst);
//!             Ok::<_, WorkerError>(())
//!         }
//!     },
//! );
//!
//! assert_eq!(w.name(), "serial");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::worker::Worker;
use crate::error::WorkerError;

/// Function-backed worker implementation.
pub struct WorkerFn<S, T> {
    name: Cow<'static, str>,
    start: S,
    stop: T,
}

impl<S, T> WorkerFn<S, T> {
    /// Creates a new function-backed worker.
    ///
    /// Prefer [`WorkerFn::arc`] when you immediately need a [`WorkerRef`](super::WorkerRef).
    pub fn new(name: impl Into<Cow<'static, str>>, start: S, stop: T) -> Self {
        Self {
            name: name.into(),
            start,
            stop,
        }
    }

    /// Creates the worker and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, start: S, stop: T) -> Arc<Self> {
        Arc::new(Self::new(name, start, stop))
    }
}

impl<S, T> std::fmt::Debug for WorkerFn<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerFn").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<S, SF, T, TF> Worker for WorkerFn<S, T>
where
    S: Fn(CancellationToken) -> SF + Send + Sync + 'static,
    SF: Future<Output = Result<(), WorkerError>> + Send + 'static,
    T: Fn() -> TF + Send + Sync + 'static,
    TF: Future<Output = Result<(), WorkerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), WorkerError> {
        (self.start)(ctx).await
    }

    async fn stop(&self) -> Result<(), WorkerError> {
        (self.stop)().await
    }
}
