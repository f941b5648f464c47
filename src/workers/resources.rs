//! # Per-worker resource bag.
//!
//! Collects what a worker's `start` acquires so its `stop` can release all of it in
//! one call:
//!
//! ```text
//! start():  spawn(loop) ─┐
//!           token() ─────┼──► Resources
//!           on_release() ┘
//!
//! stop():   release() ──► cancel tokens ──► run release hooks (reverse order)
//!                                       └─► abort and join tasks
//! ```
//!
//! ## Rules
//! - A failing or panicking release hook is logged and skipped; the rest still run.
//! - `release()` leaves the bag empty, so calling it twice is harmless.

use std::borrow::Cow;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;

type ReleaseHook = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), WorkerError>> + Send>;

#[derive(Default)]
struct Held {
    tasks: Vec<JoinHandle<()>>,
    tokens: Vec<CancellationToken>,
    hooks: Vec<(Cow<'static, str>, ReleaseHook)>,
}

/// Resources acquired by a running worker.
#[derive(Default)]
pub struct Resources {
    held: Mutex<Held>,
}

impl Resources {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `fut` and tracks its handle.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.held.lock().tasks.push(tokio::spawn(fut));
    }

    /// Tracks an already spawned task.
    pub fn track_task(&self, handle: JoinHandle<()>) {
        self.held.lock().tasks.push(handle);
    }

    /// Returns a child of `parent` that is cancelled on release.
    pub fn token(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        self.held.lock().tokens.push(token.clone());
        token
    }

    /// Registers an async release hook (close a port, disconnect a client, ...).
    pub fn on_release<F, Fut>(&self, name: impl Into<Cow<'static, str>>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        let hook: ReleaseHook = Box::new(move || hook().boxed());
        self.held.lock().hooks.push((name.into(), hook));
    }

    /// `true` when nothing is held.
    pub fn is_empty(&self) -> bool {
        let held = self.held.lock();
        held.tasks.is_empty() && held.tokens.is_empty() && held.hooks.is_empty()
    }

    /// Releases everything held. Returns the number of hooks that failed.
    pub async fn release(&self) -> usize {
        let Held {
            tasks,
            tokens,
            mut hooks,
        } = std::mem::take(&mut *self.held.lock());

        for token in &tokens {
            token.cancel();
        }

        let mut failed = 0;
        while let Some((name, hook)) = hooks.pop() {
            match std::panic::AssertUnwindSafe(hook()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failed += 1;
                    tracing::warn!(resource = %name, error = %err, "release failed, ignoring");
                }
                Err(_) => {
                    failed += 1;
                    tracing::warn!(resource = %name, "release panicked, ignoring");
                }
            }
        }

        for task in tasks {
            task.abort();
            if let Err(err) = task.await {
                if err.is_panic() {
                    tracing::warn!(error = %err, "worker task panicked before release");
                }
            }
        }
        failed
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let held = self.held.lock();
        f.debug_struct("Resources")
            .field("tasks", &held.tasks.len())
            .field("tokens", &held.tokens.len())
            .field("hooks", &held.hooks.len())
            .finish()
    }
}
