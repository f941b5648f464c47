//! # Single start/stop call of a worker.
//!
//! Wraps one call of [`Worker::start`] or [`Worker::stop`] so that nothing a worker
//! does can escape the supervision boundary:
//!
//! ```text
//! start_once:
//!   worker.start(ctx) ─┬─ Ok / Err(e)     → returned as is
//!                      ├─ panic           → Err(Panicked)
//!                      ├─ timeout hit     → Err(Timeout)
//!                      └─ ctx cancelled   → Err(Canceled)
//!
//! stop_guarded:
//!   worker.stop() ─────┬─ Ok / Err(e)     → returned as is
//!                      └─ panic           → Err(Panicked)
//! ```
//!
//! ## Rules
//! - `timeout = None` (or zero) means no bound.
//! - `stop_quietly` logs and swallows every error; used on failure paths where the
//!   original error is the one worth reporting.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::workers::Worker;

/// Runs one `start` call of `worker`.
pub(crate) async fn start_once<W: Worker + ?Sized>(
    worker: &W,
    ctx: CancellationToken,
    timeout: Option<Duration>,
) -> Result<(), WorkerError> {
    let attempt = AssertUnwindSafe(worker.start(ctx.clone())).catch_unwind();
    let bounded = async {
        match timeout.filter(|d| *d > Duration::ZERO) {
            Some(dur) => time::timeout(dur, attempt)
                .await
                .map_err(|_elapsed| WorkerError::Timeout { timeout: dur }),
            None => Ok(attempt.await),
        }
    };

    let res = tokio::select! {
        res = bounded => res,
        _ = ctx.cancelled() => return Err(WorkerError::Canceled),
    };
    match res? {
        Ok(r) => r,
        Err(panic) => Err(WorkerError::Panicked {
            info: panic_message(panic.as_ref()),
        }),
    }
}

/// Runs one `stop` call of `worker`, converting panics to errors.
pub(crate) async fn stop_guarded<W: Worker + ?Sized>(worker: &W) -> Result<(), WorkerError> {
    match AssertUnwindSafe(worker.stop()).catch_unwind().await {
        Ok(r) => r,
        Err(panic) => Err(WorkerError::Panicked {
            info: panic_message(panic.as_ref()),
        }),
    }
}

/// Runs one `stop` call of `worker`, logging and swallowing any error.
pub(crate) async fn stop_quietly<W: Worker + ?Sized>(worker: &W) {
    if let Err(err) = stop_guarded(worker).await {
        tracing::warn!(worker = %worker.name(), error = %err, "stop after failure also failed, ignoring");
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::workers::{WorkerFn, WorkerRef};

    fn worker_with<F, Fut>(start: F) -> WorkerRef
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        WorkerFn::arc("weather", start, || async { Ok(()) })
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let w = worker_with(|_ctx| async {
            let broken = true;
            if broken {
                panic!("serial port vanished");
            }
            Ok(())
        });
        let err = start_once(w.as_ref(), CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WorkerError::Panicked {
                info: "serial port vanished".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_start_times_out() {
        let w = worker_with(|_ctx| async {
            time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let err = start_once(w.as_ref(), CancellationToken::new(), Some(Duration::from_secs(2)))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "worker_timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_start() {
        let w = worker_with(|_ctx| std::future::pending());
        let token = CancellationToken::new();
        let t = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            t.cancel();
        });
        let err = start_once(w.as_ref(), token, None).await.unwrap_err();
        assert_eq!(err, WorkerError::Canceled);
    }

    #[tokio::test]
    async fn zero_timeout_means_unbounded() {
        let w = worker_with(|_ctx| async { Ok(()) });
        assert!(
            start_once(w.as_ref(), CancellationToken::new(), Some(Duration::ZERO))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn stop_panics_are_contained() {
        let w: WorkerRef = Arc::new(WorkerFn::new(
            "weather",
            |_ctx: CancellationToken| async { Ok(()) },
            || async {
                let broken = true;
                if broken {
                    panic!("double close");
                }
                Ok(())
            },
        ));
        assert!(matches!(
            stop_guarded(w.as_ref()).await,
            Err(WorkerError::Panicked { .. })
        ));
        stop_quietly(w.as_ref()).await;
    }
}
