//! # Per-entity subscription stream.
//!
//! [`EntityStream`] wraps one `broadcast::Receiver` of an entity channel and applies
//! the optional "only if different" predicate before handing a record out.
//!
//! ## Rules
//! - **Per-entity FIFO**: records arrive in the order the entity produced them.
//! - **Lag**: a receiver more than the channel capacity behind skips the oldest
//!   records (logged at `warn`) and resumes with the next one.
//! - **End of stream**: `recv()` returns `None` once the entity is dropped.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use super::event::StreamEvent;

/// Receiver half of an entity's change or change-request channel.
pub struct EntityStream<E> {
    rx: broadcast::Receiver<E>,
    only_if_different: bool,
}

impl<E: StreamEvent> EntityStream<E> {
    pub(crate) fn new(rx: broadcast::Receiver<E>, only_if_different: bool) -> Self {
        Self {
            rx,
            only_if_different,
        }
    }

    /// Waits for the next record that passes the filter.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.rx.recv().await {
                Ok(ev) if self.passes(&ev) => return Some(ev),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "entity stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered record that passes the filter, without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) if self.passes(&ev) => return Some(ev),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "entity stream lagged");
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    #[inline]
    fn passes(&self, ev: &E) -> bool {
        !self.only_if_different || ev.is_different()
    }
}
