//! Ack-timeout watcher: one per ack-required entity.
//!
//! Each change request (re)arms a single deadline; when it passes, the pending value
//! of that request generation is dropped. A confirmation that landed in between has
//! already cleared the pending value, so the expiry is then a no-op.

use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::entity::{ChangeRequested, EntityRef, EntityStream, EntityValue};
use crate::events::{Bus, Event, EventKind};

pub(super) async fn watch<T: EntityValue>(
    entity: EntityRef<T>,
    mut requests: EntityStream<ChangeRequested<T>>,
    timeout: Duration,
    bus: Bus,
    token: CancellationToken,
) {
    let mut armed: Option<(Instant, u64)> = None;

    loop {
        let deadline = armed.map(|(at, _)| at);
        let expired = async move {
            match deadline {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = token.cancelled() => break,
            req = requests.recv() => match req {
                Some(req) => armed = Some((Instant::now() + timeout, req.seq)),
                None => break,
            },
            _ = expired => {
                let Some((_, seq)) = armed.take() else { continue };
                if entity.expire_request(seq) {
                    tracing::debug!(entity = %entity.id(), seq, "pending change expired");
                    bus.publish(Event::new(EventKind::AckExpired).with_entity(entity.id()));
                }
            }
        }
    }
}
