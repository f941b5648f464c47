//! Change link: mirrors one entity's authoritative changes to the store and broker.
//!
//! One link task per persisted or published entity, so writes for a given entity
//! happen in the order its changes were produced.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::ConnectionState;
use crate::broker::{BrokerMessage, BrokerRef, topic};
use crate::entity::{EntityHandle, EntityRef, EntityStream, EntityValue, ValueChanged};
use crate::events::{Bus, Event, EventKind};
use crate::store::{self, StoreRef};

/// Sinks shared by every link task.
#[derive(Clone)]
pub(super) struct Mirror {
    pub(super) store: StoreRef,
    pub(super) broker: Option<BrokerRef>,
    pub(super) bus: Bus,
    pub(super) topic_base: String,
    pub(super) connection: watch::Receiver<ConnectionState>,
}

impl Mirror {
    async fn apply(&self, entity: &dyn EntityHandle) {
        let flags = entity.flags();
        let payload = entity.as_string();

        if flags.persist {
            if let Err(err) = store::upsert(self.store.as_ref(), entity.id(), &payload).await {
                tracing::warn!(entity = %entity.id(), error = %err, "store write failed");
                self.bus.publish(
                    Event::new(EventKind::StoreWriteFailed)
                        .with_entity(entity.id())
                        .with_reason(err.to_string()),
                );
            }
        }

        if !flags.publish {
            return;
        }
        let Some(broker) = &self.broker else { return };
        if *self.connection.borrow() != ConnectionState::Connected {
            tracing::debug!(entity = %entity.id(), "broker offline, publish skipped");
            return;
        }
        let message = BrokerMessage::new(topic::entity_topic(&self.topic_base, entity.id()), payload)
            .retained(flags.persist);
        if let Err(err) = broker.publish(message).await {
            tracing::warn!(entity = %entity.id(), error = %err, "publish failed");
            self.bus.publish(
                Event::new(EventKind::PublishFailed)
                    .with_entity(entity.id())
                    .with_reason(err.to_string()),
            );
        }
    }
}

pub(super) async fn run<T: EntityValue>(
    mirror: Mirror,
    entity: EntityRef<T>,
    mut changes: EntityStream<ValueChanged<T>>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            ev = changes.recv() => match ev {
                Some(_) => mirror.apply(entity.as_ref()).await,
                None => break,
            },
        }
    }
}
