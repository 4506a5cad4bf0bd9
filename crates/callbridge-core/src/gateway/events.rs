//! Gateway events and cancellable subscriptions

use std::fmt;

use tokio::sync::mpsc;

use crate::types::{BridgeId, LegId, LegState};

/// The entity a subscription is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Leg(LegId),
    Bridge(BridgeId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Leg(id) => write!(f, "leg:{}", id),
            EntityKey::Bridge(id) => write!(f, "bridge:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LegStateChanged,
    LegHangupRequested,
    MemberJoined,
    MemberLeft,
}

/// Events emitted by the gateway.
///
/// Bridge membership events carry the membership as it stands right after the
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    LegStateChanged {
        leg_id: LegId,
        state: LegState,
    },
    LegHangupRequested {
        leg_id: LegId,
    },
    MemberJoined {
        bridge_id: BridgeId,
        leg_id: LegId,
        members: Vec<LegId>,
    },
    MemberLeft {
        bridge_id: BridgeId,
        leg_id: LegId,
        members: Vec<LegId>,
    },
}

impl GatewayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GatewayEvent::LegStateChanged { .. } => EventKind::LegStateChanged,
            GatewayEvent::LegHangupRequested { .. } => EventKind::LegHangupRequested,
            GatewayEvent::MemberJoined { .. } => EventKind::MemberJoined,
            GatewayEvent::MemberLeft { .. } => EventKind::MemberLeft,
        }
    }

    /// The entity whose subscribers receive this event.
    pub fn entity(&self) -> EntityKey {
        match self {
            GatewayEvent::LegStateChanged { leg_id, .. }
            | GatewayEvent::LegHangupRequested { leg_id } => EntityKey::Leg(leg_id.clone()),
            GatewayEvent::MemberJoined { bridge_id, .. }
            | GatewayEvent::MemberLeft { bridge_id, .. } => EntityKey::Bridge(bridge_id.clone()),
        }
    }
}

type Canceller = Box<dyn FnOnce() + Send + Sync>;

/// An ordered, cancellable stream of events for one entity.
///
/// The subscription is released on drop, so every exit path of a controller
/// gives it back to the gateway.
pub struct Subscription {
    entity: EntityKey,
    rx: mpsc::UnboundedReceiver<GatewayEvent>,
    canceller: Option<Canceller>,
}

impl Subscription {
    pub fn new(
        entity: EntityKey,
        rx: mpsc::UnboundedReceiver<GatewayEvent>,
        canceller: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            entity,
            rx,
            canceller: Some(Box::new(canceller)),
        }
    }

    /// A subscription that yields nothing, for entities that cannot be observed.
    pub fn closed(entity: EntityKey) -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self {
            entity,
            rx,
            canceller: None,
        }
    }

    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    /// Next event, or `None` once the stream has ended or been cancelled.
    pub async fn recv(&mut self) -> Option<GatewayEvent> {
        self.rx.recv().await
    }

    /// Release the subscription at the gateway. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.canceller.take() {
            cancel();
            self.rx.close();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.canceller.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("entity", &self.entity)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drop_cancels_once() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = cancelled.clone();
        let mut sub = Subscription::new(EntityKey::Leg(LegId::new("leg-1")), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(GatewayEvent::LegHangupRequested { leg_id: LegId::new("leg-1") })
            .unwrap();
        assert_eq!(sub.recv().await.map(|e| e.kind()), Some(EventKind::LegHangupRequested));

        sub.cancel();
        drop(sub);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_entity() {
        let event = GatewayEvent::MemberLeft {
            bridge_id: BridgeId::new("ABCD"),
            leg_id: LegId::new("leg-1"),
            members: vec![],
        };
        assert_eq!(event.entity(), EntityKey::Bridge(BridgeId::new("ABCD")));
        assert_eq!(event.kind(), EventKind::MemberLeft);
    }
}
