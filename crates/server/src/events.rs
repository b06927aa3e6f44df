//! C9 — event bus. Typed publish/subscribe over the fixed vocabulary from
//! spec §4.9, backed by a `tokio::sync::broadcast` channel (grounded in the
//! teacher's `live_tx: broadcast::Sender<SessionEvent>` in `state.rs`/
//! `routes/live.rs`). `broadcast::Sender::send` enqueues into every
//! receiver's buffer synchronously and returns without waiting on any
//! listener, so one slow or lagging subscriber can never block the
//! publisher or affect its siblings — this is how "listener exceptions are
//! isolated" (spec §4.9) is realised in Rust: there is no shared listener
//! call stack to unwind through in the first place.

use sessionlens_core::types::{Session, SessionMetrics, Turn, TurnMetrics};
use tokio::sync::broadcast;
use tracing::warn;

/// The fixed event vocabulary (spec §4.9).
#[derive(Debug, Clone)]
pub enum DomainEvent {
    SessionCreated { session: Session },
    SessionUpdated { session: Session },
    TurnCreated { turn: Turn, metrics: TurnMetrics },
    TurnUpdated { turn: Turn, metrics: TurnMetrics },
    TurnCompleted { turn: Turn, metrics: TurnMetrics },
    MetricsUpdated { session_id: String, metrics: SessionMetrics },
}

impl DomainEvent {
    pub fn session_id(&self) -> &str {
        match self {
            DomainEvent::SessionCreated { session } | DomainEvent::SessionUpdated { session } => {
                &session.id
            }
            DomainEvent::TurnCreated { turn, .. }
            | DomainEvent::TurnUpdated { turn, .. }
            | DomainEvent::TurnCompleted { turn, .. } => &turn.session_id,
            DomainEvent::MetricsUpdated { session_id, .. } => session_id,
        }
    }
}

/// Publish/subscribe bus with a configurable max listener count, used to
/// detect subscription leaks (spec §4.9) rather than let subscribers grow
/// unbounded in a long-running process.
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
    max_listeners: usize,
}

impl EventBus {
    pub fn new(max_listeners: usize, queue_capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(queue_capacity.max(1));
        Self { tx, max_listeners }
    }

    pub fn publish(&self, event: DomainEvent) {
        // `send` returns `Err` only when there are zero receivers, which is
        // not an error for a fire-and-forget bus with no subscribers yet.
        let _ = self.tx.send(event);
    }

    /// Subscribes a new listener, or `None` if `max_listeners` would be
    /// exceeded (a likely subscription leak).
    pub fn subscribe(&self) -> Option<broadcast::Receiver<DomainEvent>> {
        if self.tx.receiver_count() >= self.max_listeners {
            warn!(
                max_listeners = self.max_listeners,
                "event bus at listener cap, rejecting new subscription"
            );
            return None;
        }
        Some(self.tx.subscribe())
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dummy_session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            project_path: "/p".to_string(),
            project_name: "p".to_string(),
            branch: None,
            started_at: Utc::now(),
            last_activity_at: Utc::now(),
            model: None,
            turn_count: 0,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(10, 16);
        let mut rx = bus.subscribe().unwrap();
        bus.publish(DomainEvent::SessionCreated {
            session: dummy_session("s1"),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id(), "s1");
    }

    #[tokio::test]
    async fn subscribe_rejected_once_at_listener_cap() {
        let bus = EventBus::new(1, 16);
        let _first = bus.subscribe().unwrap();
        assert!(bus.subscribe().is_none());
    }

    #[tokio::test]
    async fn one_lagging_subscriber_does_not_block_publish() {
        let bus = EventBus::new(10, 2);
        let _slow = bus.subscribe().unwrap();
        for i in 0..10 {
            bus.publish(DomainEvent::SessionCreated {
                session: dummy_session(&format!("s{i}")),
            });
        }
        // publish never blocks regardless of whether `_slow` ever drains.
    }
}
