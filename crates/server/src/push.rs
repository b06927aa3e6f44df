//! C10 — push broadcaster. Owns `Subscriber` records with an explicit
//! lifecycle and fans out C9 events filtered by session interest, sending
//! snapshots on connect and heartbeats on a timer (spec §4.10). Grounded in
//! the teacher's `routes/live.rs::live_stream`, generalised from one
//! inline axum handler into an explicit, axum-independent broadcaster so the
//! subscribe/disconnect lifecycle is unit-testable without spinning up HTTP.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use sessionlens_core::types::{Session, SessionMetrics, Turn, TurnMetrics};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::DomainEvent;
use crate::store::Store;

/// Outgoing message kinds (spec §4.10/§6.3), each carrying its own payload.
/// Serialized untagged: the kind tag and ISO-instant timestamp are added by
/// [`envelope`] at the SSE boundary, alongside this struct's fields as `data`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    #[serde(rename_all = "camelCase")]
    Connected {
        session_filter: Option<String>,
        server_version: String,
    },
    #[serde(rename_all = "camelCase")]
    SessionSnapshot {
        session: Session,
        turns: Vec<Turn>,
        metrics: Option<SessionMetrics>,
    },
    #[serde(rename_all = "camelCase")]
    SessionUpdate { session: Session },
    #[serde(rename_all = "camelCase")]
    TurnNew { turn: Turn, metrics: TurnMetrics },
    #[serde(rename_all = "camelCase")]
    TurnUpdate { turn: Turn, metrics: TurnMetrics },
    #[serde(rename_all = "camelCase")]
    TurnComplete { turn: Turn, metrics: TurnMetrics },
    #[serde(rename_all = "camelCase")]
    Metrics {
        session_id: String,
        metrics: SessionMetrics,
    },
    Heartbeat,
    #[serde(rename_all = "camelCase")]
    Error {
        code: &'static str,
        message: String,
    },
}

impl OutgoingMessage {
    /// The SSE `event:` line name (spec §6.3 framing).
    pub fn kind(&self) -> &'static str {
        match self {
            OutgoingMessage::Connected { .. } => "connected",
            OutgoingMessage::SessionSnapshot { .. } => "session-snapshot",
            OutgoingMessage::SessionUpdate { .. } => "session-update",
            OutgoingMessage::TurnNew { .. } => "turn-new",
            OutgoingMessage::TurnUpdate { .. } => "turn-update",
            OutgoingMessage::TurnComplete { .. } => "turn-complete",
            OutgoingMessage::Metrics { .. } => "metrics",
            OutgoingMessage::Heartbeat => "heartbeat",
            OutgoingMessage::Error { .. } => "error",
        }
    }
}

struct Subscriber {
    alive: Arc<AtomicBool>,
}

pub struct PushBroadcaster {
    store: Arc<Store>,
    bus: Arc<crate::events::EventBus>,
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
    heartbeat_interval: Duration,
    queue_capacity: usize,
    server_version: String,
}

impl PushBroadcaster {
    pub fn new(
        store: Arc<Store>,
        bus: Arc<crate::events::EventBus>,
        heartbeat_interval: Duration,
        queue_capacity: usize,
    ) -> Self {
        Self {
            store,
            bus,
            subscribers: Mutex::new(HashMap::new()),
            heartbeat_interval,
            queue_capacity,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Registers a new subscriber and returns its outgoing message stream.
    /// `None` if the underlying event bus has hit its listener cap (spec
    /// §4.9 leak protection — a connection attempt at that point is simply
    /// refused upstream of this call, same as any other C9 subscription).
    pub fn subscribe(
        self: &Arc<Self>,
        session_filter: Option<String>,
    ) -> Option<(Uuid, mpsc::Receiver<OutgoingMessage>)> {
        let event_rx = self.bus.subscribe()?;
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity.max(1));
        let alive = Arc::new(AtomicBool::new(true));

        self.subscribers.lock().expect("subscriber map poisoned").insert(
            client_id,
            Subscriber {
                alive: Arc::clone(&alive),
            },
        );

        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            broadcaster
                .run_subscriber(client_id, session_filter, tx, event_rx, alive)
                .await;
        });

        Some((client_id, rx))
    }

    async fn run_subscriber(
        &self,
        client_id: Uuid,
        session_filter: Option<String>,
        tx: mpsc::Sender<OutgoingMessage>,
        mut event_rx: broadcast::Receiver<DomainEvent>,
        alive: Arc<AtomicBool>,
    ) {
        info!(%client_id, ?session_filter, "push subscriber connected");

        if tx
            .send(OutgoingMessage::Connected {
                session_filter: session_filter.clone(),
                server_version: self.server_version.clone(),
            })
            .await
            .is_err()
        {
            self.cleanup(client_id, alive);
            return;
        }

        self.send_initial_snapshot(&tx, session_filter.as_deref()).await;

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Ok(event) => {
                            if !matches_filter(session_filter.as_deref(), event.session_id()) {
                                continue;
                            }
                            let outgoing = to_outgoing(event);
                            if tx.send(outgoing).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(%client_id, skipped = n, "subscriber lagged, resending snapshot");
                            self.send_initial_snapshot(&tx, session_filter.as_deref()).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if tx.send(OutgoingMessage::Heartbeat).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.cleanup(client_id, alive);
    }

    async fn send_initial_snapshot(&self, tx: &mpsc::Sender<OutgoingMessage>, filter: Option<&str>) {
        let target = filter.map(str::to_string).or_else(|| self.store.current_session_id());
        let Some(session_id) = target else {
            return;
        };
        match self.store.get_session(&session_id) {
            Ok(session) => {
                let (turns, _) = self.store.get_session_turns(&session_id, 0, usize::MAX);
                let metrics = self.store.get_session_metrics(&session_id).ok();
                let _ = tx
                    .send(OutgoingMessage::SessionSnapshot {
                        session,
                        turns,
                        metrics,
                    })
                    .await;
            }
            Err(_) if filter.is_some() => {
                let _ = tx
                    .send(OutgoingMessage::Error {
                        code: "SESSION_NOT_FOUND",
                        message: format!("session {session_id} not found"),
                    })
                    .await;
            }
            Err(_) => {}
        }
    }

    /// Marks the subscriber dead exactly once and removes it. Safe to call
    /// more than once for the same client (spec §4.10: "double-cleanup is a
    /// no-op").
    fn cleanup(&self, client_id: Uuid, alive: Arc<AtomicBool>) {
        if alive.swap(false, Ordering::SeqCst) {
            self.subscribers.lock().expect("subscriber map poisoned").remove(&client_id);
            info!(%client_id, "push subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber map poisoned").len()
    }
}

fn matches_filter(filter: Option<&str>, event_session_id: &str) -> bool {
    match filter {
        None => true,
        Some(f) => f == event_session_id,
    }
}

fn to_outgoing(event: DomainEvent) -> OutgoingMessage {
    match event {
        DomainEvent::SessionCreated { session } | DomainEvent::SessionUpdated { session } => {
            OutgoingMessage::SessionUpdate { session }
        }
        DomainEvent::TurnCreated { turn, metrics } => OutgoingMessage::TurnNew { turn, metrics },
        DomainEvent::TurnUpdated { turn, metrics } => OutgoingMessage::TurnUpdate { turn, metrics },
        DomainEvent::TurnCompleted { turn, metrics } => {
            OutgoingMessage::TurnComplete { turn, metrics }
        }
        DomainEvent::MetricsUpdated { session_id, metrics } => {
            OutgoingMessage::Metrics { session_id, metrics }
        }
    }
}

/// Wraps a message as `{kind, timestamp, data}` (spec §4.10: "each message
/// has a kind tag, an ISO-instant timestamp, and a kind-specific payload").
pub fn envelope(msg: &OutgoingMessage) -> serde_json::Value {
    serde_json::json!({
        "kind": msg.kind(),
        "timestamp": Utc::now().to_rfc3339(),
        "data": msg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use sessionlens_core::metrics::EfficiencyConfig;

    fn broadcaster() -> Arc<PushBroadcaster> {
        let bus = Arc::new(EventBus::new(100, 256));
        let store = Arc::new(Store::new(Arc::clone(&bus), 300, EfficiencyConfig::default()));
        Arc::new(PushBroadcaster::new(
            store,
            bus,
            Duration::from_millis(50),
            16,
        ))
    }

    #[tokio::test]
    async fn subscriber_receives_connected_then_heartbeat() {
        let bc = broadcaster();
        let (_id, mut rx) = bc.subscribe(None).unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind(), "connected");
        let second = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.kind(), "heartbeat");
    }

    #[tokio::test]
    async fn filtered_subscriber_gets_error_for_unknown_session() {
        let bc = broadcaster();
        let (_id, mut rx) = bc.subscribe(Some("does-not-exist".to_string())).unwrap();
        let _connected = rx.recv().await.unwrap();
        let next = rx.recv().await.unwrap();
        assert_eq!(next.kind(), "error");
    }

    #[tokio::test]
    async fn dropping_receiver_cleans_up_subscriber() {
        let bc = broadcaster();
        let (_id, rx) = bc.subscribe(None).unwrap();
        drop(rx);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(bc.subscriber_count(), 0);
    }
}
