//! C7 — store. In-memory, append-mostly index of sessions, turns and
//! metrics, guarded by a single coarse read-write lock (spec §4.7, §5: reads
//! proceed in parallel, writes are exclusive). Exclusively owns all
//! `Session`/`Turn`/metrics instances; other components only ever see
//! cloned read snapshots taken under the lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use sessionlens_core::metrics::{self, EfficiencyConfig};
use sessionlens_core::types::{Session, SessionMetrics, Turn, TurnMetrics};

use crate::error::StoreError;
use crate::events::{DomainEvent, EventBus};

struct StoreInner {
    sessions: HashMap<String, Session>,
    turns_by_session: HashMap<String, Vec<Turn>>,
    turn_metrics_by_id: HashMap<String, TurnMetrics>,
    session_metrics: HashMap<String, SessionMetrics>,
    current_session_id: Option<String>,
}

pub struct Store {
    inner: RwLock<StoreInner>,
    bus: Arc<EventBus>,
    active_window_secs: i64,
    efficiency: EfficiencyConfig,
}

/// Fields a file-processing pass has freshly observed for a session
/// (spec §4.8 step 7).
pub struct SessionUpsert {
    pub id: String,
    pub project_path: String,
    pub project_name: String,
    pub branch: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub model: Option<String>,
    pub turn_count: u32,
}

impl Store {
    pub fn new(bus: Arc<EventBus>, active_window_secs: i64, efficiency: EfficiencyConfig) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                sessions: HashMap::new(),
                turns_by_session: HashMap::new(),
                turn_metrics_by_id: HashMap::new(),
                session_metrics: HashMap::new(),
                current_session_id: None,
            }),
            bus,
            active_window_secs,
            efficiency,
        }
    }

    /// Creates the session if absent, updates its mutable fields otherwise.
    /// `startedAt` is fixed at creation; `lastActivityAt` only ever moves
    /// forward (spec §3: monotonically non-decreasing).
    pub fn upsert_session(&self, fields: SessionUpsert) {
        let event = {
            let mut inner = self.inner.write().expect("store lock poisoned");
            match inner.sessions.get_mut(&fields.id) {
                Some(existing) => {
                    existing.project_path = fields.project_path;
                    existing.project_name = fields.project_name;
                    existing.branch = fields.branch;
                    if fields.last_activity_at > existing.last_activity_at {
                        existing.last_activity_at = fields.last_activity_at;
                    }
                    existing.model = fields.model;
                    existing.turn_count = fields.turn_count;
                    DomainEvent::SessionUpdated {
                        session: existing.clone(),
                    }
                }
                None => {
                    let session = Session {
                        id: fields.id.clone(),
                        project_path: fields.project_path,
                        project_name: fields.project_name,
                        branch: fields.branch,
                        started_at: fields.last_activity_at,
                        last_activity_at: fields.last_activity_at,
                        model: fields.model,
                        turn_count: fields.turn_count,
                    };
                    inner.sessions.insert(fields.id.clone(), session.clone());
                    DomainEvent::SessionCreated { session }
                }
            }
        };
        self.bus.publish(event);
    }

    /// Inserts or replaces a turn by `turn.id`, keeps the per-session turn
    /// list dense and sorted by `turnNumber`, recomputes `SessionMetrics`,
    /// and emits the corresponding C9 events (spec §4.7).
    pub fn upsert_turn(&self, turn: Turn, metrics_in: TurnMetrics) {
        let session_id = turn.session_id.clone();
        let (turn_event, metrics_event) = {
            let mut inner = self.inner.write().expect("store lock poisoned");

            let list = inner.turns_by_session.entry(session_id.clone()).or_default();
            let existing_idx = list.iter().position(|t| t.id == turn.id);
            let is_replace_with_new_end = existing_idx
                .map(|i| list[i].ended_at != turn.ended_at)
                .unwrap_or(false);

            let turn_event = match existing_idx {
                Some(idx) => {
                    list[idx] = turn.clone();
                    if is_replace_with_new_end {
                        DomainEvent::TurnCompleted {
                            turn: turn.clone(),
                            metrics: metrics_in.clone(),
                        }
                    } else {
                        DomainEvent::TurnUpdated {
                            turn: turn.clone(),
                            metrics: metrics_in.clone(),
                        }
                    }
                }
                None => {
                    let pos = list
                        .iter()
                        .position(|t| t.turn_number > turn.turn_number)
                        .unwrap_or(list.len());
                    list.insert(pos, turn.clone());
                    DomainEvent::TurnCreated {
                        turn: turn.clone(),
                        metrics: metrics_in.clone(),
                    }
                }
            };

            inner
                .turn_metrics_by_id
                .insert(turn.id.clone(), metrics_in.clone());

            let turns = inner.turns_by_session.get(&session_id).cloned().unwrap_or_default();
            let turn_metrics_list: Vec<TurnMetrics> = turns
                .iter()
                .filter_map(|t| inner.turn_metrics_by_id.get(&t.id).cloned())
                .collect();
            let session_metrics =
                metrics::session_metrics(&session_id, &turns, &turn_metrics_list, &self.efficiency);
            inner
                .session_metrics
                .insert(session_id.clone(), session_metrics.clone());

            let metrics_event = DomainEvent::MetricsUpdated {
                session_id: session_id.clone(),
                metrics: session_metrics,
            };

            (turn_event, metrics_event)
        };

        self.bus.publish(turn_event);
        self.bus.publish(metrics_event);
    }

    pub fn set_current_session(&self, id: String) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.current_session_id = Some(id);
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .current_session_id
            .clone()
    }

    pub fn get_session(&self, id: &str) -> Result<Session, StoreError> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    pub fn get_all_sessions(&self) -> Vec<Session> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .sessions
            .values()
            .cloned()
            .collect()
    }

    pub fn get_active_sessions(&self, now: DateTime<Utc>) -> Vec<Session> {
        self.get_all_sessions()
            .into_iter()
            .filter(|s| s.is_active_at(now, self.active_window_secs))
            .collect()
    }

    pub fn get_session_turns(&self, id: &str, offset: usize, limit: usize) -> (Vec<Turn>, bool) {
        let inner = self.inner.read().expect("store lock poisoned");
        let all = inner.turns_by_session.get(id).cloned().unwrap_or_default();
        let page: Vec<Turn> = all.iter().skip(offset).take(limit).cloned().collect();
        let has_more = offset + page.len() < all.len();
        (page, has_more)
    }

    pub fn get_session_metrics(&self, id: &str) -> Result<SessionMetrics, StoreError> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .session_metrics
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    /// `TurnMetrics` for every turn in a session, in `turnNumber` order —
    /// used by the "get session metrics" REST operation (spec §6.2).
    pub fn get_session_turn_metrics(&self, id: &str) -> Vec<TurnMetrics> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .turns_by_session
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|t| inner.turn_metrics_by_id.get(&t.id).cloned())
            .collect()
    }

    pub fn get_turn(&self, turn_id: &str) -> Result<(Turn, TurnMetrics), StoreError> {
        let inner = self.inner.read().expect("store lock poisoned");
        let metrics = inner
            .turn_metrics_by_id
            .get(turn_id)
            .cloned()
            .ok_or_else(|| StoreError::TurnNotFound(turn_id.to_string()))?;
        let turn = inner
            .turns_by_session
            .values()
            .flatten()
            .find(|t| t.id == turn_id)
            .cloned()
            .ok_or_else(|| StoreError::TurnNotFound(turn_id.to_string()))?;
        Ok((turn, metrics))
    }

    pub fn is_active(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session.is_active_at(now, self.active_window_secs)
    }
}
