//! `GET /live` — the server-push SSE stream (spec §6.3). Text framing is
//! `event: <kind>\ndata: <json>\n\n`, produced by axum's own `Sse`
//! responder; heartbeats and reconnect snapshots are handled upstream by
//! [`crate::push::PushBroadcaster`].

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuery {
    pub session_id: Option<String>,
}

type LiveStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

fn to_event(msg: crate::push::OutgoingMessage) -> Result<Event, Infallible> {
    let kind = msg.kind();
    let envelope = crate::push::envelope(&msg);
    Ok(Event::default().event(kind).data(envelope.to_string()))
}

/// `GET /live?sessionId=...`. At the C9 listener cap (spec §4.9), the
/// connection is still accepted but immediately told so and closed, rather
/// than the handler panicking the request task.
pub async fn live_stream(State(state): State<Arc<AppState>>, Query(q): Query<LiveQuery>) -> Sse<LiveStream> {
    let stream: LiveStream = match state.push.subscribe(q.session_id) {
        Some((_client_id, rx)) => Box::pin(ReceiverStream::new(rx).map(to_event)),
        None => Box::pin(stream::once(async {
            Ok(Event::default()
                .event("error")
                .data(r#"{"code":"TOO_MANY_SUBSCRIBERS"}"#))
        })),
    };

    Sse::new(stream)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/live", get(live_stream))
}
