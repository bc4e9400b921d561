//! Server-Sent Events support

use crate::runtime::{SessionEvent, SessionSnapshot};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Init event with the current session, then every broadcast event
pub fn sse_stream(
    snapshot: SessionSnapshot,
    broadcast_rx: tokio::sync::broadcast::Receiver<SessionEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move {
        Ok(to_axum("init", &json!({ "type": "init", "session": snapshot })))
    });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(to_axum(event_name(&event), &event))),
        Err(e) => {
            tracing::debug!(error = %e, "SSE subscriber lagged");
            None
        }
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Status { .. } => "status",
        SessionEvent::Typing { .. } => "typing",
        SessionEvent::History { .. } => "history",
        SessionEvent::ModelState { .. } => "model_state",
    }
}

fn to_axum(name: &str, payload: &impl Serialize) -> Event {
    match serde_json::to_string(payload) {
        Ok(data) => Event::default().event(name).data(data),
        Err(e) => {
            tracing::warn!(event = name, error = %e, "Failed to encode SSE event");
            Event::default().event("error").data(e.to_string())
        }
    }
}
