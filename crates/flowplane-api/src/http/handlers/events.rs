//! Server-sent event stream of flow notifications.
//!
//! GET /api/v1/projects/{projectId}/events
//!
//! Each `FlowEvent` for the project is sent with its type name as the SSE
//! event name and its JSON encoding as data. A subscriber that falls behind
//! receives a `lagged` event with the number of dropped events.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::Stream;

use flowplane_types::event::FlowEvent;

use crate::state::AppState;

fn to_sse(event: &FlowEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(data) => Some(Event::default().event(event.name()).data(data)),
        Err(e) => {
            tracing::warn!(event = event.name(), error = %e, "failed to encode event");
            None
        }
    }
}

pub async fn project_events(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    tracing::debug!(%project_id, "event stream opened");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) if event.project_id() == project_id => {
                    if let Some(sse) = to_sse(&event) {
                        yield Ok::<_, Infallible>(sse);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%project_id, skipped, "event subscriber lagged");
                    yield Ok(Event::default().event("lagged").data(skipped.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
