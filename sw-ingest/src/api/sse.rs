//! Server-Sent Events for one session's workflow events

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /sessions/:session_id/events
///
/// Streams StateChanged, FilesProcessed, ObservationsClassified,
/// ObservationUploaded and UploadFailed for this session only.
pub async fn session_event_stream(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if state.sessions.get(session_id).await.is_none() {
        return Err(ApiError::NotFound(format!("Session {}", session_id)));
    }
    info!(session_id = %session_id, "New SSE client connected to session events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    match received {
                        Ok(event) if event.session_id() == session_id => {
                            let event_type = event.event_type();
                            match serde_json::to_string(&event) {
                                Ok(event_json) => {
                                    yield Ok(Event::default().event(event_type).data(event_json));
                                }
                                Err(e) => {
                                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(session_id = %session_id, skipped, "SSE: Client lagged, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/sessions/:session_id/events", get(session_event_stream))
}
