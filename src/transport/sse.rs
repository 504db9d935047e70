//! SSE transport
//!
//! `GET /sse` (or `/mcp`) opens a session. The first event is `endpoint`,
//! whose data is the URL the client posts its messages to; every later
//! event is a `message` carrying one JSON-RPC response or notification.
//! When the client drops the stream the session is closed.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use super::SESSION_HEADER;
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::error::{AppError, Result};
use crate::session::{CloseReason, SessionId};
use crate::state::AppState;

/// Create the SSE transport router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sse", get(open_stream))
        .route("/mcp", get(open_stream))
        .route("/messages", post(post_message).delete(delete_session))
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

/// Closes the session when the SSE stream is dropped
struct DisconnectGuard {
    dispatcher: Dispatcher,
    session_id: SessionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let dispatcher = self.dispatcher.clone();
        let session_id = self.session_id;
        runtime.spawn(async move {
            if dispatcher
                .close_session(&session_id, CloseReason::Transport)
                .await
            {
                tracing::info!(session_id = %session_id, "SSE client disconnected");
            }
        });
    }
}

/// Open a session and stream its outbound messages
async fn open_stream(State(state): State<AppState>) -> impl IntoResponse {
    let dispatcher = state.dispatcher().clone();
    let (session_id, mut rx) = dispatcher.connect();
    let endpoint = format!("/messages?session_id={}", session_id);

    tracing::info!(session_id = %session_id, "SSE client connected");

    let guard = DisconnectGuard {
        dispatcher,
        session_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;

        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));

        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => yield Ok(Event::default().event("message").data(json)),
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Failed to serialize SSE event");
                }
            }
        }
    };

    let keep_alive = KeepAlive::new().interval(state.config().server.keepalive_interval);
    (
        [(SESSION_HEADER, session_id.to_string())],
        Sse::new(stream).keep_alive(keep_alive),
    )
}

/// Hand a client message to its session; the answer arrives on the stream
async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode> {
    let session_id = resolve_session(&query, &headers)?;

    state
        .dispatcher()
        .handle_message(&session_id, &body)
        .await
        .map_err(|e| match e {
            DispatchError::SessionNotFound(id) => AppError::SessionNotFound(id),
        })?;

    Ok(StatusCode::ACCEPTED)
}

/// Explicitly end a session
async fn delete_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let session_id = resolve_session(&query, &headers)?;

    if !state
        .dispatcher()
        .close_session(&session_id, CloseReason::Client)
        .await
    {
        return Err(AppError::SessionNotFound(session_id.to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Session id from the query string, else from the session header
fn resolve_session(query: &SessionQuery, headers: &HeaderMap) -> Result<SessionId> {
    let raw = query
        .session_id
        .clone()
        .or_else(|| {
            headers
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .ok_or_else(|| AppError::BadRequest("missing session_id".to_string()))?;

    SessionId::parse(&raw).ok_or(AppError::SessionNotFound(raw))
}
