//! HTTP routes for PDFX Server

pub mod health;

use axum::Router;

use crate::state::AppState;
use crate::transport;

/// Every HTTP route: the SSE transport plus health and metrics
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(transport::sse::router())
}
