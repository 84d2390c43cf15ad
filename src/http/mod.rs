// ABOUTME: Axum router wiring for the session gateway HTTP surface.
// ABOUTME: Routes: POST /sessions, GET /sessions/:token (upgrade or page), GET /health.

pub mod handlers;
pub mod templates;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use session_core::{Bridge, SessionManager, WsConfig};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub bridge: Bridge,
    pub ws_config: WsConfig,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{token}", get(handlers::get_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
