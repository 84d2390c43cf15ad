// ABOUTME: Route handlers for session creation, attach/render, and health.

use askama::Template;
use axum::{
    extract::ws::WebSocketUpgrade,
    extract::{FromRequestParts, Path, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use serde::{Deserialize, Serialize};

use super::templates::SessionTemplate;
use super::ws::AxumWsTransport;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub repo: String,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub endpoint: String,
}

pub async fn health() -> &'static str {
    "ok"
}

/// `POST /sessions` — allocates a token and registers a session; no I/O happens yet.
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let repo = if request.repo.trim().is_empty() {
        None
    } else {
        Some(request.repo)
    };

    let (token, endpoint) = state.manager.create(repo).await;
    tracing::info!(token = %token, "session created");

    (
        StatusCode::CREATED,
        Json(StartSessionResponse { endpoint }),
    )
}

/// `GET /sessions/:token` — upgrades to the PTY bridge, or renders the terminal
/// page, depending on whether the request carries a WebSocket upgrade.
pub async fn get_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
    request: Request,
) -> impl IntoResponse {
    let (mut parts, _body) = request.into_parts();
    let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &state).await;

    match upgrade {
        Ok(ws) => {
            let session = match state.manager.claim(&token).await {
                Some(session) => session,
                None if state.manager.exists(&token).await => {
                    return (StatusCode::UNAUTHORIZED, "session already claimed").into_response();
                }
                None => return (StatusCode::NOT_FOUND, "unknown session").into_response(),
            };

            let bridge = state.bridge;
            let manager = state.manager.clone();
            let write_timeout = state.ws_config.write_timeout;
            let token_for_log = token.clone();

            ws.max_message_size(state.ws_config.max_message_size)
                .on_upgrade(move |socket| async move {
                    let transport = Box::new(AxumWsTransport::new(socket, write_timeout));
                    if let Err(e) = bridge.run(session, transport).await {
                        tracing::warn!(token = %token_for_log, error = %e, "bridge exited with error");
                    }
                    manager.forget(&token_for_log).await;
                })
                .into_response()
        }
        Err(_) => {
            let template = SessionTemplate {
                ws_path: format!("sessions/{token}"),
                token,
            };
            match template.render() {
                Ok(body) => Html(body).into_response(),
                Err(e) => {
                    tracing::error!(error = %e, "failed to render session template");
                    (StatusCode::INTERNAL_SERVER_ERROR, "template error").into_response()
                }
            }
        }
    }
}
