//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::lobby::LobbyError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::LobbySnapshot;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // The timeout covers the upgrade response only, not the socket that follows
    let timeout = TimeoutLayer::new(state.config.request_timeout);

    Router::new()
        .route("/health", get(health_handler))
        .route("/lobby", get(lobby_handler))
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new())
                .layer(timeout),
        )
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    players_online: usize,
    lobby_size: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.lobby.stats();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: stats.active_rooms,
        players_online: stats.players_online,
        lobby_size: stats.lobby_size,
    })
}

// ============================================================================
// Lobby endpoint
// ============================================================================

async fn lobby_handler(State(state): State<AppState>) -> Json<LobbySnapshot> {
    Json(state.lobby.snapshot())
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<LobbyError> for AppError {
    fn from(err: LobbyError) -> Self {
        match err {
            LobbyError::DuplicateName(_) => AppError::Conflict(err.to_string()),
            LobbyError::UnknownRoom(_) => AppError::NotFound(err.to_string()),
            LobbyError::EmptyName | LobbyError::NameTooLong => AppError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lobby_errors_map_to_status_codes() {
        let cases = [
            (LobbyError::DuplicateName("ann".into()), StatusCode::CONFLICT),
            (LobbyError::EmptyName, StatusCode::BAD_REQUEST),
            (LobbyError::NameTooLong, StatusCode::BAD_REQUEST),
            (LobbyError::UnknownRoom(4), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
