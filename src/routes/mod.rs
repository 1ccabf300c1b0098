//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Everything hangs off one Axum router: the versioned REST surface under
//! `/api/v1`, the websocket endpoint at both its versioned path and the bare
//! `/ws/whiteboard/{board_id}` older clients still dial, and a healthz probe.
//! CORS is wide open; auth happens per request via bearer tokens, not at the
//! transport layer.

pub mod auth;
pub mod boards;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Versioned API surface, nested under `/api/v1`.
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/validate", get(auth::validate))
        .route("/whiteboards", get(boards::list_boards).post(boards::create_board))
        .route(
            "/whiteboards/{board_id}",
            get(boards::get_board).delete(boards::delete_board),
        )
        .route("/whiteboards/{board_id}/join", post(boards::join_board))
        .route("/whiteboards/{board_id}/members", get(boards::list_members))
        .route("/ws/whiteboard/{board_id}", get(ws::handle_ws))
}

/// The complete application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/v1", api_routes())
        .route("/ws/whiteboard/{board_id}", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
