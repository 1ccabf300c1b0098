//! Whiteboard REST routes — listing, creation, membership, deletion.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::auth::AuthUser;
use crate::services::board::{self, BoardMember, BoardRow, BoardSummary};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateBoardBody {
    pub name: String,
}

/// `GET /api/v1/whiteboards` — every board, annotated with the caller's
/// relationship to it.
pub async fn list_boards(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<BoardSummary>>, StatusCode> {
    let boards = board::list_boards(&state.pool, auth.user_id)
        .await
        .map_err(board_error_to_status)?;

    Ok(Json(boards))
}

/// `POST /api/v1/whiteboards` — create a board owned by the caller.
pub async fn create_board(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateBoardBody>,
) -> Result<(StatusCode, Json<BoardRow>), StatusCode> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let created = board::create_board(&state.pool, name, auth.user_id)
        .await
        .map_err(board_error_to_status)?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/v1/whiteboards/:id` — fetch one board. Fetching it also makes
/// the caller a member, so a shared link is enough to get in.
pub async fn get_board(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(board_id): Path<Uuid>,
) -> Result<Json<BoardSummary>, StatusCode> {
    let summary = board::get_board(&state.pool, board_id, auth.user_id)
        .await
        .map_err(board_error_to_status)?;

    Ok(Json(summary))
}

/// `POST /api/v1/whiteboards/:id/join` — explicit membership. Conflicts if
/// the caller already joined.
pub async fn join_board(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(board_id): Path<Uuid>,
) -> Result<Json<BoardMember>, StatusCode> {
    board::join_board(&state.pool, board_id, auth.user_id)
        .await
        .map_err(board_error_to_status)?;

    Ok(Json(BoardMember {
        user_id: auth.user_id,
        name: auth.name,
        is_owner: false,
    }))
}

/// `GET /api/v1/whiteboards/:id/members` — member list in join order.
pub async fn list_members(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(board_id): Path<Uuid>,
) -> Result<Json<Vec<BoardMember>>, StatusCode> {
    let members = board::list_members(&state.pool, board_id)
        .await
        .map_err(board_error_to_status)?;

    Ok(Json(members))
}

/// `DELETE /api/v1/whiteboards/:id` — owner only. Members and the event
/// history go with it.
pub async fn delete_board(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(board_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    board::delete_board(&state.pool, board_id, auth.user_id)
        .await
        .map_err(board_error_to_status)?;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn board_error_to_status(err: board::BoardError) -> StatusCode {
    match err {
        board::BoardError::NotFound(_) => StatusCode::NOT_FOUND,
        board::BoardError::AlreadyMember(_) => StatusCode::CONFLICT,
        board::BoardError::NotOwner => StatusCode::FORBIDDEN,
        board::BoardError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "boards_test.rs"]
mod tests;
