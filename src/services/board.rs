//! Board service — boards, membership, and the realtime access gate.
//!
//! DESIGN
//! ======
//! Boards are public to list; membership is what the realtime layer keys on,
//! and membership is freely obtainable (fetching a board auto-joins you, or
//! call the join endpoint). Ownership only matters for deletion. Deleting a
//! board cascades its members and its event history at the schema level.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("board {0} not found")]
    NotFound(Uuid),
    #[error("already a member of board {0}")]
    AlreadyMember(Uuid),
    #[error("only the board owner can do that")]
    NotOwner,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

/// Board as stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRow {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
}

/// Board plus the caller's relationship to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub is_member: bool,
    pub is_owner: bool,
}

/// One row of the members endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMember {
    pub user_id: Uuid,
    pub name: String,
    pub is_owner: bool,
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Create a board; the creator becomes its owner member in the same
/// transaction.
///
/// # Errors
///
/// Database failures only.
pub async fn create_board(pool: &PgPool, name: &str, owner_id: Uuid) -> Result<BoardRow, BoardError> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO boards (id, name, owner_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(owner_id)
        .execute(tx.as_mut())
        .await?;
    sqlx::query("INSERT INTO board_members (board_id, user_id, is_owner) VALUES ($1, $2, TRUE)")
        .bind(id)
        .bind(owner_id)
        .execute(tx.as_mut())
        .await?;
    tx.commit().await?;

    Ok(BoardRow {
        id,
        name: name.to_owned(),
        owner_id,
    })
}

/// Every board, newest first, annotated with the caller's relationship.
///
/// # Errors
///
/// Database failures only.
pub async fn list_boards(pool: &PgPool, user_id: Uuid) -> Result<Vec<BoardSummary>, BoardError> {
    let rows = sqlx::query(
        "SELECT b.id, b.name, b.owner_id, u.name AS owner_name,
                m.user_id IS NOT NULL AS is_member,
                COALESCE(m.is_owner, FALSE) AS is_owner
         FROM boards b
         JOIN users u ON u.id = b.owner_id
         LEFT JOIN board_members m ON m.board_id = b.id AND m.user_id = $1
         ORDER BY b.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| BoardSummary {
            id: row.get("id"),
            name: row.get("name"),
            owner_id: row.get("owner_id"),
            owner_name: row.get("owner_name"),
            is_member: row.get("is_member"),
            is_owner: row.get("is_owner"),
        })
        .collect())
}

/// Fetch one board. Visiting a board makes the caller a member, which is
/// what the realtime access gate keys on.
///
/// # Errors
///
/// `NotFound` for an unknown board.
pub async fn get_board(pool: &PgPool, board_id: Uuid, user_id: Uuid) -> Result<BoardSummary, BoardError> {
    let Some(row) = sqlx::query(
        "SELECT b.id, b.name, b.owner_id, u.name AS owner_name
         FROM boards b
         JOIN users u ON u.id = b.owner_id
         WHERE b.id = $1",
    )
    .bind(board_id)
    .fetch_optional(pool)
    .await?
    else {
        return Err(BoardError::NotFound(board_id));
    };

    sqlx::query("INSERT INTO board_members (board_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(board_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    let owner_id: Uuid = row.get("owner_id");
    Ok(BoardSummary {
        id: row.get("id"),
        name: row.get("name"),
        owner_id,
        owner_name: row.get("owner_name"),
        is_member: true,
        is_owner: owner_id == user_id,
    })
}

/// Explicit join.
///
/// # Errors
///
/// `NotFound` for an unknown board, `AlreadyMember` on a repeat join.
pub async fn join_board(pool: &PgPool, board_id: Uuid, user_id: Uuid) -> Result<(), BoardError> {
    ensure_board_exists(pool, board_id).await?;

    let result =
        sqlx::query("INSERT INTO board_members (board_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(board_id)
            .bind(user_id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(BoardError::AlreadyMember(board_id));
    }
    Ok(())
}

/// Delete a board and everything under it. Owner only.
///
/// # Errors
///
/// `NotFound` for an unknown board, `NotOwner` for anyone but the owner.
pub async fn delete_board(pool: &PgPool, board_id: Uuid, user_id: Uuid) -> Result<(), BoardError> {
    let Some(row) = sqlx::query("SELECT owner_id FROM boards WHERE id = $1")
        .bind(board_id)
        .fetch_optional(pool)
        .await?
    else {
        return Err(BoardError::NotFound(board_id));
    };

    let owner_id: Uuid = row.get("owner_id");
    if owner_id != user_id {
        return Err(BoardError::NotOwner);
    }

    sqlx::query("DELETE FROM boards WHERE id = $1")
        .bind(board_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Member list in join order.
///
/// # Errors
///
/// `NotFound` for an unknown board.
pub async fn list_members(pool: &PgPool, board_id: Uuid) -> Result<Vec<BoardMember>, BoardError> {
    ensure_board_exists(pool, board_id).await?;

    let rows = sqlx::query(
        "SELECT m.user_id, u.name, m.is_owner
         FROM board_members m
         JOIN users u ON u.id = m.user_id
         WHERE m.board_id = $1
         ORDER BY m.joined_at ASC",
    )
    .bind(board_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| BoardMember {
            user_id: row.get("user_id"),
            name: row.get("name"),
            is_owner: row.get("is_owner"),
        })
        .collect())
}

async fn ensure_board_exists(pool: &PgPool, board_id: Uuid) -> Result<(), BoardError> {
    let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM boards WHERE id = $1) AS found")
        .bind(board_id)
        .fetch_one(pool)
        .await?;
    if row.get::<bool, _>("found") {
        Ok(())
    } else {
        Err(BoardError::NotFound(board_id))
    }
}

// =============================================================================
// REALTIME ACCESS GATE
// =============================================================================

/// Gate consulted once per WebSocket handshake.
#[async_trait]
pub trait BoardAccess: Send + Sync {
    /// Whether the user may open a realtime session on the board. Denial is
    /// `Ok(false)`; `Err` means the check itself could not run.
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    async fn has_access(&self, board_id: Uuid, user_id: Uuid) -> Result<bool, BoardError>;
}

/// Membership-backed gate used in production.
#[derive(Debug, Clone)]
pub struct PgBoardAccess {
    pool: PgPool,
}

impl PgBoardAccess {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BoardAccess for PgBoardAccess {
    async fn has_access(&self, board_id: Uuid, user_id: Uuid) -> Result<bool, BoardError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM board_members WHERE board_id = $1 AND user_id = $2) AS allowed",
        )
        .bind(board_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("allowed"))
    }
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
