//! Event store — durable board history behind a trait seam.
//!
//! DESIGN
//! ======
//! The realtime engine never talks to Postgres directly; it holds an
//! `Arc<dyn EventStore>` so tests swap in an in-memory fake. One row per
//! event, payload stored as JSONB exactly as received, ordered for replay by
//! (ts, id) so same-millisecond events keep a stable order.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::envelope::Envelope;

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable storage consumed by the router and the replay service.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event and return the envelope as stored, durable id
    /// assigned. `temp_id` is never persisted; the caller re-attaches it.
    ///
    /// # Errors
    ///
    /// Fails when the write fails; the caller reports it to the sender only.
    async fn append(
        &self,
        board_id: Uuid,
        user_id: Uuid,
        kind: &str,
        data: serde_json::Value,
        ts: i64,
    ) -> Result<Envelope, EventStoreError>;

    /// Oldest-first page of a board's history, at most `limit` events.
    ///
    /// # Errors
    ///
    /// Fails when the read fails; replay swallows it.
    async fn list_oldest(&self, board_id: Uuid, limit: i64) -> Result<Vec<Envelope>, EventStoreError>;

    /// Wipe a board's history, returning the number of removed events.
    ///
    /// # Errors
    ///
    /// Fails when the delete fails; the caller reports it to the sender only.
    async fn delete_all(&self, board_id: Uuid) -> Result<u64, EventStoreError>;
}

/// Postgres-backed store used in production.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(
        &self,
        board_id: Uuid,
        user_id: Uuid,
        kind: &str,
        data: serde_json::Value,
        ts: i64,
    ) -> Result<Envelope, EventStoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO events (id, board_id, user_id, kind, ts, data)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(board_id)
        .bind(user_id)
        .bind(kind)
        .bind(ts)
        .bind(&data)
        .execute(&self.pool)
        .await?;

        Ok(Envelope {
            id: Some(id),
            board_id: Some(board_id),
            user_id: Some(user_id),
            kind: kind.to_owned(),
            ts,
            data,
            temp_id: None,
        })
    }

    async fn list_oldest(&self, board_id: Uuid, limit: i64) -> Result<Vec<Envelope>, EventStoreError> {
        let rows = sqlx::query(
            "SELECT id, board_id, user_id, kind, ts, data
             FROM events
             WHERE board_id = $1
             ORDER BY ts ASC, id ASC
             LIMIT $2",
        )
        .bind(board_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Envelope {
                id: Some(row.get("id")),
                board_id: Some(row.get("board_id")),
                user_id: Some(row.get("user_id")),
                kind: row.get("kind"),
                ts: row.get("ts"),
                data: row.get("data"),
                temp_id: None,
            })
            .collect())
    }

    async fn delete_all(&self, board_id: Uuid) -> Result<u64, EventStoreError> {
        let result = sqlx::query("DELETE FROM events WHERE board_id = $1")
            .bind(board_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
