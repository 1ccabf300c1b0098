//! Replay — bring a freshly admitted session up to date.
//!
//! One bounded page of history (oldest first) plus the live presence
//! snapshot. Deeper history is a REST concern; the realtime path stays
//! single-shot on purpose.

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::envelope::{Envelope, KIND_CURSORS_INIT, KIND_EVENT_REPLAY_CHUNK};
use crate::services::event::EventStore;
use crate::state::AppState;

/// Build the catch-up messages for a new session: an `EVENT_REPLAY_CHUNK`
/// when the board has history, then `CURSORS_INIT` with everyone's cursor.
///
/// Replay must never take a connection down: a failed history fetch is
/// logged, the backlog comes back empty, and the session joins anyway.
pub async fn backlog(state: &AppState, board_id: Uuid) -> Vec<Envelope> {
    let limit = i64::try_from(state.replay_chunk_size).unwrap_or(i64::MAX);
    let history = match state.events.list_oldest(board_id, limit).await {
        Ok(history) => history,
        Err(err) => {
            warn!(%board_id, error = %err, "event replay failed; session joins without backlog");
            return Vec::new();
        }
    };

    let mut messages = Vec::with_capacity(2);
    if !history.is_empty() {
        messages.push(
            Envelope::new(KIND_EVENT_REPLAY_CHUNK)
                .with_board_id(board_id)
                .with_data(json!({ "events": history })),
        );
    }
    messages.push(
        Envelope::new(KIND_CURSORS_INIT)
            .with_board_id(board_id)
            .with_data(json!({ "cursors": state.presence.snapshot(board_id) })),
    );
    messages
}

#[cfg(test)]
#[path = "replay_test.rs"]
mod tests;
