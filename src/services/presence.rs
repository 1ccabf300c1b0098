//! Presence service — live cursors and user colors per board.
//!
//! DESIGN
//! ======
//! Presence is rebuilt from scratch on every connect: a joining user starts
//! at the default position and the tracker forgets them on disconnect.
//! Nothing here touches persistence.
//!
//! Cursors live in a two-level lock-striped map (board → user → cursor) so a
//! board's snapshot never scans other boards. Color assignments are the one
//! deliberate process-lifetime leftover: a user keeps their color across
//! reconnects and across boards so peers see a stable identity.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::envelope::{Envelope, KIND_CURSOR_UPDATE, now_ms};

/// Colors handed out to users, most-distinct first set from the client theme.
pub const CURSOR_PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9",
];

/// Where a cursor sits until its user first moves it.
pub const DEFAULT_CURSOR_X: f64 = 100.0;
pub const DEFAULT_CURSOR_Y: f64 = 100.0;

// =============================================================================
// TYPES
// =============================================================================

/// One user's live cursor on one board.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPresence {
    pub user_id: Uuid,
    pub user_name: String,
    pub user_color: String,
    pub x: f64,
    pub y: f64,
    /// Milliseconds since Unix epoch of the last init or move.
    pub last_updated: i64,
    pub is_active: bool,
}

/// What a `CURSOR_UPDATE` broadcast announces about its cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    Join,
    Move,
    Leave,
}

impl CursorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CursorKind::Join => "JOIN",
            CursorKind::Move => "MOVE",
            CursorKind::Leave => "LEAVE",
        }
    }
}

// =============================================================================
// TRACKER
// =============================================================================

/// Live cursor state for every board in the process. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    boards: Arc<DashMap<Uuid, HashMap<Uuid, CursorPresence>>>,
    colors: Arc<DashMap<Uuid, String>>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a user's cursor at the default position on join.
    ///
    /// A second init for the same (board, user) replaces the previous cursor,
    /// which is what a reconnect wants.
    pub fn init(&self, board_id: Uuid, user_id: Uuid, user_name: &str, color: &str) -> CursorPresence {
        let cursor = CursorPresence {
            user_id,
            user_name: user_name.to_owned(),
            user_color: color.to_owned(),
            x: DEFAULT_CURSOR_X,
            y: DEFAULT_CURSOR_Y,
            last_updated: now_ms(),
            is_active: true,
        };
        self.boards
            .entry(board_id)
            .or_default()
            .insert(user_id, cursor.clone());
        cursor
    }

    /// Move a user's cursor, returning the updated record.
    ///
    /// Returns `None` when the user has no presence on the board (a move
    /// racing a disconnect); callers ignore that silently.
    pub fn update(&self, board_id: Uuid, user_id: Uuid, x: f64, y: f64) -> Option<CursorPresence> {
        let mut group = self.boards.get_mut(&board_id)?;
        let cursor = group.get_mut(&user_id)?;
        cursor.x = x;
        cursor.y = y;
        cursor.last_updated = now_ms();
        Some(cursor.clone())
    }

    /// Drop a user's cursor, returning it if it existed. Removing the last
    /// cursor of a board drops the board's presence group entirely.
    pub fn remove(&self, board_id: Uuid, user_id: Uuid) -> Option<CursorPresence> {
        let Entry::Occupied(mut group) = self.boards.entry(board_id) else {
            return None;
        };
        let removed = group.get_mut().remove(&user_id);
        if group.get().is_empty() {
            group.remove();
        }
        removed
    }

    /// Point-in-time list of every cursor on a board.
    #[must_use]
    pub fn snapshot(&self, board_id: Uuid) -> Vec<CursorPresence> {
        self.boards
            .get(&board_id)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The user's palette color, assigned on first sight and memoized for the
    /// life of the process.
    ///
    /// A new user prefers a color nobody else holds; once all ten are taken,
    /// any palette color goes.
    pub fn color_for(&self, user_id: Uuid) -> String {
        if let Some(color) = self.colors.get(&user_id) {
            return color.clone();
        }

        let assigned: Vec<String> = self.colors.iter().map(|e| e.value().clone()).collect();
        let unused: Vec<&str> = CURSOR_PALETTE
            .iter()
            .copied()
            .filter(|candidate| !assigned.iter().any(|taken| taken == candidate))
            .collect();

        let mut rng = rand::rng();
        let pick = if unused.is_empty() {
            CURSOR_PALETTE[rng.random_range(0..CURSOR_PALETTE.len())]
        } else {
            unused[rng.random_range(0..unused.len())]
        };

        // First writer wins if two sessions of the same user race here.
        self.colors
            .entry(user_id)
            .or_insert_with(|| pick.to_owned())
            .clone()
    }
}

// =============================================================================
// BROADCAST PAYLOAD
// =============================================================================

/// Build the `CURSOR_UPDATE` broadcast for one presence change.
#[must_use]
pub fn cursor_update(board_id: Uuid, cursor: &CursorPresence, kind: CursorKind) -> Envelope {
    Envelope::new(KIND_CURSOR_UPDATE)
        .with_board_id(board_id)
        .with_user_id(cursor.user_id)
        .with_data(json!({
            "cursor": {
                "userId": cursor.user_id,
                "userName": cursor.user_name,
                "userColor": cursor.user_color,
                "x": cursor.x,
                "y": cursor.y,
                "timestamp": cursor.last_updated,
                "eventType": kind.as_str(),
            }
        }))
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
