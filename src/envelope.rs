//! Envelope — the universal wire message for wireboard.
//!
//! ARCHITECTURE
//! ============
//! Every message that crosses a whiteboard WebSocket is an Envelope, in both
//! directions. Clients send drawing events and cursor movement, the server
//! routes on `kind` ("type" on the wire), and everything fanned out to a
//! board — replay chunks, presence snapshots, appended events, errors — comes
//! back in the same shape.
//!
//! DESIGN
//! ======
//! - camelCase keys on the wire (`boardId`, `tempId`); `kind` serializes as
//!   `type` because that is what clients speak.
//! - `id` is assigned by persistence. Ephemeral messages never carry one.
//! - `board_id` and `user_id` on inbound envelopes are untrusted; the router
//!   overwrites both from the session identity before dispatch.
//! - `temp_id` is an opaque client correlation token. The server never reads
//!   it, only echoes it back on the persisted event.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// MESSAGE KINDS
// =============================================================================

/// Sent once after a successful handshake.
pub const KIND_CONNECTION_ESTABLISHED: &str = "CONNECTION_ESTABLISHED";

/// Wraps a freshly persisted event for fan-out. Data is `{"event": {...}}`.
pub const KIND_EVENT_APPEND: &str = "EVENT_APPEND";

/// One page of board history on connect. Data is `{"events": [...]}`.
pub const KIND_EVENT_REPLAY_CHUNK: &str = "EVENT_REPLAY_CHUNK";

/// Presence snapshot on connect. Data is `{"cursors": [...]}`.
pub const KIND_CURSORS_INIT: &str = "CURSORS_INIT";

/// Broadcast cursor state change. Data is `{"cursor": {...}}`.
pub const KIND_CURSOR_UPDATE: &str = "CURSOR_UPDATE";

/// Board wipe. Broadcast bare, never wrapped in an append.
pub const KIND_CLEAR_CANVAS: &str = "CLEAR_CANVAS";

/// Server-side failure report. Data is `{"message": "..."}`.
pub const KIND_ERROR: &str = "ERROR";

/// Client-sent cursor movement. Ephemeral, never persisted.
pub const KIND_CURSOR_MOVE: &str = "CURSOR_MOVE";

/// Data key for human-readable text on ERROR and connection messages.
pub const DATA_MESSAGE: &str = "message";

// =============================================================================
// TYPES
// =============================================================================

/// The universal message type.
///
/// Any `kind` outside the reserved set above is treated as a durable board
/// event (`STROKE_ADD`, `SHAPE_DELETE`, whatever the client invents) and goes
/// through the persist-then-broadcast path untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Durable identifier, assigned by the event store on append.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: String,
    /// Milliseconds since Unix epoch. Stamped server-side; whatever the
    /// client sent is discarded on receipt.
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Envelope {
    /// Create a server-originated envelope of the given kind with an empty
    /// object payload and a fresh timestamp.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            board_id: None,
            user_id: None,
            kind: kind.into(),
            ts: now_ms(),
            data: serde_json::Value::Object(serde_json::Map::new()),
            temp_id: None,
        }
    }

    /// Create an ERROR envelope from a plain message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(KIND_ERROR).with_data(serde_json::json!({ DATA_MESSAGE: message.into() }))
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Envelope {
    #[must_use]
    pub fn with_board_id(mut self, board_id: Uuid) -> Self {
        self.board_id = Some(board_id);
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_kind_and_timestamp() {
        let env = Envelope::new(KIND_CLEAR_CANVAS);
        assert_eq!(env.kind, KIND_CLEAR_CANVAS);
        assert!(env.ts > 0);
        assert!(env.id.is_none());
        assert!(env.data.is_object());
    }

    #[test]
    fn wire_keys_are_camel_case() {
        let board_id = Uuid::new_v4();
        let env = Envelope::new("STROKE_ADD").with_board_id(board_id);
        let json = serde_json::to_value(&env).expect("serialize");

        assert_eq!(json["type"], "STROKE_ADD");
        assert_eq!(json["boardId"], board_id.to_string());
        assert!(json.get("ts").is_some());
    }

    #[test]
    fn absent_options_are_omitted() {
        let env = Envelope::new(KIND_ERROR);
        let json = serde_json::to_string(&env).expect("serialize");

        assert!(!json.contains("\"id\""));
        assert!(!json.contains("boardId"));
        assert!(!json.contains("userId"));
        assert!(!json.contains("tempId"));
    }

    #[test]
    fn minimal_client_message_parses() {
        let env: Envelope =
            serde_json::from_str(r#"{"type":"CURSOR_MOVE","data":{"x":1,"y":2}}"#).expect("parse");

        assert_eq!(env.kind, KIND_CURSOR_MOVE);
        assert_eq!(env.ts, 0);
        assert!(env.id.is_none());
        assert!(env.temp_id.is_none());
        assert_eq!(env.data["x"], 1);
    }

    #[test]
    fn temp_id_round_trips() {
        let json = r#"{"type":"STROKE_ADD","data":{},"tempId":"local-7"}"#;
        let env: Envelope = serde_json::from_str(json).expect("parse");
        assert_eq!(env.temp_id.as_deref(), Some("local-7"));

        let out = serde_json::to_value(&env).expect("serialize");
        assert_eq!(out["tempId"], "local-7");
    }

    #[test]
    fn error_carries_message() {
        let env = Envelope::error("Missing token");
        assert_eq!(env.kind, KIND_ERROR);
        assert_eq!(env.data[DATA_MESSAGE], "Missing token");
    }
}
