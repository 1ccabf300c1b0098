//! Session registry — who is connected to which board, and board fan-out.
//!
//! DESIGN
//! ======
//! Two lock-striped maps, both keyed by UUID:
//! - `sessions`: session id → (board id, user id). One entry per live socket.
//! - `groups`: board id → session id → outbound handle. The unit of fan-out.
//!
//! Registration and deregistration touch a board's group under its shard
//! lock, so a concurrent fan-out snapshot sees the group either before or
//! after the change, never mid-mutation. Deregistration is idempotent; the
//! close path runs it unconditionally and double closes are harmless.
//! Removing the last session of a board removes the group entry itself, so
//! an idle process holds no per-board residue.
//!
//! Fan-out is best-effort: delivery goes through each session's bounded
//! channel with a non-blocking send. A closed or saturated session loses the
//! message (logged) without stalling delivery to the rest of the board.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::envelope::Envelope;

// =============================================================================
// SESSION HANDLE
// =============================================================================

/// Outbound side of one live connection.
///
/// Cheap to clone; fan-out clones handles out of the registry snapshot and
/// sends without holding any lock.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    tx: mpsc::Sender<Envelope>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(session_id: Uuid, tx: mpsc::Sender<Envelope>) -> Self {
        Self { session_id, tx }
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// False once the receiving pump has dropped its end.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue an envelope without blocking.
    ///
    /// # Errors
    ///
    /// Returns the envelope back if the session's buffer is full or closed.
    pub fn send(&self, envelope: Envelope) -> Result<(), mpsc::error::TrySendError<Envelope>> {
        self.tx.try_send(envelope)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Process-local map of live sessions. Clones share the same underlying maps.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, (Uuid, Uuid)>>,
    groups: Arc<DashMap<Uuid, HashMap<Uuid, SessionHandle>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to its board group. Called once per admitted connection,
    /// before anything is broadcast on its behalf.
    pub fn register(&self, session_id: Uuid, board_id: Uuid, user_id: Uuid, handle: SessionHandle) {
        self.sessions.insert(session_id, (board_id, user_id));
        self.groups
            .entry(board_id)
            .or_default()
            .insert(session_id, handle);
    }

    /// Remove a session, returning its (board, user) identity.
    ///
    /// Idempotent: a second call for the same session returns `None` and
    /// changes nothing.
    pub fn deregister(&self, session_id: Uuid) -> Option<(Uuid, Uuid)> {
        let (board_id, user_id) = self.sessions.remove(&session_id)?.1;
        if let Entry::Occupied(mut group) = self.groups.entry(board_id) {
            group.get_mut().remove(&session_id);
            if group.get().is_empty() {
                group.remove();
            }
        }
        Some((board_id, user_id))
    }

    #[must_use]
    pub fn board_of(&self, session_id: Uuid) -> Option<Uuid> {
        self.sessions.get(&session_id).map(|entry| entry.0)
    }

    #[must_use]
    pub fn user_of(&self, session_id: Uuid) -> Option<Uuid> {
        self.sessions.get(&session_id).map(|entry| entry.1)
    }

    /// Point-in-time snapshot of a board's outbound handles.
    ///
    /// The returned vector is owned; joins and leaves after the snapshot do
    /// not affect a fan-out already in flight.
    #[must_use]
    pub fn sessions_of(&self, board_id: Uuid) -> Vec<SessionHandle> {
        self.groups
            .get(&board_id)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Live session count for one board. Used for join/leave logging.
    #[must_use]
    pub fn board_population(&self, board_id: Uuid) -> usize {
        self.groups.get(&board_id).map_or(0, |group| group.len())
    }

    /// Total live sessions across all boards.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Deliver an envelope to every live session of a board, sender included.
///
/// Snapshots the group first, then sends to each handle independently:
/// already-closed sessions are skipped, and a failed send (full buffer, or a
/// session that closed between snapshot and send) is logged and does not
/// abort delivery to the rest.
pub fn broadcast(registry: &SessionRegistry, board_id: Uuid, envelope: &Envelope) {
    for handle in registry.sessions_of(board_id) {
        if !handle.is_open() {
            continue;
        }
        if let Err(err) = handle.send(envelope.clone()) {
            warn!(
                session_id = %handle.session_id(),
                %board_id,
                kind = %envelope.kind,
                error = %err,
                "broadcast delivery failed"
            );
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
