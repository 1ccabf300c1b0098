//! WebSocket route — admission, catch-up, and the per-session message loop.
//!
//! DESIGN
//! ======
//! The upgrade itself always succeeds; admission runs on the open socket, so
//! a rejected client receives one structured ERROR envelope followed by a
//! close frame with the matching code — the same shape every later failure
//! takes. Admitted connections register an outbound channel with the session
//! registry and enter a `select!` loop:
//! - Inbound text frames → parse + route by envelope kind
//! - Envelopes fanned out by board peers → forward to the socket
//!
//! Routing functions are pure decisions: they validate, touch presence or
//! persistence, and return an `Outcome`. The caller owns delivery — fanout
//! for outcomes, an ERROR reply to the originating socket for failures.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → admission (token present, token valid, path, board access)
//! 2. Register session + presence → replay → `CONNECTION_ESTABLISHED`
//! 3. Broadcast JOIN → steady-state routed loop
//! 4. Close → deregister, drop presence, broadcast LEAVE

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::envelope::{
    DATA_MESSAGE, Envelope, KIND_CLEAR_CANVAS, KIND_CONNECTION_ESTABLISHED, KIND_CURSOR_MOVE,
    KIND_EVENT_APPEND, now_ms,
};
use crate::services::board::BoardAccess;
use crate::services::event::{EventStore, EventStoreError};
use crate::services::presence::{CursorKind, cursor_update};
use crate::services::session::SessionHandle;
use crate::services::{replay, session};
use crate::state::AppState;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Admission and registration violations.
const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// The server failed, not the client.
const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// The transport misbehaved mid-session.
const CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// Outbound envelopes buffered per session. A session lagging this far
/// behind starts losing broadcasts instead of stalling the board.
const OUTBOUND_BUFFER: usize = 256;

// =============================================================================
// ADMISSION
// =============================================================================

/// Why a handshake was turned away. Ordered: the first failing check wins
/// and later checks never run.
#[derive(Debug, PartialEq, Eq)]
enum AdmissionError {
    MissingToken,
    InvalidToken,
    InvalidPath,
    NoAccess,
    /// The access check itself failed; the client did nothing wrong.
    Internal(String),
}

impl AdmissionError {
    /// Client-visible message. Clients match on these strings exactly.
    fn message(&self) -> String {
        match self {
            Self::MissingToken => "Missing token".into(),
            Self::InvalidToken => "Invalid token".into(),
            Self::InvalidPath => "Invalid path format".into(),
            Self::NoAccess => "No access to board".into(),
            Self::Internal(detail) => format!("Internal error: {detail}"),
        }
    }

    fn close_code(&self) -> u16 {
        match self {
            Self::Internal(_) => CLOSE_INTERNAL_ERROR,
            _ => CLOSE_POLICY_VIOLATION,
        }
    }
}

/// Identity of a connection that passed every admission check.
#[derive(Debug)]
struct Admitted {
    board_id: Uuid,
    user_id: Uuid,
    user_name: String,
}

/// Run the admission checks in order: token present, token valid, board id
/// well-formed, board accessible.
async fn admit(
    state: &AppState,
    raw_board_id: &str,
    params: &HashMap<String, String>,
) -> Result<Admitted, AdmissionError> {
    let token = params
        .get("token")
        .map(String::as_str)
        .filter(|token| !token.is_empty())
        .ok_or(AdmissionError::MissingToken)?;

    let claims = state
        .tokens
        .verify(token)
        .map_err(|_| AdmissionError::InvalidToken)?;

    let board_id: Uuid = raw_board_id
        .parse()
        .map_err(|_| AdmissionError::InvalidPath)?;

    let allowed = state
        .access
        .has_access(board_id, claims.sub)
        .await
        .map_err(|err| AdmissionError::Internal(err.to_string()))?;
    if !allowed {
        return Err(AdmissionError::NoAccess);
    }

    Ok(Admitted {
        board_id,
        user_id: claims.sub,
        user_name: claims.name,
    })
}

// =============================================================================
// UPGRADE
// =============================================================================

/// `GET /ws/whiteboard/{board_id}?token=<jwt>` — upgrade and run a session.
pub async fn handle_ws(
    State(state): State<AppState>,
    Path(raw_board_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state, raw_board_id, params))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_session(
    mut socket: WebSocket,
    state: AppState,
    raw_board_id: String,
    params: HashMap<String, String>,
) {
    let admitted = match admit(&state, &raw_board_id, &params).await {
        Ok(admitted) => admitted,
        Err(err) => {
            warn!(board = %raw_board_id, reason = %err.message(), "ws: admission rejected");
            let _ = send_envelope(&mut socket, &Envelope::error(err.message())).await;
            send_close(&mut socket, err.close_code(), &err.message()).await;
            return;
        }
    };

    let Admitted {
        board_id,
        user_id,
        user_name,
    } = admitted;
    let session_id = Uuid::new_v4();

    // Per-session channel for envelopes fanned out by board peers.
    let (tx, mut rx) = mpsc::channel::<Envelope>(OUTBOUND_BUFFER);
    state
        .registry
        .register(session_id, board_id, user_id, SessionHandle::new(session_id, tx));

    let color = state.presence.color_for(user_id);
    let cursor = state.presence.init(board_id, user_id, &user_name, &color);

    info!(
        %session_id,
        %board_id,
        %user_id,
        peers = state.registry.board_population(board_id),
        "ws: session joined"
    );

    // Catch-up and confirmation go straight to the socket, before any live
    // traffic the channel may already be buffering.
    let mut opening = replay::backlog(&state, board_id).await;
    opening.push(
        Envelope::new(KIND_CONNECTION_ESTABLISHED)
            .with_board_id(board_id)
            .with_user_id(user_id)
            .with_data(json!({ DATA_MESSAGE: "Connected to whiteboard" })),
    );
    for envelope in &opening {
        if send_envelope(&mut socket, envelope).await.is_err() {
            cleanup(&state, session_id);
            return;
        }
    }

    session::broadcast(
        &state.registry,
        board_id,
        &cursor_update(board_id, &cursor, CursorKind::Join),
    );

    pump(&state, &mut socket, &mut rx, session_id, board_id, user_id).await;

    cleanup(&state, session_id);
}

/// Steady-state loop: inbound frames get routed, fanned-out envelopes get
/// forwarded. Runs until the peer goes away or the server decides to close.
async fn pump(
    state: &AppState,
    socket: &mut WebSocket,
    rx: &mut mpsc::Receiver<Envelope>,
    session_id: Uuid,
    board_id: Uuid,
    user_id: Uuid,
) {
    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    None => break,
                    Some(Err(err)) => {
                        warn!(%session_id, error = %err, "ws: transport error");
                        send_close(socket, CLOSE_PROTOCOL_ERROR, "transport error").await;
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        // A session the registry no longer knows must not
                        // keep routing on a stale identity.
                        if state.registry.board_of(session_id).is_none() {
                            warn!(%session_id, "ws: message on a deregistered session");
                            send_close(socket, CLOSE_POLICY_VIOLATION, "session not registered").await;
                            break;
                        }
                        if let Some(reply) = process_text(state, board_id, user_id, &text).await {
                            if send_envelope(socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
            Some(envelope) = rx.recv() => {
                if send_envelope(socket, &envelope).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Tear down one session. Idempotent: safe to run for a session that was
/// already removed, in which case nothing is broadcast.
fn cleanup(state: &AppState, session_id: Uuid) {
    let Some((board_id, user_id)) = state.registry.deregister(session_id) else {
        return;
    };
    if let Some(cursor) = state.presence.remove(board_id, user_id) {
        session::broadcast(
            &state.registry,
            board_id,
            &cursor_update(board_id, &cursor, CursorKind::Leave),
        );
    }
    info!(
        %session_id,
        %board_id,
        %user_id,
        peers = state.registry.board_population(board_id),
        "ws: session left"
    );
}

// =============================================================================
// ROUTING
// =============================================================================

/// Per-message failure. The sender gets an ERROR envelope; the board never
/// sees anything.
#[derive(Debug, Error)]
enum RouteError {
    #[error("{0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Store(#[from] EventStoreError),
}

/// What the router decided for one inbound envelope. Delivery belongs to
/// the caller.
#[derive(Debug)]
enum Outcome {
    /// Fan out to every session on the board, sender included.
    Broadcast(Envelope),
    /// Consumed without output (e.g. a dropped malformed cursor move).
    Silent,
}

/// Process one inbound text frame end to end: route it, apply the outcome,
/// and return the ERROR reply for the originating socket when routing
/// failed.
///
/// Split from the socket pump so tests can drive the full routing path
/// without a live connection.
async fn process_text(
    state: &AppState,
    board_id: Uuid,
    user_id: Uuid,
    text: &str,
) -> Option<Envelope> {
    match route_envelope(state, board_id, user_id, text).await {
        Ok(Outcome::Broadcast(envelope)) => {
            session::broadcast(&state.registry, board_id, &envelope);
            None
        }
        Ok(Outcome::Silent) => None,
        Err(err) => {
            warn!(%board_id, %user_id, error = %err, "ws: inbound message failed");
            Some(Envelope::error(format!("Failed to process event: {err}")).with_board_id(board_id))
        }
    }
}

/// Parse one inbound frame and dispatch on its kind.
///
/// Inbound identity fields are untrusted: `boardId`, `userId`, and `ts` are
/// overwritten from the session before anything else reads the envelope.
async fn route_envelope(
    state: &AppState,
    board_id: Uuid,
    user_id: Uuid,
    text: &str,
) -> Result<Outcome, RouteError> {
    let mut inbound: Envelope = serde_json::from_str(text)?;
    inbound.board_id = Some(board_id);
    inbound.user_id = Some(user_id);
    inbound.ts = now_ms();

    match inbound.kind.as_str() {
        KIND_CURSOR_MOVE => Ok(route_cursor_move(state, board_id, user_id, &inbound)),
        KIND_CLEAR_CANVAS => route_clear_canvas(state, board_id, user_id).await,
        _ => route_durable(state, board_id, user_id, inbound).await,
    }
}

/// Ephemeral path: move the cursor and announce it. Never touches
/// persistence.
fn route_cursor_move(
    state: &AppState,
    board_id: Uuid,
    user_id: Uuid,
    inbound: &Envelope,
) -> Outcome {
    let coords = inbound
        .data
        .get("x")
        .and_then(serde_json::Value::as_f64)
        .zip(inbound.data.get("y").and_then(serde_json::Value::as_f64));
    let Some((x, y)) = coords else {
        warn!(%board_id, %user_id, "ws: cursor move with malformed coordinates dropped");
        return Outcome::Silent;
    };

    match state.presence.update(board_id, user_id, x, y) {
        Some(cursor) => Outcome::Broadcast(cursor_update(board_id, &cursor, CursorKind::Move)),
        // Move racing its own disconnect; nothing left to announce.
        None => Outcome::Silent,
    }
}

/// Wipe the board's history and announce the wipe. The broadcast is a bare
/// `CLEAR_CANVAS` — there is no stored event to wrap in an append.
async fn route_clear_canvas(
    state: &AppState,
    board_id: Uuid,
    user_id: Uuid,
) -> Result<Outcome, RouteError> {
    let removed = state.events.delete_all(board_id).await?;
    info!(%board_id, %user_id, removed, "ws: canvas cleared");

    Ok(Outcome::Broadcast(
        Envelope::new(KIND_CLEAR_CANVAS)
            .with_board_id(board_id)
            .with_user_id(user_id),
    ))
}

/// Durable path: persist, then wrap the stored event for fan-out. The
/// client's `tempId` rides along on the stored copy so the sender can match
/// its optimistic local event to the durable one.
async fn route_durable(
    state: &AppState,
    board_id: Uuid,
    user_id: Uuid,
    inbound: Envelope,
) -> Result<Outcome, RouteError> {
    let mut stored = state
        .events
        .append(board_id, user_id, &inbound.kind, inbound.data, inbound.ts)
        .await?;
    stored.temp_id = inbound.temp_id;

    Ok(Outcome::Broadcast(
        Envelope::new(KIND_EVENT_APPEND)
            .with_board_id(board_id)
            .with_data(json!({ "event": stored })),
    ))
}

// =============================================================================
// SOCKET HELPERS
// =============================================================================

/// Serialize and write one envelope. A failed write means the socket is
/// done; callers stop using it.
async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> Result<(), ()> {
    let json = match serde_json::to_string(envelope) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "ws: failed to serialize envelope");
            return Err(());
        }
    };
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

/// Best-effort server-initiated close.
async fn send_close(socket: &mut WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_owned().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
