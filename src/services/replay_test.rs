use serde_json::json;
use uuid::Uuid;

use super::backlog;
use crate::envelope::{KIND_CURSORS_INIT, KIND_EVENT_REPLAY_CHUNK};
use crate::services::event::EventStore;
use crate::state::test_helpers;

#[tokio::test]
async fn empty_board_yields_only_the_presence_snapshot() {
    let (state, _store) = test_helpers::test_app_state();
    let board_id = Uuid::new_v4();

    let messages = backlog(&state, board_id).await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, KIND_CURSORS_INIT);
    assert_eq!(messages[0].data["cursors"], json!([]));
}

#[tokio::test]
async fn history_arrives_as_one_chunk_before_cursors() {
    let (state, _store) = test_helpers::test_app_state();
    let board_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    for i in 0..3_i64 {
        state
            .events
            .append(board_id, user_id, "STROKE_ADD", json!({"seq": i}), 1_000 + i)
            .await
            .expect("seed event");
    }

    let messages = backlog(&state, board_id).await;

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].kind, KIND_EVENT_REPLAY_CHUNK);
    assert_eq!(messages[1].kind, KIND_CURSORS_INIT);

    let events = messages[0].data["events"].as_array().expect("events array");
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["data"]["seq"], 0);
    assert_eq!(events[2]["data"]["seq"], 2);
}

#[tokio::test]
async fn chunk_is_bounded_and_oldest_first() {
    let (mut state, _store) = test_helpers::test_app_state();
    state.replay_chunk_size = 200;
    let board_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    for i in 0..250_i64 {
        state
            .events
            .append(board_id, user_id, "STROKE_ADD", json!({"seq": i}), i)
            .await
            .expect("seed event");
    }

    let messages = backlog(&state, board_id).await;

    let events = messages[0].data["events"].as_array().expect("events array");
    assert_eq!(events.len(), 200, "one chunk, capped at the configured size");
    assert_eq!(events[0]["ts"], 0);
    assert_eq!(events[199]["ts"], 199, "oldest 200 events, in order");
}

#[tokio::test]
async fn presence_snapshot_reflects_current_cursors() {
    let (state, _store) = test_helpers::test_app_state();
    let board_id = Uuid::new_v4();
    state.presence.init(board_id, Uuid::new_v4(), "Ada", "#FF6B6B");
    state.presence.init(board_id, Uuid::new_v4(), "Grace", "#4ECDC4");

    let messages = backlog(&state, board_id).await;

    let cursors = messages[0].data["cursors"].as_array().expect("cursors array");
    assert_eq!(cursors.len(), 2);
}

#[tokio::test]
async fn store_failure_is_swallowed() {
    let (state, store) = test_helpers::test_app_state();
    let board_id = Uuid::new_v4();
    state.presence.init(board_id, Uuid::new_v4(), "Ada", "#FF6B6B");
    store.fail_from_now_on();

    let messages = backlog(&state, board_id).await;

    assert!(messages.is_empty(), "a failed fetch aborts the whole backlog");
}
