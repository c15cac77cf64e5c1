//! Integration tests for the job channel over a real WebSocket.
//!
//! Each test binds a mock job peer on an ephemeral localhost port and drives a
//! `JobChannel` against it through `tokio-tungstenite`.

use crate::helpers::{MockPeer, TEST_IDENTITY, eventually, fast_config, websocket_channel};

use channel_core::error::ConnectionError;
use channel_core::{ConnectionState, DispatchError, Identity, Sender};

use std::time::Duration;

use serde_json::json;

fn identity() -> Option<Identity> {
    Identity::new(TEST_IDENTITY)
}

#[tokio::test]
async fn test_open_connects_with_identity_in_query() {
    let peer = MockPeer::bind().await;
    let test = websocket_channel(fast_config(&peer.endpoint));

    test.channel.open(identity()).unwrap();
    let connection = peer.accept().await;
    test.channel
        .wait_for_state(ConnectionState::Open)
        .await
        .unwrap();

    assert_eq!(connection.request_uri, "/ws?user_id=alice");
}

#[tokio::test]
async fn test_send_writes_command_envelope() {
    let peer = MockPeer::bind().await;
    let test = websocket_channel(fast_config(&peer.endpoint));
    test.channel.open(identity()).unwrap();
    let mut connection = peer.accept().await;
    test.channel
        .wait_for_state(ConnectionState::Open)
        .await
        .unwrap();

    test.channel.send("p1", "draw a cube").await.unwrap();

    assert_eq!(
        connection.receive_text().await,
        r#"{"project_id":"p1","prompt":"draw a cube"}"#
    );
}

#[tokio::test]
async fn test_send_before_open_returns_channel_not_ready() {
    let peer = MockPeer::bind().await;
    let test = websocket_channel(fast_config(&peer.endpoint));

    let result = test.channel.send("p1", "draw a cube").await;

    assert!(matches!(
        result,
        Err(DispatchError::ChannelNotReady {
            state: ConnectionState::Idle,
            ..
        })
    ));
    assert!(!peer.connects_within(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_job_lifecycle_updates_chat_and_preview() {
    let peer = MockPeer::bind().await;
    let test = websocket_channel(fast_config(&peer.endpoint));
    test.channel.open(identity()).unwrap();
    let mut connection = peer.accept().await;
    test.channel
        .wait_for_state(ConnectionState::Open)
        .await
        .unwrap();

    test.channel.send("p1", "draw a cube").await.unwrap();
    let command = connection.receive_json().await;
    assert_eq!(command, json!({"project_id": "p1", "prompt": "draw a cube"}));

    connection
        .send_json(r#"{"type":"job_queued","job_id":"j1","position":1,"estimated_wait":0}"#)
        .await;
    connection
        .send_json(r#"{"type":"job_started","job_id":"j1","project_id":"p1"}"#)
        .await;
    connection
        .send_json(
            r#"{"type":"agent_tool_call","job_id":"j1","project_id":"p1","tool":"add_cube","input":{"size":2},"output":"done"}"#,
        )
        .await;
    connection
        .send_json(
            r#"{"type":"job_completed","job_id":"j1","project_id":"p1","result":"ok","base64data":"Z2xURg=="}"#,
        )
        .await;

    let projects = test.projects.clone();
    assert!(eventually(|| projects.preview("p1").is_some()).await);
    test.channel.sync().flush().await.unwrap();

    let messages = test.chat.messages("p1");
    let transcript: Vec<(Sender, &str)> = messages
        .iter()
        .map(|m| (m.sender, m.content.as_str()))
        .collect();
    assert_eq!(
        transcript,
        vec![
            (Sender::User, "draw a cube"),
            (Sender::System, "Job started: j1"),
            (Sender::Agent, r#"Tool: add_cube, Input: {"size":2}, Output: done"#),
            (Sender::Agent, "Result: ok"),
        ]
    );
    assert!(!test.chat.is_loading("p1"));
    assert_eq!(test.projects.preview("p1"), Some(b"glTF".to_vec()));
    assert_eq!(test.channel.router_stats().notices, 1);
}

#[tokio::test]
async fn test_malformed_frame_is_discarded() {
    let peer = MockPeer::bind().await;
    let test = websocket_channel(fast_config(&peer.endpoint));
    test.channel.open(identity()).unwrap();
    let mut connection = peer.accept().await;
    test.channel
        .wait_for_state(ConnectionState::Open)
        .await
        .unwrap();

    connection.send_json("this is not json").await;
    connection
        .send_json(r#"{"type":"job_failed","job_id":"j1","project_id":"p1","error":"out of memory"}"#)
        .await;

    let chat = test.chat.clone();
    assert!(eventually(|| chat.messages("p1").len() == 1).await);
    assert_eq!(test.chat.messages("p1")[0].content, "out of memory");
    assert_eq!(test.channel.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_peer_clean_close_returns_to_idle_without_reconnect() {
    let peer = MockPeer::bind().await;
    let test = websocket_channel(fast_config(&peer.endpoint));
    test.channel.open(identity()).unwrap();
    let mut connection = peer.accept().await;
    test.channel
        .wait_for_state(ConnectionState::Open)
        .await
        .unwrap();

    connection.socket.close(None).await.unwrap();
    test.channel
        .wait_for_state(ConnectionState::Idle)
        .await
        .unwrap();

    assert!(!peer.connects_within(Duration::from_millis(500)).await);
    assert_eq!(test.channel.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_peer_drop_triggers_reconnect() {
    let peer = MockPeer::bind().await;
    let test = websocket_channel(fast_config(&peer.endpoint));
    let mut changes = test.channel.on_state_change();
    test.channel.open(identity()).unwrap();
    let connection = peer.accept().await;
    test.channel
        .wait_for_state(ConnectionState::Open)
        .await
        .unwrap();

    drop(connection);
    let _second = peer.accept().await;
    let snapshot = test
        .channel
        .wait_for_state(ConnectionState::Open)
        .await
        .unwrap();

    assert_eq!(snapshot.reconnect.attempt_count, 0);
    let visited: Vec<ConnectionState> = std::iter::from_fn(|| changes.try_recv().ok())
        .map(|change| change.current)
        .collect();
    assert!(visited.contains(&ConnectionState::Reconnecting));
}

#[tokio::test]
async fn test_close_releases_socket_and_stops_reconnecting() {
    let peer = MockPeer::bind().await;
    let test = websocket_channel(fast_config(&peer.endpoint));
    test.channel.open(identity()).unwrap();
    let mut connection = peer.accept().await;
    test.channel
        .wait_for_state(ConnectionState::Open)
        .await
        .unwrap();

    test.channel.close().await.unwrap();

    assert_eq!(test.channel.state(), ConnectionState::Idle);
    assert!(connection.is_closed_by_client().await);
    assert!(!peer.connects_within(Duration::from_millis(500)).await);
}

#[tokio::test]
async fn test_unreachable_peer_fails_after_budget() {
    // Bind then release a port so nothing is listening on it.
    let endpoint = {
        let peer = MockPeer::bind().await;
        peer.endpoint.clone()
    };
    let test = websocket_channel(fast_config(&endpoint));

    test.channel.open(identity()).unwrap();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(10),
        test.channel.wait_for_state(ConnectionState::Failed),
    )
    .await
    .expect("Channel never gave up")
    .unwrap();

    assert_eq!(snapshot.reconnect.attempt_count, 2);
    assert!(matches!(
        test.channel.terminal_error(),
        Some(ConnectionError::ChannelFailed { attempts: 2, .. })
    ));
}
