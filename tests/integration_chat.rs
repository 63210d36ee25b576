#![allow(clippy::unwrap_used, clippy::panic, missing_debug_implementations, unreachable_pub)]
mod common;

use common::TestApp;
use huddle_server::domain::message::Message;
use huddle_server::storage::MessageStore;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_tungstenite::tungstenite::{self, protocol::frame::coding::CloseCode, protocol::Message as WsMessage};

async fn seed_messages(app: &TestApp, count: i64) {
    let base = OffsetDateTime::now_utc() - time::Duration::hours(1);
    for i in 0..count {
        let mut msg = Message::new("seed".to_string(), format!("m{i}"));
        msg.time = base + time::Duration::seconds(i);
        app.store.insert(&msg).await.unwrap();
    }
}

#[tokio::test]
async fn test_new_connection_gets_empty_history() {
    let app = TestApp::spawn().await;
    let (_client, history) = app.connect().await;
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_history_replays_latest_fifty_oldest_first() {
    let app = TestApp::spawn().await;
    seed_messages(&app, 60).await;

    let (_client, history) = app.connect().await;

    assert_eq!(history.len(), 50);
    let texts: Vec<_> = history.iter().map(|m| m["text"].as_str().unwrap().to_string()).collect();
    let expected: Vec<_> = (10..60).map(|i| format!("m{i}")).collect();
    assert_eq!(texts, expected);
}

#[tokio::test]
async fn test_history_with_fewer_than_limit_returns_everything_in_order() {
    let app = TestApp::spawn().await;
    seed_messages(&app, 3).await;

    let (_client, history) = app.connect().await;

    let texts: Vec<_> = history.iter().map(|m| m["text"].as_str().unwrap()).collect();
    assert_eq!(texts, ["m0", "m1", "m2"]);
}

#[tokio::test]
async fn test_history_is_sent_only_to_the_new_client() {
    let app = TestApp::spawn().await;
    let (mut first, _) = app.connect().await;
    let (_second, _) = app.connect().await;

    assert!(first.next_event_timeout(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_message_is_broadcast_to_everyone_including_sender() {
    let app = TestApp::spawn().await;
    let (mut alice, _) = app.connect().await;
    let (mut bob, _) = app.connect().await;
    app.wait_for_connections(2).await;

    alice.send_chat("alice", "hi").await;

    for client in [&mut alice, &mut bob] {
        let msg = client.expect_chat_message().await;
        assert_eq!(msg["username"], "alice");
        assert_eq!(msg["text"], "hi");
        assert!(msg["id"].as_str().is_some());
        let time = msg["time"].as_str().unwrap();
        assert!(OffsetDateTime::parse(time, &time::format_description::well_known::Rfc3339).is_ok());
    }
}

#[tokio::test]
async fn test_sender_receives_every_message_of_a_burst() {
    let mut config = common::get_test_config();
    config.websocket.outbound_buffer_size = 4;
    let app = TestApp::spawn_with_config(config).await;
    let (mut alice, _) = app.connect().await;

    let burst = 40;
    for i in 0..burst {
        alice.send_chat("alice", &format!("burst {i}")).await;
    }

    for i in 0..burst {
        assert_eq!(alice.expect_chat_message().await["text"], format!("burst {i}"));
    }
    assert_eq!(app.store.recent(1000).await.unwrap().len(), burst);
}

#[tokio::test]
async fn test_broadcast_message_is_persisted() {
    let app = TestApp::spawn().await;
    let (mut client, _) = app.connect().await;

    client.send_chat("alice", "remember me").await;
    let broadcast = client.expect_chat_message().await;

    let stored = app.store.recent(50).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id.to_string(), broadcast["id"].as_str().unwrap());

    // A later client sees it in its history
    let (_late, history) = app.connect().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["text"], "remember me");
}

#[tokio::test]
async fn test_persistence_failure_drops_message() {
    let app = TestApp::spawn().await;
    let (mut client, _) = app.connect().await;

    app.store.set_available(false);
    client.send_chat("alice", "lost").await;
    assert!(client.next_event_timeout(Duration::from_millis(300)).await.is_none());

    app.store.set_available(true);
    client.send_chat("alice", "kept").await;
    assert_eq!(client.expect_chat_message().await["text"], "kept");
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let app = TestApp::spawn().await;
    let (mut client, _) = app.connect().await;

    client.send_raw("not json".to_string()).await;
    client.send_raw(r#"{"event":"typing","data":{}}"#.to_string()).await;
    client.send_chat("alice", "   ").await;
    client.send_chat("alice", "still here").await;

    assert_eq!(client.expect_chat_message().await["text"], "still here");
}

#[tokio::test]
async fn test_unbound_connection_may_claim_any_username() {
    let app = TestApp::spawn().await;
    let (mut client, _) = app.connect().await;

    client.send_chat("somebody_else", "hello").await;
    assert_eq!(client.expect_chat_message().await["username"], "somebody_else");
}

#[tokio::test]
async fn test_token_binds_connection_to_username() {
    let app = TestApp::spawn().await;
    let username = common::generate_username("bound");
    let token = app.login_token(&username).await;

    let (mut client, _) = app.connect_with_token(&token).await;
    client.send_chat("impostor", "who am i").await;

    let msg = client.expect_chat_message().await;
    assert_eq!(msg["username"], username.as_str());
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let app = TestApp::spawn().await;

    let result = tokio_tungstenite::connect_async(format!("{}?token=garbage", app.ws_url)).await;
    match result {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
        Err(e) => panic!("expected 401, got {e}"),
        Ok(_) => panic!("expected 401, connection was accepted"),
    }
}

#[tokio::test]
async fn test_required_token_rejects_anonymous_connections() {
    let mut config = common::get_test_config();
    config.chat.require_token = true;
    let app = TestApp::spawn_with_config(config).await;

    let result = tokio_tungstenite::connect_async(app.ws_url.clone()).await;
    assert!(matches!(result, Err(tungstenite::Error::Http(ref resp)) if resp.status() == 401));

    let token = app.login_token(&common::generate_username("required")).await;
    let (_client, history) = app.connect_with_token(&token).await;
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_disconnect_unregisters_connection() {
    let app = TestApp::spawn().await;
    let (mut client, _) = app.connect().await;
    let (_other, _) = app.connect().await;
    app.wait_for_connections(2).await;

    client.stream.close(None).await.unwrap();
    app.wait_for_connections(1).await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions_with_going_away() {
    let app = TestApp::spawn().await;
    let (mut client, _) = app.connect().await;

    app.shutdown_tx.send(true).unwrap();

    let mut close_code = None;
    while let Some(msg) = client.receive_raw_timeout(Duration::from_secs(5)).await {
        if let Ok(WsMessage::Close(frame)) = msg {
            close_code = frame.map(|f| f.code);
            break;
        }
    }
    assert_eq!(close_code, Some(CloseCode::Away));
}

#[tokio::test]
async fn test_idle_connection_is_closed_after_heartbeat_timeout() {
    let mut config = common::get_test_config();
    config.websocket.ping_interval_secs = 1;
    config.websocket.ping_timeout_secs = 1;
    let app = TestApp::spawn_with_config(config).await;

    let (mut client, _) = app.connect().await;

    // Not polling means tungstenite never answers the server's pings
    tokio::time::sleep(Duration::from_secs(4)).await;

    let mut closed = false;
    let mut received_ping = false;
    loop {
        match client.receive_raw_timeout(Duration::from_secs(2)).await {
            Some(Ok(WsMessage::Ping(_))) => received_ping = true,
            Some(Ok(WsMessage::Close(_)) | Err(_)) | None => {
                closed = true;
                break;
            }
            Some(Ok(_)) => {}
        }
    }

    assert!(received_ping, "server never pinged");
    assert!(closed, "idle connection was not closed");
    app.wait_for_connections(0).await;
}
