//! WebSocket transport tests against a live server on an ephemeral port.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use wiregate_core::Config;
use wiregate_crypto::{handshake, verify_with_public_key, SessionCryptoState, SignatureFormat, TextEncoding};
use wiregate_gateway::envelope::read_frame;
use wiregate_gateway::{Command, Instruction};
use wiregate_integration_tests::{connect, next_json, next_text, send, spawn_gateway};

fn call(method: &str, tid: u64, data: Value) -> Value {
    json!({
        "namespace": "app", "action": "Demo", "method": method,
        "tid": tid, "type": "rpc", "data": data
    })
}

#[tokio::test]
async fn test_welcome_and_echo() {
    let (_gateway, addr) = spawn_gateway(Config::default()).await;
    let mut client = connect(addr, "").await;

    send(&mut client, json!({"type": "ws", "cmd": "welco"})).await;
    assert_eq!(next_json(&mut client).await["cmd"], "welcome");

    send(&mut client, json!({"type": "ws", "cmd": "echo", "data": {"x": [1, 2]}})).await;
    let reply = next_json(&mut client).await;
    assert_eq!(reply["cmd"], "echo");
    assert_eq!(reply["data"], json!({"x": [1, 2]}));
}

#[tokio::test]
async fn test_batch_keeps_order_and_isolates_failures() {
    let (_gateway, addr) = spawn_gateway(Config::default()).await;
    let mut client = connect(addr, "").await;

    send(
        &mut client,
        json!({
            "type": "ws",
            "cmd": "data",
            "data": [call("hello", 1, json!(["World"])), call("nope", 2, json!([]))]
        }),
    )
    .await;

    let reply = next_json(&mut client).await;
    assert_eq!(reply["cmd"], "data");
    let responses = reply["data"].as_array().unwrap();
    assert_eq!(responses.len(), 2);

    assert_eq!(responses[0]["tid"], 1);
    assert_eq!(responses[0]["result"]["success"], true);
    assert_eq!(responses[0]["result"]["data"], "Hello World");

    assert_eq!(responses[1]["tid"], 2);
    assert_eq!(responses[1]["result"]["success"], false);
    assert_eq!(responses[1]["result"]["code"], "E0001");
}

#[tokio::test]
async fn test_malformed_entry_does_not_drop_batch() {
    let (_gateway, addr) = spawn_gateway(Config::default()).await;
    let mut client = connect(addr, "").await;

    send(
        &mut client,
        json!({
            "type": "ws",
            "cmd": "data",
            "data": [
                call("hello", 1, json!(["World"])),
                {"namespace": "app", "action": "Demo", "tid": 2},
                call("hello", 3, json!("World"))
            ]
        }),
    )
    .await;

    let reply = next_json(&mut client).await;
    assert_eq!(reply["cmd"], "data");
    let responses = reply["data"].as_array().unwrap();
    assert_eq!(responses.len(), 3);

    assert_eq!(responses[0]["result"]["data"], "Hello World");
    assert_eq!(responses[1]["tid"], 2);
    assert_eq!(responses[1]["result"]["code"], "E0001");
    assert_eq!(responses[2]["tid"], 3);
    assert_eq!(responses[2]["result"]["code"], "E9999");
}

#[tokio::test]
async fn test_challenge_pushes_signed_api() {
    let (_gateway, addr) = spawn_gateway(Config::default()).await;
    let mut client = connect(addr, "?q=1700000000000").await;

    let pushed = next_json(&mut client).await;
    assert_eq!(pushed["cmd"], "api");
    let data = &pushed["data"];
    assert_eq!(data["challenge"], "1700000000000");

    let key_enc = data["keyEnc"].as_str().unwrap();
    let key_ver = data["keyVer"].as_str().unwrap();
    let signature = TextEncoding::Base64.decode(data["signature"].as_str().unwrap()).unwrap();
    let message = format!("1700000000000{}{}", key_enc, key_ver);
    verify_with_public_key(key_ver, message.as_bytes(), &signature, SignatureFormat::Raw).unwrap();

    // Asking again returns the same challenge
    send(&mut client, json!({"type": "ws", "cmd": "api"})).await;
    let again = next_json(&mut client).await;
    assert_eq!(again["data"]["challenge"], "1700000000000");
}

#[tokio::test]
async fn test_no_push_without_challenge() {
    let (_gateway, addr) = spawn_gateway(Config::default()).await;
    let mut client = connect(addr, "").await;

    send(&mut client, json!({"type": "ws", "cmd": "echo", "data": "first"})).await;
    let reply = next_json(&mut client).await;
    assert_eq!(reply["cmd"], "echo");
    assert_eq!(reply["data"], "first");
}

#[tokio::test]
async fn test_encrypted_batch() {
    let (gateway, addr) = spawn_gateway(Config::default()).await;
    let mut client = connect(addr, "").await;

    let key_enc = gateway.state().keys.encryption_public_key();
    let state = SessionCryptoState::generate();
    let k = handshake::seal_secret(&key_enc, &state, TextEncoding::Base64).unwrap();
    let d = state.encrypt_text(state.iv(), r#"["Alice"]"#).unwrap();

    send(
        &mut client,
        json!({"type": "ws", "cmd": "enc", "data": [call("hello", 9, json!([{"d": d, "k": k}]))]}),
    )
    .await;

    let text = next_text(&mut client).await;
    let frame: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(frame["cmd"], "enc");
    assert!(frame.get("data").is_none());

    let reply = read_frame(&text, Some(&state)).unwrap();
    assert_eq!(reply["cmd"], "data");
    assert_eq!(reply["data"][0]["tid"], 9);
    assert_eq!(reply["data"][0]["result"]["data"], "Hello Alice");

    // The key is now fixed for this connection; later calls need no k
    let d = state.encrypt_text(state.iv(), r#""Bob""#).unwrap();
    send(
        &mut client,
        json!({"type": "ws", "cmd": "enc", "data": [call("hello", 10, json!([{"d": d}]))]}),
    )
    .await;
    let reply = read_frame(&next_text(&mut client).await, Some(&state)).unwrap();
    assert_eq!(reply["data"][0]["result"]["data"], "Hello Bob");
}

#[tokio::test]
async fn test_encrypted_call_without_handshake_fails_alone() {
    let (_gateway, addr) = spawn_gateway(Config::default()).await;
    let mut client = connect(addr, "").await;

    send(
        &mut client,
        json!({
            "type": "ws",
            "cmd": "enc",
            "data": [call("hello", 1, json!([{"d": "00112233"}]))]
        }),
    )
    .await;
    let reply = next_json(&mut client).await;
    assert_eq!(reply["data"][0]["result"]["code"], "E0000");
}

#[tokio::test]
async fn test_non_ws_and_malformed_frames() {
    let (_gateway, addr) = spawn_gateway(Config::default()).await;
    let mut client = connect(addr, "").await;

    send(&mut client, json!({"type": "other", "cmd": "echo", "data": "ignored"})).await;
    client
        .send(tokio_tungstenite::tungstenite::Message::Text("not json".into()))
        .await
        .unwrap();

    let error = next_json(&mut client).await;
    assert_eq!(error["cmd"], "error");
    assert!(error["errMsg"].is_string());

    send(&mut client, json!({"type": "ws", "cmd": "shout"})).await;
    assert_eq!(next_json(&mut client).await["cmd"], "error");
}

#[tokio::test]
async fn test_bye_closes() {
    let (gateway, addr) = spawn_gateway(Config::default()).await;
    let mut client = connect(addr, "").await;

    send(&mut client, json!({"type": "ws", "cmd": "bye"})).await;
    assert_eq!(next_json(&mut client).await["cmd"], "bye");

    // Drain until the server's close
    while let Some(Ok(msg)) = client.next().await {
        if msg.is_close() {
            break;
        }
    }

    for _ in 0..50 {
        if gateway.connections().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(gateway.connections().is_empty());
}

#[tokio::test]
async fn test_broadcast_reaches_clients() {
    let (gateway, addr) = spawn_gateway(Config::default()).await;
    let mut first = connect(addr, "").await;
    let mut second = connect(addr, "").await;

    // Round-trip once so both connections are registered
    for client in [&mut first, &mut second] {
        send(client, json!({"type": "ws", "cmd": "echo"})).await;
        next_json(client).await;
    }

    let delivered = gateway.broadcast(&Instruction::new(Command::Data).with_data(json!({"n": 1})));
    assert_eq!(delivered, 2);

    for client in [&mut first, &mut second] {
        let frame = next_json(client).await;
        assert_eq!(frame["cmd"], "data");
        assert_eq!(frame["data"]["n"], 1);
    }
}

#[tokio::test]
async fn test_token_adopts_http_session() {
    let (gateway, addr) = spawn_gateway(Config::default()).await;
    let session = gateway.state().sessions.create();

    let mut client = connect(addr, &format!("?t={}", session.token())).await;
    send(&mut client, json!({"type": "ws", "cmd": "echo"})).await;
    next_json(&mut client).await;

    let ids = gateway.connections().ids();
    assert_eq!(ids.len(), 1);
    let entry = gateway.connections().get(&ids[0]).unwrap();
    assert_eq!(entry.bound_token(), Some(session.token()));
}

#[tokio::test]
async fn test_socket_traffic_keeps_session_alive() {
    let (gateway, addr) = spawn_gateway(Config::default()).await;
    let session = gateway.state().sessions.create();
    let mut client = connect(addr, &format!("?t={}", session.token())).await;

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(session.idle_for() >= std::time::Duration::from_millis(300));

    send(&mut client, json!({"type": "ws", "cmd": "data", "data": [call("hello", 1, json!(["A"]))]})).await;
    next_json(&mut client).await;

    assert!(session.idle_for() < std::time::Duration::from_millis(300));
    assert_eq!(gateway.state().sessions.sweep_expired(std::time::Duration::from_millis(250)), 0);
    assert!(session.is_active());
}

#[tokio::test]
async fn test_connection_limit() {
    let mut config = Config::default();
    config.gateway.max_connections = 1;
    let (_gateway, addr) = spawn_gateway(config).await;

    let mut first = connect(addr, "").await;
    send(&mut first, json!({"type": "ws", "cmd": "echo"})).await;
    next_json(&mut first).await;

    let url = format!("ws://{}/socket", addr);
    assert!(tokio_tungstenite::connect_async(url).await.is_err());
}
