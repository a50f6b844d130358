use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use plaza_common::config::RelayConfig;
use plaza_protocol::envelope::encode_envelope;
use plaza_protocol::Envelope;
use plaza_relay::RelayServer;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PUBLIC: &str = "workspace:hq:0_0:publico";
const SIGNALING: &str = "webrtc:hq";

async fn start(max_channels_per_connection: usize) -> SocketAddr {
    let server = RelayServer::bind(RelayConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        max_channels_per_connection,
    })
    .await
    .expect("bind");
    let addr = server.local_addr().expect("addr");
    tokio::spawn(server.run());
    addr
}

async fn send(ws: &mut Ws, message_type: &str, payload: Value) {
    let text = encode_envelope(message_type, "m", 0, &payload).expect("encode");
    ws.send(Message::Text(text)).await.expect("send");
}

async fn recv(ws: &mut Ws) -> Envelope {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for relay")
            .expect("stream ended")
            .expect("read");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("envelope");
        }
    }
}

async fn recv_type(ws: &mut Ws, message_type: &str) -> Envelope {
    loop {
        let env = recv(ws).await;
        if env.message_type == message_type {
            return env;
        }
    }
}

async fn join(addr: SocketAddr, user_id: &str) -> Ws {
    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.expect("connect");
    send(&mut ws, "client.join", json!({ "user_id": user_id, "workspace_id": "hq" })).await;
    let welcome = recv(&mut ws).await;
    assert_eq!(welcome.message_type, "server.welcome");
    ws
}

async fn subscribe(ws: &mut Ws, channel: &str) {
    send(ws, "client.subscribe", json!({ "channel": channel })).await;
    let ack = recv_type(ws, "server.subscribed").await;
    assert_eq!(ack.payload["channel"], channel);
}

fn presence(user_id: &str) -> Value {
    json!({
        "user_id": user_id,
        "tenant_id": null,
        "department_id": null,
        "visibility_level": "tenant",
        "x": 4.0,
        "y": 8.0,
        "direction": "down",
        "status": "away",
        "name": "Anonymous",
        "role": "guest",
        "mic_on": false,
        "camera_on": false,
        "is_private": true,
        "updated_at": 1
    })
}

fn user_ids(env: &Envelope) -> Vec<String> {
    env.payload["presences"]
        .as_array()
        .expect("presences")
        .iter()
        .map(|p| p["user_id"].as_str().expect("user_id").to_string())
        .collect()
}

#[tokio::test]
async fn subscribe_sends_current_snapshot() {
    let addr = start(16).await;
    let mut a = join(addr, "u_a").await;
    subscribe(&mut a, PUBLIC).await;
    let snapshot = recv_type(&mut a, "server.presence_state").await;
    assert_eq!(snapshot.payload["channel"], PUBLIC);
    assert!(user_ids(&snapshot).is_empty());
}

#[tokio::test]
async fn disconnect_removes_presence_and_pushes_snapshot() {
    let addr = start(16).await;
    let mut a = join(addr, "u_a").await;
    let mut b = join(addr, "u_b").await;
    subscribe(&mut a, PUBLIC).await;
    recv_type(&mut a, "server.presence_state").await;
    subscribe(&mut b, PUBLIC).await;
    recv_type(&mut b, "server.presence_state").await;

    send(&mut a, "client.track", json!({ "channel": PUBLIC, "presence": presence("u_a") })).await;
    let seen = recv_type(&mut b, "server.presence_state").await;
    assert_eq!(user_ids(&seen), vec!["u_a".to_string()]);

    a.close(None).await.expect("close");
    let after = recv_type(&mut b, "server.presence_state").await;
    assert!(user_ids(&after).is_empty());
}

#[tokio::test]
async fn broadcast_reaches_others_but_not_sender() {
    let addr = start(16).await;
    let mut a = join(addr, "u_a").await;
    let mut b = join(addr, "u_b").await;
    subscribe(&mut a, SIGNALING).await;
    subscribe(&mut b, SIGNALING).await;

    let signal = json!({ "type": "offer", "from": "u_a", "to": "u_b", "payload": { "type": "offer", "sdp": "v=0" } });
    send(&mut a, "client.broadcast", json!({ "channel": SIGNALING, "payload": signal })).await;
    let delivered = recv(&mut b).await;
    assert_eq!(delivered.message_type, "server.broadcast");
    assert_eq!(delivered.payload["payload"], signal);

    send(&mut a, "client.heartbeat", json!({ "nonce": "n1" })).await;
    let next = recv(&mut a).await;
    assert_eq!(next.message_type, "server.notice");
}

#[tokio::test]
async fn channels_outside_the_workspace_are_refused() {
    let addr = start(16).await;
    let mut a = join(addr, "u_a").await;

    send(&mut a, "client.subscribe", json!({ "channel": "workspace:other:0_0:publico" })).await;
    let err = recv(&mut a).await;
    assert_eq!(err.message_type, "server.error");
    assert_eq!(err.payload["code"], "forbidden_channel");
    assert_eq!(err.payload["channel"], "workspace:other:0_0:publico");

    send(&mut a, "client.subscribe", json!({ "channel": "lobby" })).await;
    let err = recv(&mut a).await;
    assert_eq!(err.payload["code"], "invalid_channel");
}

#[tokio::test]
async fn track_needs_subscription_and_matching_identity() {
    let addr = start(16).await;
    let mut a = join(addr, "u_a").await;

    send(&mut a, "client.track", json!({ "channel": PUBLIC, "presence": presence("u_a") })).await;
    assert_eq!(recv(&mut a).await.payload["code"], "not_subscribed");

    subscribe(&mut a, PUBLIC).await;
    recv_type(&mut a, "server.presence_state").await;
    send(&mut a, "client.track", json!({ "channel": PUBLIC, "presence": presence("u_z") })).await;
    assert_eq!(recv(&mut a).await.payload["code"], "identity_mismatch");
}

#[tokio::test]
async fn channel_limit_is_enforced() {
    let addr = start(2).await;
    let mut a = join(addr, "u_a").await;
    subscribe(&mut a, SIGNALING).await;
    subscribe(&mut a, PUBLIC).await;
    recv_type(&mut a, "server.presence_state").await;

    send(&mut a, "client.subscribe", json!({ "channel": "workspace:hq:1_0:publico" })).await;
    let err = recv(&mut a).await;
    assert_eq!(err.payload["code"], "too_many_channels");
}

#[tokio::test]
async fn malformed_payload_keeps_connection_open() {
    let addr = start(16).await;
    let mut a = join(addr, "u_a").await;
    send(&mut a, "client.subscribe", json!({ "chan": 3 })).await;
    assert_eq!(recv(&mut a).await.payload["code"], "malformed");

    send(&mut a, "client.heartbeat", json!({ "nonce": "n" })).await;
    assert_eq!(recv(&mut a).await.message_type, "server.notice");
}
