use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use plaza_common::config::RelayConfig;
use plaza_common::ids::{new_connection_id, new_message_id, now_ms};
use plaza_protocol::envelope::encode_envelope;
use plaza_protocol::{
    ClientBroadcast, ClientJoin, ClientSubscribe, ClientTrack, ClientUnsubscribe, Envelope,
    ServerBroadcast, ServerError, ServerNotice, ServerPresenceState, ServerSubscribed,
    ServerWelcome,
};

use crate::state::{channel_workspace, ChannelKind, ClientHandle, RelayState};

type Outbound = mpsc::UnboundedSender<Message>;

pub struct RelayServer {
    config: RelayConfig,
    listener: TcpListener,
    state: Arc<RwLock<RelayState>>,
}

impl RelayServer {
    pub async fn bind(config: RelayConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        Ok(Self {
            config,
            listener,
            state: Arc::new(RwLock::new(RelayState::default())),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(addr = %self.local_addr()?, "relay listening");
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let conn_id = new_connection_id();
            tracing::debug!(conn = %conn_id, %addr, "connection accepted");
            let state = Arc::clone(&self.state);
            let config = self.config.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, state, config, conn_id.clone(), addr).await {
                    tracing::warn!(conn = %conn_id, error = %err, "connection error");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<RwLock<RelayState>>,
    config: RelayConfig,
    conn_id: String,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_write.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut joined: Option<ClientHandle> = None;
    let result = serve(&mut ws_read, &tx, &state, &config, &conn_id, &mut joined).await;

    match joined {
        Some(client) => {
            let mut state_guard = state.write().await;
            let changed = state_guard.remove_client(&conn_id);
            for channel in &changed {
                push_snapshot(&state_guard, channel);
            }
            drop(state_guard);
            tracing::info!(
                conn = %conn_id,
                user = %client.user_id,
                channels = changed.len(),
                "client disconnected"
            );
        }
        None => tracing::debug!(conn = %conn_id, %addr, "closed before join"),
    }

    writer.abort();
    result
}

async fn serve<S>(
    ws_read: &mut S,
    tx: &Outbound,
    state: &Arc<RwLock<RelayState>>,
    config: &RelayConfig,
    conn_id: &str,
    joined: &mut Option<ClientHandle>,
) -> anyhow::Result<()>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = ws_read.next().await {
        let msg = msg?;
        if msg.is_close() {
            break;
        }
        if !msg.is_text() {
            continue;
        }
        let env: Envelope = match serde_json::from_str(msg.to_text()?) {
            Ok(env) => env,
            Err(err) => {
                send_error(tx, "malformed", &err.to_string(), None)?;
                continue;
            }
        };

        if joined.is_none() {
            if env.message_type != "client.join" {
                send_error(tx, "join_required", "expected client.join", None)?;
                tracing::warn!(conn = %conn_id, "message before join");
                break;
            }
            let Some(join) = decode::<ClientJoin>(tx, env.payload)? else {
                continue;
            };
            if join.user_id.is_empty() || join.workspace_id.is_empty() {
                send_error(tx, "invalid_join", "user_id and workspace_id are required", None)?;
                continue;
            }
            let handle = ClientHandle {
                connection_id: conn_id.to_string(),
                user_id: join.user_id,
                workspace_id: join.workspace_id,
                tx: tx.clone(),
            };
            state.write().await.add_client(handle.clone());
            let welcome = ServerWelcome {
                connection_id: conn_id.to_string(),
                session_id: uuid::Uuid::new_v4().to_string(),
            };
            send_envelope(tx, "server.welcome", &welcome)?;
            tracing::info!(
                conn = %conn_id,
                user = %handle.user_id,
                workspace = %handle.workspace_id,
                "client joined"
            );
            *joined = Some(handle);
            continue;
        }
        let Some(client) = joined.as_ref() else {
            continue;
        };

        match env.message_type.as_str() {
            "client.subscribe" => {
                if let Some(payload) = decode::<ClientSubscribe>(tx, env.payload)? {
                    handle_subscribe(payload, client, state, config, tx).await?;
                }
            }
            "client.unsubscribe" => {
                if let Some(payload) = decode::<ClientUnsubscribe>(tx, env.payload)? {
                    handle_unsubscribe(payload, client, state).await;
                }
            }
            "client.track" => {
                if let Some(payload) = decode::<ClientTrack>(tx, env.payload)? {
                    handle_track(payload, client, state, tx).await?;
                }
            }
            "client.broadcast" => {
                if let Some(payload) = decode::<ClientBroadcast>(tx, env.payload)? {
                    handle_broadcast(payload, client, state, tx).await?;
                }
            }
            "client.heartbeat" => {
                send_notice(tx, "pong")?;
            }
            "client.join" => {
                send_error(tx, "already_joined", "connection already joined", None)?;
            }
            other => {
                send_error(tx, "invalid_command", "unknown message type", None)?;
                tracing::warn!(conn = %conn_id, message_type = other, "unknown message type");
            }
        }
    }
    Ok(())
}

async fn handle_subscribe(
    payload: ClientSubscribe,
    client: &ClientHandle,
    state: &Arc<RwLock<RelayState>>,
    config: &RelayConfig,
    tx: &Outbound,
) -> anyhow::Result<()> {
    let channel = payload.channel;
    let Some(kind) = check_channel(tx, client, &channel)? else {
        return Ok(());
    };

    let mut state_guard = state.write().await;
    if !state_guard.is_subscribed(&client.connection_id, &channel)
        && state_guard.subscription_count(&client.connection_id) >= config.max_channels_per_connection
    {
        drop(state_guard);
        send_error(tx, "too_many_channels", "channel limit reached", Some(&channel))?;
        tracing::warn!(conn = %client.connection_id, channel = %channel, "channel limit reached");
        return Ok(());
    }
    if state_guard.subscribe(&client.connection_id, &channel) {
        tracing::debug!(conn = %client.connection_id, channel = %channel, "subscribed");
    }
    send_envelope(
        tx,
        "server.subscribed",
        &ServerSubscribed {
            channel: channel.clone(),
        },
    )?;
    if kind == ChannelKind::Presence {
        let snapshot = ServerPresenceState {
            presences: state_guard.snapshot(&channel),
            channel,
        };
        send_envelope(tx, "server.presence_state", &snapshot)?;
    }
    Ok(())
}

async fn handle_unsubscribe(payload: ClientUnsubscribe, client: &ClientHandle, state: &Arc<RwLock<RelayState>>) {
    let mut state_guard = state.write().await;
    if state_guard.unsubscribe(&client.connection_id, &payload.channel) {
        push_snapshot(&state_guard, &payload.channel);
    }
    tracing::debug!(conn = %client.connection_id, channel = %payload.channel, "unsubscribed");
}

async fn handle_track(
    payload: ClientTrack,
    client: &ClientHandle,
    state: &Arc<RwLock<RelayState>>,
    tx: &Outbound,
) -> anyhow::Result<()> {
    let channel = payload.channel;
    match check_channel(tx, client, &channel)? {
        Some(ChannelKind::Presence) => {}
        Some(ChannelKind::Signaling) => {
            send_error(tx, "invalid_channel", "presence cannot be tracked here", Some(&channel))?;
            return Ok(());
        }
        None => return Ok(()),
    }
    if payload.presence.peer_id != client.user_id {
        send_error(tx, "identity_mismatch", "presence must carry the joined user id", Some(&channel))?;
        return Ok(());
    }

    let mut state_guard = state.write().await;
    if !state_guard.track(&client.connection_id, &channel, payload.presence) {
        drop(state_guard);
        send_error(tx, "not_subscribed", "subscribe before tracking", Some(&channel))?;
        return Ok(());
    }
    push_snapshot(&state_guard, &channel);
    Ok(())
}

async fn handle_broadcast(
    payload: ClientBroadcast,
    client: &ClientHandle,
    state: &Arc<RwLock<RelayState>>,
    tx: &Outbound,
) -> anyhow::Result<()> {
    let state_guard = state.read().await;
    if !state_guard.is_subscribed(&client.connection_id, &payload.channel) {
        drop(state_guard);
        send_error(tx, "not_subscribed", "subscribe before broadcasting", Some(&payload.channel))?;
        return Ok(());
    }
    let text = encode_envelope(
        "server.broadcast",
        &new_message_id(),
        now_ms(),
        &ServerBroadcast {
            channel: payload.channel.clone(),
            payload: payload.payload,
        },
    )?;
    let mut delivered = 0usize;
    for subscriber in state_guard.subscribers(&payload.channel) {
        if subscriber.connection_id == client.connection_id {
            continue;
        }
        if subscriber.tx.send(Message::Text(text.clone())).is_ok() {
            delivered += 1;
        }
    }
    tracing::trace!(conn = %client.connection_id, channel = %payload.channel, delivered, "broadcast");
    Ok(())
}

// Sends the error itself and returns `None` when the channel is refused.
fn check_channel(tx: &Outbound, client: &ClientHandle, channel: &str) -> anyhow::Result<Option<ChannelKind>> {
    let Some((kind, workspace_id)) = channel_workspace(channel) else {
        send_error(tx, "invalid_channel", "unrecognized channel name", Some(channel))?;
        return Ok(None);
    };
    if workspace_id != client.workspace_id {
        send_error(tx, "forbidden_channel", "channel belongs to another workspace", Some(channel))?;
        return Ok(None);
    }
    Ok(Some(kind))
}

fn decode<T: DeserializeOwned>(tx: &Outbound, payload: serde_json::Value) -> anyhow::Result<Option<T>> {
    match serde_json::from_value(payload) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            send_error(tx, "malformed", &err.to_string(), None)?;
            Ok(None)
        }
    }
}

fn push_snapshot(state: &RelayState, channel: &str) {
    let snapshot = ServerPresenceState {
        channel: channel.to_string(),
        presences: state.snapshot(channel),
    };
    let text = match encode_envelope("server.presence_state", &new_message_id(), now_ms(), &snapshot) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(channel, error = %err, "snapshot encode failed");
            return;
        }
    };
    for subscriber in state.subscribers(channel) {
        if subscriber.tx.send(Message::Text(text.clone())).is_err() {
            tracing::debug!(conn = %subscriber.connection_id, channel, "subscriber writer closed");
        }
    }
}

fn send_envelope<T: serde::Serialize>(tx: &Outbound, message_type: &str, payload: &T) -> anyhow::Result<()> {
    let text = encode_envelope(message_type, &new_message_id(), now_ms(), payload)?;
    tx.send(Message::Text(text))?;
    Ok(())
}

fn send_error(tx: &Outbound, code: &str, message: &str, channel: Option<&str>) -> anyhow::Result<()> {
    let payload = ServerError {
        code: code.to_string(),
        message: message.to_string(),
        channel: channel.map(str::to_string),
    };
    send_envelope(tx, "server.error", &payload)
}

fn send_notice(tx: &Outbound, text: &str) -> anyhow::Result<()> {
    let payload = ServerNotice {
        text: text.to_string(),
    };
    send_envelope(tx, "server.notice", &payload)
}
