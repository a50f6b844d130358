use std::borrow::Cow;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::client_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use plaza_common::config::ClientConfig;
use plaza_common::ids::{new_message_id, now_ms};
use plaza_presence::{PresenceTransport, SignalSink, TransportError};
use plaza_protocol::envelope::encode_envelope;
use plaza_protocol::{
    signaling_channel, ClientBroadcast, ClientHeartbeat, ClientJoin, ClientSubscribe, ClientTrack,
    ClientUnsubscribe, Envelope, PresenceRecord, ServerError, ServerWelcome, SignalMessage,
};

const CONNECT_TIMEOUT_SECS: u64 = 10;

pub enum OutgoingMessage {
    Envelope(Envelope),
    Close,
}

pub struct Connection {
    pub outgoing: mpsc::UnboundedSender<OutgoingMessage>,
    pub incoming: mpsc::UnboundedReceiver<Envelope>,
    pub welcome: ServerWelcome,
    pub writer: JoinHandle<()>,
}

pub async fn connect(config: &ClientConfig) -> anyhow::Result<Connection> {
    let url = Url::parse(&config.relay_url)?;
    let host = url.host_str().ok_or_else(|| anyhow::anyhow!("invalid relay_url"))?;
    let port = url.port_or_known_default().ok_or_else(|| anyhow::anyhow!("invalid relay_url"))?;
    let addr = format!("{host}:{port}");

    let tcp = timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), TcpStream::connect(addr))
        .await
        .map_err(|_| anyhow::anyhow!("connect timeout ({CONNECT_TIMEOUT_SECS}s)"))??;
    let (ws_stream, _) = timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        client_async(config.relay_url.as_str(), tcp),
    )
    .await
    .map_err(|_| anyhow::anyhow!("websocket handshake timeout ({CONNECT_TIMEOUT_SECS}s)"))??;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let join = ClientJoin {
        user_id: config.identity.user_id.clone(),
        workspace_id: config.workspace_id.clone(),
    };
    let text = encode_envelope("client.join", &new_message_id(), now_ms(), &join)?;
    ws_write.send(Message::Text(text)).await?;

    let welcome_msg = timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), ws_read.next())
        .await
        .map_err(|_| anyhow::anyhow!("timeout waiting for server.welcome"))?
        .ok_or_else(|| anyhow::anyhow!("no server welcome"))??;
    let welcome_env: Envelope = serde_json::from_str(welcome_msg.to_text()?)?;
    match welcome_env.message_type.as_str() {
        "server.welcome" => {}
        "server.error" => {
            let err: ServerError = serde_json::from_value(welcome_env.payload)?;
            anyhow::bail!("join rejected: {} ({})", err.message, err.code)
        }
        other => anyhow::bail!("expected server.welcome, got {other}"),
    }
    let welcome: ServerWelcome = serde_json::from_value(welcome_env.payload)?;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutgoingMessage>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Envelope>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match msg {
                OutgoingMessage::Envelope(env) => {
                    let Ok(text) = serde_json::to_string(&env) else {
                        continue;
                    };
                    if ws_write.send(Message::Text(text)).await.is_err() {
                        tracing::warn!("relay write failed");
                        break;
                    }
                }
                OutgoingMessage::Close => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: Cow::Borrowed("client exit"),
                    };
                    let _ = ws_write.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = ws_read.next().await {
            let Ok(msg) = msg else {
                break;
            };
            if !msg.is_text() {
                continue;
            }
            match serde_json::from_str::<Envelope>(msg.to_text().unwrap_or("")) {
                Ok(env) => {
                    if in_tx.send(env).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::debug!(error = %err, "unreadable frame from relay"),
            }
        }
    });

    Ok(Connection {
        outgoing: out_tx,
        incoming: in_rx,
        welcome,
        writer,
    })
}

// Sends never block; they fail only once the writer task is gone.
#[derive(Clone)]
pub struct RelayLink {
    outgoing: mpsc::UnboundedSender<OutgoingMessage>,
    signaling_channel: String,
}

impl RelayLink {
    pub fn new(outgoing: mpsc::UnboundedSender<OutgoingMessage>, workspace_id: &str) -> Self {
        Self {
            outgoing,
            signaling_channel: signaling_channel(workspace_id),
        }
    }

    pub fn signaling_channel(&self) -> &str {
        &self.signaling_channel
    }

    pub fn subscribe_signaling(&mut self) -> Result<(), TransportError> {
        let channel = self.signaling_channel.clone();
        self.subscribe(&channel)
    }

    pub fn heartbeat(&self) -> Result<(), TransportError> {
        self.send(
            "client.heartbeat",
            &ClientHeartbeat {
                nonce: new_message_id(),
            },
        )
    }

    pub fn close(&self) {
        let _ = self.outgoing.send(OutgoingMessage::Close);
    }

    fn send<T: Serialize>(&self, message_type: &str, payload: &T) -> Result<(), TransportError> {
        let env = Envelope {
            message_type: message_type.to_string(),
            id: new_message_id(),
            ts: now_ms(),
            payload: serde_json::to_value(payload)?,
        };
        self.outgoing
            .send(OutgoingMessage::Envelope(env))
            .map_err(|_| TransportError::Closed)
    }
}

impl PresenceTransport for RelayLink {
    fn subscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        self.send(
            "client.subscribe",
            &ClientSubscribe {
                channel: channel.to_string(),
            },
        )
    }

    fn unsubscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        self.send(
            "client.unsubscribe",
            &ClientUnsubscribe {
                channel: channel.to_string(),
            },
        )
    }

    fn track(&mut self, channel: &str, presence: &PresenceRecord) -> Result<(), TransportError> {
        self.send(
            "client.track",
            &ClientTrack {
                channel: channel.to_string(),
                presence: presence.clone(),
            },
        )
    }
}

impl SignalSink for RelayLink {
    fn send_signal(&mut self, message: &SignalMessage) -> Result<(), TransportError> {
        self.send(
            "client.broadcast",
            &ClientBroadcast {
                channel: self.signaling_channel.clone(),
                payload: serde_json::to_value(message)?,
            },
        )
    }
}
