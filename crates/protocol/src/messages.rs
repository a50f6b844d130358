use serde::{Deserialize, Serialize};

use crate::presence::PresenceRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: String,
    pub ts: i64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientJoin {
    pub user_id: String,
    pub workspace_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSubscribe {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientUnsubscribe {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTrack {
    pub channel: String,
    pub presence: PresenceRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientBroadcast {
    pub channel: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHeartbeat {
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerWelcome {
    pub connection_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSubscribed {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerPresenceState {
    pub channel: String,
    pub presences: Vec<PresenceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerBroadcast {
    pub channel: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerNotice {
    pub text: String,
}
