use serde::Serialize;

use crate::messages::Envelope;

pub fn build_envelope<T: Serialize>(
    message_type: &str,
    id: &str,
    ts: i64,
    payload: &T,
) -> anyhow::Result<Envelope> {
    let payload_value = serde_json::to_value(payload)?;
    Ok(Envelope {
        message_type: message_type.to_string(),
        id: id.to_string(),
        ts,
        payload: payload_value,
    })
}

pub fn encode_envelope<T: Serialize>(
    message_type: &str,
    id: &str,
    ts: i64,
    payload: &T,
) -> anyhow::Result<String> {
    let env = build_envelope(message_type, id, ts, payload)?;
    Ok(serde_json::to_string(&env)?)
}
