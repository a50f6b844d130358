use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

// Broadcast on `webrtc:{workspace_id}`; only the peer named in `to` acts on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub from: String,
    pub to: String,
    pub payload: serde_json::Value,
    // Set on offers sent to recover a negotiation the other side may have dropped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub restart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

impl SignalMessage {
    pub fn offer(from: &str, to: &str, description: &SessionDescription) -> serde_json::Result<Self> {
        Self::build(SignalKind::Offer, from, to, description)
    }

    pub fn answer(from: &str, to: &str, description: &SessionDescription) -> serde_json::Result<Self> {
        Self::build(SignalKind::Answer, from, to, description)
    }

    pub fn ice_candidate(from: &str, to: &str, candidate: &IceCandidate) -> serde_json::Result<Self> {
        Self::build(SignalKind::IceCandidate, from, to, candidate)
    }

    fn build<T: Serialize>(kind: SignalKind, from: &str, to: &str, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            kind,
            from: from.to_string(),
            to: to.to_string(),
            payload: serde_json::to_value(payload)?,
            restart: false,
        })
    }

    pub fn restarting(mut self) -> Self {
        self.restart = true;
        self
    }

    pub fn is_for(&self, peer_id: &str) -> bool {
        self.to == peer_id
    }

    pub fn description(&self) -> serde_json::Result<SessionDescription> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn candidate(&self) -> serde_json::Result<IceCandidate> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ice_candidate_uses_browser_field_names() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };
        let msg = SignalMessage::ice_candidate("u_a", "u_b", &candidate).expect("build");
        let wire = serde_json::to_value(&msg).expect("encode");
        assert_eq!(wire["type"], "ice-candidate");
        assert_eq!(wire["payload"]["sdpMLineIndex"], 0);
        assert_eq!(wire["payload"]["sdpMid"], "0");
        assert_eq!(msg.candidate().expect("decode"), candidate);
    }

    #[test]
    fn restart_flag_is_only_on_the_wire_when_set() {
        let description = SessionDescription {
            sdp_type: SdpType::Offer,
            sdp: "v=0".to_string(),
        };
        let plain = SignalMessage::offer("u_a", "u_b", &description).expect("build");
        let wire = serde_json::to_value(&plain).expect("encode");
        assert!(wire.get("restart").is_none());

        let restart = plain.restarting();
        let wire = serde_json::to_string(&restart).expect("encode");
        let decoded: SignalMessage = serde_json::from_str(&wire).expect("decode");
        assert!(decoded.restart);
    }

    #[test]
    fn malformed_description_is_an_error() {
        let msg = SignalMessage {
            kind: SignalKind::Offer,
            from: "u_a".to_string(),
            to: "u_b".to_string(),
            payload: serde_json::json!({ "sdp": 7 }),
            restart: false,
        };
        assert!(msg.description().is_err());
        assert!(msg.is_for("u_b"));
        assert!(!msg.is_for("u_a"));
    }
}
