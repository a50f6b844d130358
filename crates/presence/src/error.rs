#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("relay link closed")]
    Closed,

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("malformed {kind} from {from}: {source}")]
    Malformed {
        kind: &'static str,
        from: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("peer connection to {peer} could not be created: {reason}")]
    Connect { peer: String, reason: String },

    #[error("negotiation with {peer} failed: {reason}")]
    Negotiation { peer: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SignalError {
    pub fn negotiation(peer: &str, reason: impl Into<String>) -> Self {
        SignalError::Negotiation {
            peer: peer.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("permission denied for {0}")]
    Denied(&'static str),

    #[error("{0} unavailable")]
    Unavailable(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid role: {0}")]
    Role(String),
}
