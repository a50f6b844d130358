use tokio::sync::mpsc;

use plaza_presence::{LocalMedia, PeerConnector, PeerLink, SignalError, TransportState};
use plaza_protocol::{IceCandidate, SdpType, SessionDescription};

#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    LocalCandidate { peer: String, candidate: IceCandidate },
    State { peer: String, state: TransportState },
    RemoteStream { peer: String, stream_id: String },
}

pub struct HeadlessConnector {
    local_id: String,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl HeadlessConnector {
    pub fn new(local_id: &str, events: mpsc::UnboundedSender<PeerEvent>) -> Self {
        Self {
            local_id: local_id.to_string(),
            events,
        }
    }
}

impl PeerConnector for HeadlessConnector {
    type Link = HeadlessLink;

    fn connect(&mut self, peer_id: &str) -> Result<HeadlessLink, SignalError> {
        if self.events.is_closed() {
            return Err(SignalError::Connect {
                peer: peer_id.to_string(),
                reason: "event loop gone".to_string(),
            });
        }
        Ok(HeadlessLink {
            local_id: self.local_id.clone(),
            peer: peer_id.to_string(),
            media: LocalMedia::Placeholder,
            local: None,
            remote: None,
            candidates: 0,
            events: self.events.clone(),
        })
    }
}

pub struct HeadlessLink {
    local_id: String,
    peer: String,
    media: LocalMedia,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    candidates: usize,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl HeadlessLink {
    fn describe(&self, sdp_type: SdpType) -> SessionDescription {
        let mut sdp = format!(
            "v=0\r\no={} 0 0 IN IP4 127.0.0.1\r\ns=plaza\r\nt=0 0\r\n",
            self.local_id
        );
        if self.media.has_audio() {
            sdp.push_str("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=sendrecv\r\n");
        } else {
            sdp.push_str("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=recvonly\r\n");
        }
        if self.media.has_video() {
            sdp.push_str("m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=sendrecv\r\n");
        }
        SessionDescription { sdp_type, sdp }
    }

    fn emit(&self, event: PeerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(peer = %self.peer, "peer event dropped");
        }
    }

    fn gather(&self) {
        self.emit(PeerEvent::LocalCandidate {
            peer: self.peer.clone(),
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 127.0.0.1 9 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
            },
        });
    }

    fn establish(&self) {
        self.emit(PeerEvent::State {
            peer: self.peer.clone(),
            state: TransportState::Connected,
        });
        self.emit(PeerEvent::RemoteStream {
            peer: self.peer.clone(),
            stream_id: format!("stream-{}", self.peer),
        });
    }
}

impl PeerLink for HeadlessLink {
    fn attach_local_media(&mut self, media: &LocalMedia) -> Result<(), SignalError> {
        self.media = *media;
        Ok(())
    }

    fn create_offer(&mut self) -> Result<SessionDescription, SignalError> {
        let offer = self.describe(SdpType::Offer);
        self.local = Some(offer.clone());
        self.gather();
        Ok(offer)
    }

    fn create_answer(&mut self) -> Result<SessionDescription, SignalError> {
        match &self.remote {
            Some(remote) if remote.sdp_type == SdpType::Offer => {}
            _ => return Err(SignalError::negotiation(&self.peer, "answer requested without an offer")),
        }
        let answer = self.describe(SdpType::Answer);
        self.local = Some(answer.clone());
        self.gather();
        self.establish();
        Ok(answer)
    }

    fn set_remote_description(&mut self, description: &SessionDescription) -> Result<(), SignalError> {
        if !description.sdp.starts_with("v=0") {
            return Err(SignalError::negotiation(&self.peer, "session description is not sdp"));
        }
        let expected = match self.local {
            Some(ref local) if local.sdp_type == SdpType::Offer => SdpType::Answer,
            Some(_) => return Err(SignalError::negotiation(&self.peer, "already answered")),
            None => SdpType::Offer,
        };
        if description.sdp_type != expected {
            return Err(SignalError::negotiation(&self.peer, "unexpected description type"));
        }
        self.remote = Some(description.clone());
        if expected == SdpType::Answer {
            self.establish();
        }
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), SignalError> {
        if candidate.candidate.is_empty() {
            return Err(SignalError::negotiation(&self.peer, "empty candidate"));
        }
        self.candidates += 1;
        tracing::trace!(peer = %self.peer, count = self.candidates, "remote candidate added");
        Ok(())
    }

    fn close(&mut self) {
        self.local = None;
        self.remote = None;
    }
}
