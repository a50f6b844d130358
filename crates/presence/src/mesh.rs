use std::collections::{BTreeSet, HashMap, VecDeque};

use plaza_common::config::MeshConfig;
use plaza_protocol::{IceCandidate, PresenceRecord, SessionDescription, SignalKind, SignalMessage};
use plaza_world::Position;

use crate::error::{SignalError, TransportError};
use crate::media::LocalMedia;
use crate::session::Session;
use crate::transport::SignalSink;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSettings {
    pub proximity_radius: f64,
    pub close_on_proximity_exit: bool,
    pub early_candidate_capacity: usize,
}

impl Default for MeshSettings {
    fn default() -> Self {
        MeshSettings::from(&MeshConfig::default())
    }
}

impl From<&MeshConfig> for MeshSettings {
    fn from(config: &MeshConfig) -> Self {
        Self {
            proximity_radius: config.proximity_radius,
            close_on_proximity_exit: config.close_on_proximity_exit,
            early_candidate_capacity: config.early_candidate_capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Negotiating,
    Connected,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportState::Disconnected | TransportState::Failed | TransportState::Closed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaDirective {
    EnableMicrophone,
    EnableCamera,
    StopScreenShare,
    CollapseCallView,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshUpdate {
    pub entered: Vec<String>,
    pub exited: Vec<String>,
    pub initiated: Vec<String>,
    pub directives: Vec<MediaDirective>,
}

pub trait PeerLink {
    fn attach_local_media(&mut self, media: &LocalMedia) -> Result<(), SignalError>;
    fn create_offer(&mut self) -> Result<SessionDescription, SignalError>;
    fn create_answer(&mut self) -> Result<SessionDescription, SignalError>;
    fn set_remote_description(&mut self, description: &SessionDescription) -> Result<(), SignalError>;
    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), SignalError>;
    fn close(&mut self);
}

pub trait PeerConnector {
    type Link: PeerLink;

    fn connect(&mut self, peer_id: &str) -> Result<Self::Link, SignalError>;
}

pub struct PeerConnection<L> {
    peer_id: String,
    role: NegotiationRole,
    state: ConnectionState,
    transport_state: TransportState,
    remote_description_set: bool,
    pending_ice: VecDeque<IceCandidate>,
    remote_stream: Option<String>,
    restart: bool,
    link: L,
}

impl<L: PeerLink> PeerConnection<L> {
    fn new(peer_id: &str, role: NegotiationRole, link: L) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            role,
            state: ConnectionState::Negotiating,
            transport_state: TransportState::New,
            remote_description_set: false,
            pending_ice: VecDeque::new(),
            remote_stream: None,
            restart: false,
            link,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport_state
    }

    pub fn pending_ice(&self) -> usize {
        self.pending_ice.len()
    }

    pub fn remote_stream(&self) -> Option<&str> {
        self.remote_stream.as_deref()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn push_candidate(&mut self, candidate: IceCandidate) {
        if !self.remote_description_set {
            self.pending_ice.push_back(candidate);
            return;
        }
        if let Err(err) = self.link.add_ice_candidate(&candidate) {
            tracing::warn!(peer = %self.peer_id, error = %err, "ice candidate rejected");
        }
    }

    fn flush_pending_ice(&mut self) {
        while let Some(candidate) = self.pending_ice.pop_front() {
            if let Err(err) = self.link.add_ice_candidate(&candidate) {
                tracing::warn!(peer = %self.peer_id, error = %err, "ice candidate rejected");
            }
        }
    }
}

// Byte-wise. Both ends must use the same order.
pub fn should_initiate(local_id: &str, remote_id: &str) -> bool {
    local_id < remote_id
}

pub fn proximity_set(position: &Position, online: &[PresenceRecord], radius: f64) -> BTreeSet<String> {
    online
        .iter()
        .filter(|peer| peer.distance_to(position.x, position.y) < radius)
        .map(|peer| peer.peer_id.clone())
        .collect()
}

pub struct CallMesh<C: PeerConnector, S> {
    local_id: String,
    connector: C,
    signals: S,
    settings: MeshSettings,
    connections: HashMap<String, PeerConnection<C::Link>>,
    proximity: BTreeSet<String>,
    early_candidates: HashMap<String, VecDeque<IceCandidate>>,
    local_media: Option<LocalMedia>,
}

impl<C: PeerConnector, S: SignalSink> CallMesh<C, S> {
    pub fn new(local_id: &str, connector: C, signals: S, settings: MeshSettings) -> Self {
        Self {
            local_id: local_id.to_string(),
            connector,
            signals,
            settings,
            connections: HashMap::new(),
            proximity: BTreeSet::new(),
            early_candidates: HashMap::new(),
            local_media: None,
        }
    }

    pub fn update(&mut self, session: &Session, online: &[PresenceRecord]) -> MeshUpdate {
        let next = proximity_set(&session.position, online, self.settings.proximity_radius);
        let mut update = MeshUpdate {
            entered: next.difference(&self.proximity).cloned().collect(),
            exited: self.proximity.difference(&next).cloned().collect(),
            ..MeshUpdate::default()
        };

        if self.proximity.is_empty() && !next.is_empty() {
            if !session.media.mic_on {
                update.directives.push(MediaDirective::EnableMicrophone);
            }
            if !session.media.camera_on {
                update.directives.push(MediaDirective::EnableCamera);
            }
        } else if !self.proximity.is_empty() && next.is_empty() {
            if session.media.screen_sharing {
                update.directives.push(MediaDirective::StopScreenShare);
            }
            update.directives.push(MediaDirective::CollapseCallView);
        }
        self.proximity = next;
        self.early_candidates
            .retain(|peer, _| online.iter().any(|p| &p.peer_id == peer));

        for peer in &update.entered {
            if !should_initiate(&self.local_id, peer) {
                continue;
            }
            // A negotiation still open from an earlier visit never completed.
            let stale = self
                .connections
                .get(peer)
                .is_some_and(|c| c.state == ConnectionState::Negotiating);
            if stale {
                self.teardown(peer, "stale negotiation");
            } else if self.connections.contains_key(peer) {
                continue;
            }
            match self.initiate(peer, false) {
                Ok(()) => update.initiated.push(peer.clone()),
                Err(err) => tracing::warn!(peer = %peer, error = %err, "could not start call"),
            }
        }

        if self.settings.close_on_proximity_exit {
            for peer in &update.exited {
                self.teardown(peer, "left proximity");
            }
        }
        update
    }

    pub fn reinitiate(&mut self, peer: &str) -> Result<(), SignalError> {
        self.teardown(peer, "re-initiated");
        self.initiate(peer, true)
    }

    pub fn on_signal(&mut self, message: &SignalMessage) -> Result<(), SignalError> {
        if !message.is_for(&self.local_id) || message.from == self.local_id {
            return Ok(());
        }
        match message.kind {
            SignalKind::Offer => self.handle_offer(message),
            SignalKind::Answer => self.handle_answer(message),
            SignalKind::IceCandidate => self.handle_candidate(message),
        }
    }

    pub fn on_local_candidate(&mut self, peer: &str, candidate: &IceCandidate) {
        if !self.connections.contains_key(peer) {
            tracing::debug!(peer, "local candidate for closed connection");
            return;
        }
        match SignalMessage::ice_candidate(&self.local_id, peer, candidate) {
            Ok(message) => self.send(&message),
            Err(err) => tracing::warn!(peer, error = %err, "could not encode candidate"),
        }
    }

    pub fn on_transport_state(&mut self, peer: &str, state: TransportState) -> Option<ConnectionState> {
        let connection = self.connections.get_mut(peer)?;
        connection.transport_state = state;
        if state.is_terminal() {
            self.teardown(peer, state.as_str());
            return Some(ConnectionState::Closed);
        }
        if state == TransportState::Connected && connection.state != ConnectionState::Connected {
            connection.state = ConnectionState::Connected;
            tracing::info!(peer, "peer connected");
        }
        Some(connection.state)
    }

    pub fn on_remote_stream(&mut self, peer: &str, stream_id: &str) -> bool {
        match self.connections.get_mut(peer) {
            Some(connection) => {
                connection.remote_stream = Some(stream_id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn set_local_media(&mut self, media: LocalMedia) {
        self.local_media = Some(media);
    }

    pub fn leave(&mut self) {
        for (peer, mut connection) in self.connections.drain() {
            connection.link.close();
            tracing::info!(peer = %peer, "peer connection closed on leave");
        }
        self.proximity.clear();
        self.early_candidates.clear();
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn proximity(&self) -> &BTreeSet<String> {
        &self.proximity
    }

    pub fn connection(&self, peer: &str) -> Option<&PeerConnection<C::Link>> {
        self.connections.get(peer)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn remote_streams(&self) -> impl Iterator<Item = (&str, &str)> {
        self.connections
            .values()
            .filter_map(|c| c.remote_stream.as_deref().map(|s| (c.peer_id.as_str(), s)))
    }

    pub fn early_candidates(&self, peer: &str) -> usize {
        self.early_candidates.get(peer).map_or(0, VecDeque::len)
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    pub fn signals(&self) -> &S {
        &self.signals
    }

    pub fn signals_mut(&mut self) -> &mut S {
        &mut self.signals
    }

    fn initiate(&mut self, peer: &str, restart: bool) -> Result<(), SignalError> {
        let mut link = self.connector.connect(peer)?;
        self.attach_media(peer, &mut link);
        let offer = match link.create_offer() {
            Ok(offer) => offer,
            Err(err) => {
                link.close();
                return Err(err);
            }
        };
        let message = match SignalMessage::offer(&self.local_id, peer, &offer) {
            Ok(message) if restart => message.restarting(),
            Ok(message) => message,
            Err(err) => {
                link.close();
                return Err(TransportError::from(err).into());
            }
        };
        let mut connection = PeerConnection::new(peer, NegotiationRole::Initiator, link);
        connection.restart = restart;
        if let Some(early) = self.early_candidates.remove(peer) {
            connection.pending_ice.extend(early);
        }
        self.connections.insert(peer.to_string(), connection);
        self.send(&message);
        tracing::info!(peer, "offer sent");
        Ok(())
    }

    fn handle_offer(&mut self, message: &SignalMessage) -> Result<(), SignalError> {
        let peer = message.from.as_str();
        let description = message.description().map_err(|source| SignalError::Malformed {
            kind: "offer",
            from: peer.to_string(),
            source,
        })?;

        // Offers cross when both ends are still waiting for an answer. A restart
        // offer means the peer dropped ours, so only a restart of our own holds.
        if let Some(existing) = self.connections.get(peer) {
            let crossing = existing.role == NegotiationRole::Initiator
                && existing.state == ConnectionState::Negotiating;
            let keep_ours = crossing
                && should_initiate(&self.local_id, peer)
                && (!message.restart || existing.restart);
            if keep_ours {
                tracing::debug!(peer, "ignoring competing offer");
                return Ok(());
            }
            let reason = if crossing {
                "yielding to competing offer"
            } else {
                "peer renegotiating"
            };
            self.teardown(peer, reason);
        }

        let mut link = self.connector.connect(peer)?;
        self.attach_media(peer, &mut link);
        let mut connection = PeerConnection::new(peer, NegotiationRole::Responder, link);
        if let Some(early) = self.early_candidates.remove(peer) {
            connection.pending_ice.extend(early);
        }
        self.connections.insert(peer.to_string(), connection);

        if let Err(err) = self.answer(peer, &description) {
            self.abandon(peer, &err);
            return Err(err);
        }
        tracing::info!(peer, "answer sent");
        Ok(())
    }

    fn answer(&mut self, peer: &str, description: &SessionDescription) -> Result<(), SignalError> {
        let connection = self
            .connections
            .get_mut(peer)
            .ok_or_else(|| SignalError::negotiation(peer, "connection missing"))?;
        connection.link.set_remote_description(description)?;
        connection.remote_description_set = true;
        let answer = connection.link.create_answer()?;
        connection.flush_pending_ice();
        let message =
            SignalMessage::answer(&self.local_id, peer, &answer).map_err(TransportError::from)?;
        self.send(&message);
        Ok(())
    }

    fn handle_answer(&mut self, message: &SignalMessage) -> Result<(), SignalError> {
        let peer = message.from.as_str();
        let description = message.description().map_err(|source| SignalError::Malformed {
            kind: "answer",
            from: peer.to_string(),
            source,
        })?;
        let Some(connection) = self.connections.get_mut(peer) else {
            tracing::debug!(peer, "answer without a connection; ignored");
            return Ok(());
        };
        match connection.link.set_remote_description(&description) {
            Ok(()) => {
                connection.remote_description_set = true;
                connection.flush_pending_ice();
                Ok(())
            }
            Err(err) => {
                self.abandon(peer, &err);
                Err(err)
            }
        }
    }

    fn handle_candidate(&mut self, message: &SignalMessage) -> Result<(), SignalError> {
        let peer = message.from.as_str();
        let candidate = message.candidate().map_err(|source| SignalError::Malformed {
            kind: "ice-candidate",
            from: peer.to_string(),
            source,
        })?;
        if let Some(connection) = self.connections.get_mut(peer) {
            connection.push_candidate(candidate);
        } else {
            self.buffer_early(peer, candidate);
        }
        Ok(())
    }

    fn buffer_early(&mut self, peer: &str, candidate: IceCandidate) {
        let capacity = self.settings.early_candidate_capacity;
        if capacity == 0 {
            tracing::debug!(peer, "ice candidate before connection; dropped");
            return;
        }
        let queue = self.early_candidates.entry(peer.to_string()).or_default();
        if queue.len() >= capacity {
            queue.pop_front();
        }
        queue.push_back(candidate);
    }

    fn attach_media(&self, peer: &str, link: &mut C::Link) {
        let Some(media) = self.local_media else {
            return;
        };
        if let Err(err) = link.attach_local_media(&media) {
            tracing::warn!(peer, error = %err, "local media not attached");
        }
    }

    fn abandon(&mut self, peer: &str, err: &SignalError) {
        tracing::warn!(peer, error = %err, "negotiation abandoned");
        self.teardown(peer, "negotiation failed");
    }

    fn teardown(&mut self, peer: &str, reason: &str) -> bool {
        self.early_candidates.remove(peer);
        let Some(mut connection) = self.connections.remove(peer) else {
            return false;
        };
        connection.state = ConnectionState::Closed;
        connection.remote_stream = None;
        connection.link.close();
        tracing::info!(peer, reason, "peer connection closed");
        true
    }

    fn send(&mut self, message: &SignalMessage) {
        if let Err(err) = self.signals.send_signal(message) {
            tracing::warn!(to = %message.to, error = %err, "signal not sent");
        }
    }
}
