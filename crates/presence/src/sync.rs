use std::collections::{BTreeMap, BTreeSet, HashMap};

use plaza_common::config::SpaceConfig;
use plaza_protocol::{ChannelScope, PresenceChannel, PresenceRecord};
use plaza_world::{neighbors, Chunk};

use crate::payload::payload_for_scope;
use crate::session::Session;
use crate::transport::PresenceTransport;
use crate::visibility::apply_visibility;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSettings {
    pub chunk_size: f64,
    pub neighborhood_radius: u32,
    pub connect_debounce_ms: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings::from(&SpaceConfig::default())
    }
}

impl From<&SpaceConfig> for SyncSettings {
    fn from(config: &SpaceConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            neighborhood_radius: config.neighborhood_radius,
            connect_debounce_ms: (config.connect_debounce_secs as i64).saturating_mul(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    Joining,
    Joined,
}

#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub channel: PresenceChannel,
    pub chunk: Chunk,
    pub phase: ChannelPhase,
    pub snapshot: Vec<PresenceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    PeerConnected(String),
    PeerLeft(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub opened: Vec<String>,
    pub closed: Vec<String>,
    pub events: Vec<PresenceEvent>,
    pub online_changed: bool,
}

impl SyncOutcome {
    fn absorb(&mut self, other: SyncOutcome) {
        self.opened.extend(other.opened);
        self.closed.extend(other.closed);
        self.events.extend(other.events);
        self.online_changed |= other.online_changed;
    }
}

pub struct PresenceSynchronizer<T> {
    transport: T,
    settings: SyncSettings,
    channels: BTreeMap<String, ChannelHandle>,
    last_chunk: Option<Chunk>,
    online: Vec<PresenceRecord>,
    announced: HashMap<String, i64>,
}

impl<T: PresenceTransport> PresenceSynchronizer<T> {
    pub fn new(transport: T, settings: SyncSettings) -> Self {
        Self {
            transport,
            settings,
            channels: BTreeMap::new(),
            last_chunk: None,
            online: Vec::new(),
            announced: HashMap::new(),
        }
    }

    pub fn desired_channels(&self, session: &Session) -> BTreeMap<String, (PresenceChannel, Chunk)> {
        let centre = session.chunk(self.settings.chunk_size);
        let mut desired = BTreeMap::new();
        for chunk in neighbors(centre, self.settings.neighborhood_radius) {
            let chunk_key = chunk.key();
            if let Some(tenant_id) = session.tenant_id.as_deref() {
                let channel = PresenceChannel::tenant(&session.workspace_id, &chunk_key, tenant_id);
                desired.insert(channel.key(), (channel, chunk));
            }
            let channel = PresenceChannel::public(&session.workspace_id, &chunk_key);
            desired.insert(channel.key(), (channel, chunk));
        }
        desired
    }

    pub fn reconcile(&mut self, session: &Session, now_ms: i64) -> SyncOutcome {
        let desired = self.desired_channels(session);
        let mut outcome = SyncOutcome::default();

        let stale: Vec<String> = self
            .channels
            .keys()
            .filter(|key| !desired.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            self.channels.remove(&key);
            if let Err(err) = self.transport.unsubscribe(&key) {
                tracing::warn!(channel = %key, error = %err, "unsubscribe failed");
            }
            outcome.closed.push(key);
        }

        for (key, (channel, chunk)) in desired {
            if self.channels.contains_key(&key) {
                continue;
            }
            match self.transport.subscribe(&key) {
                Ok(()) => {
                    self.channels.insert(
                        key.clone(),
                        ChannelHandle {
                            channel,
                            chunk,
                            phase: ChannelPhase::Joining,
                            snapshot: Vec::new(),
                        },
                    );
                    outcome.opened.push(key);
                }
                Err(err) => {
                    tracing::warn!(channel = %key, error = %err, "subscribe failed; retrying on next reconcile");
                }
            }
        }

        let chunk = session.chunk(self.settings.chunk_size);
        if self.last_chunk != Some(chunk) {
            tracing::debug!(chunk = %chunk.key(), opened = outcome.opened.len(), closed = outcome.closed.len(), "chunk changed");
            self.last_chunk = Some(chunk);
        }

        if !outcome.closed.is_empty() {
            outcome.absorb(self.remerge(session, now_ms));
        }
        outcome
    }

    pub fn on_subscribed(&mut self, channel: &str, session: &Session, now_ms: i64) {
        let Some(handle) = self.channels.get_mut(channel) else {
            tracing::debug!(channel, "subscription acknowledged for a channel no longer wanted");
            if let Err(err) = self.transport.unsubscribe(channel) {
                tracing::warn!(channel, error = %err, "unsubscribe failed");
            }
            return;
        };
        handle.phase = ChannelPhase::Joined;
        let payload = payload_for_scope(session, &handle.channel.scope, now_ms);
        if let Err(err) = self.transport.track(channel, &payload) {
            tracing::warn!(channel, error = %err, "presence publish failed");
        }
    }

    pub fn on_subscribe_failed(&mut self, channel: &str, reason: &str) {
        if self.channels.remove(channel).is_some() {
            tracing::warn!(channel, reason, "subscription rejected");
        }
    }

    pub fn publish_all(&mut self, session: &Session, now_ms: i64) {
        for (key, handle) in &self.channels {
            if handle.phase != ChannelPhase::Joined {
                continue;
            }
            let payload = payload_for_scope(session, &handle.channel.scope, now_ms);
            if let Err(err) = self.transport.track(key, &payload) {
                tracing::warn!(channel = %key, error = %err, "presence publish failed");
            }
        }
    }

    pub fn on_snapshot(
        &mut self,
        channel: &str,
        presences: Vec<PresenceRecord>,
        session: &Session,
        now_ms: i64,
    ) -> SyncOutcome {
        let Some(handle) = self.channels.get_mut(channel) else {
            tracing::debug!(channel, "snapshot for a channel not held; ignored");
            return SyncOutcome::default();
        };
        handle.phase = ChannelPhase::Joined;
        handle.snapshot = presences;
        self.remerge(session, now_ms)
    }

    pub fn leave(&mut self) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        for key in std::mem::take(&mut self.channels).into_keys() {
            if let Err(err) = self.transport.unsubscribe(&key) {
                tracing::warn!(channel = %key, error = %err, "unsubscribe failed");
            }
            outcome.closed.push(key);
        }
        for record in self.online.drain(..) {
            outcome.events.push(PresenceEvent::PeerLeft(record.peer_id));
            outcome.online_changed = true;
        }
        self.announced.clear();
        self.last_chunk = None;
        outcome
    }

    fn remerge(&mut self, session: &Session, now_ms: i64) -> SyncOutcome {
        let merged = merge_snapshots(self.channels.values(), &session.user_id);
        let visible = apply_visibility(&merged, &session.viewer());

        let before: BTreeSet<&str> = self.online.iter().map(|p| p.peer_id.as_str()).collect();
        let after: BTreeSet<&str> = visible.iter().map(|p| p.peer_id.as_str()).collect();

        let window = self.settings.connect_debounce_ms;
        self.announced.retain(|_, last| now_ms - *last < window);

        let mut outcome = SyncOutcome::default();
        for id in after.difference(&before) {
            let recent = self
                .announced
                .get(*id)
                .is_some_and(|last| now_ms - last < window);
            if recent {
                tracing::debug!(peer = %id, "peer reconnected within debounce window");
                continue;
            }
            self.announced.insert(id.to_string(), now_ms);
            outcome.events.push(PresenceEvent::PeerConnected(id.to_string()));
        }
        for id in before.difference(&after) {
            outcome.events.push(PresenceEvent::PeerLeft(id.to_string()));
        }

        outcome.online_changed = self.online != visible;
        self.online = visible;
        outcome
    }

    pub fn online(&self) -> &[PresenceRecord] {
        &self.online
    }

    pub fn peer(&self, peer_id: &str) -> Option<&PresenceRecord> {
        self.online
            .binary_search_by(|p| p.peer_id.as_str().cmp(peer_id))
            .ok()
            .map(|index| &self.online[index])
    }

    pub fn find_by_name(&self, name: &str) -> Option<&PresenceRecord> {
        self.online
            .iter()
            .find(|p| !p.is_private && p.name.eq_ignore_ascii_case(name))
    }

    pub fn channel_keys(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn channel(&self, key: &str) -> Option<&ChannelHandle> {
        self.channels.get(key)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

// Tenant scope beats public scope, then the newer `updated_at` wins. Ties keep
// the first channel in key order, whatever order the snapshots arrived in.
pub fn merge_snapshots<'a>(
    channels: impl IntoIterator<Item = &'a ChannelHandle>,
    self_id: &str,
) -> Vec<PresenceRecord> {
    let mut merged: BTreeMap<&str, ((u8, i64), &PresenceRecord)> = BTreeMap::new();
    for handle in channels {
        let scope_rank = match handle.channel.scope {
            ChannelScope::Tenant(_) => 1,
            ChannelScope::Public => 0,
        };
        for record in &handle.snapshot {
            if record.peer_id == self_id {
                continue;
            }
            let rank = (scope_rank, record.updated_at);
            let replace = merged
                .get(record.peer_id.as_str())
                .map_or(true, |(existing, _)| *existing < rank);
            if replace {
                merged.insert(record.peer_id.as_str(), (rank, record));
            }
        }
    }
    merged.into_values().map(|(_, record)| record.clone()).collect()
}
