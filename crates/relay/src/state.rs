use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use plaza_protocol::{parse_signaling_channel, PresenceChannel, PresenceRecord};

#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub connection_id: String,
    pub user_id: String,
    pub workspace_id: String,
    pub tx: mpsc::UnboundedSender<Message>,
}

#[derive(Debug, Default)]
pub struct ChannelState {
    pub subscribers: BTreeSet<String>,
    pub presences: BTreeMap<String, PresenceRecord>,
}

impl ChannelState {
    pub fn snapshot(&self) -> Vec<PresenceRecord> {
        self.presences.values().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Presence,
    Signaling,
}

pub fn channel_workspace(channel: &str) -> Option<(ChannelKind, String)> {
    if let Some(workspace_id) = parse_signaling_channel(channel) {
        return Some((ChannelKind::Signaling, workspace_id.to_string()));
    }
    PresenceChannel::parse(channel).map(|parsed| (ChannelKind::Presence, parsed.workspace_id))
}

#[derive(Debug, Default)]
pub struct RelayState {
    pub clients: HashMap<String, ClientHandle>,
    pub channels: HashMap<String, ChannelState>,
    pub subscriptions: HashMap<String, BTreeSet<String>>,
}

impl RelayState {
    pub fn add_client(&mut self, handle: ClientHandle) {
        self.subscriptions
            .entry(handle.connection_id.clone())
            .or_default();
        self.clients.insert(handle.connection_id.clone(), handle);
    }

    pub fn subscription_count(&self, connection_id: &str) -> usize {
        self.subscriptions.get(connection_id).map_or(0, BTreeSet::len)
    }

    pub fn is_subscribed(&self, connection_id: &str, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|state| state.subscribers.contains(connection_id))
    }

    pub fn subscribe(&mut self, connection_id: &str, channel: &str) -> bool {
        let added = self
            .channels
            .entry(channel.to_string())
            .or_default()
            .subscribers
            .insert(connection_id.to_string());
        if added {
            self.subscriptions
                .entry(connection_id.to_string())
                .or_default()
                .insert(channel.to_string());
        }
        added
    }

    pub fn unsubscribe(&mut self, connection_id: &str, channel: &str) -> bool {
        if let Some(channels) = self.subscriptions.get_mut(connection_id) {
            channels.remove(channel);
        }
        let Some(state) = self.channels.get_mut(channel) else {
            return false;
        };
        state.subscribers.remove(connection_id);
        let changed = state.presences.remove(connection_id).is_some();
        if state.subscribers.is_empty() {
            self.channels.remove(channel);
        }
        changed
    }

    pub fn track(&mut self, connection_id: &str, channel: &str, presence: PresenceRecord) -> bool {
        match self.channels.get_mut(channel) {
            Some(state) if state.subscribers.contains(connection_id) => {
                state.presences.insert(connection_id.to_string(), presence);
                true
            }
            _ => false,
        }
    }

    // Returns the channels whose snapshot changed.
    pub fn remove_client(&mut self, connection_id: &str) -> Vec<String> {
        self.clients.remove(connection_id);
        let channels = self.subscriptions.remove(connection_id).unwrap_or_default();
        channels
            .into_iter()
            .filter(|channel| self.unsubscribe(connection_id, channel))
            .collect()
    }

    pub fn snapshot(&self, channel: &str) -> Vec<PresenceRecord> {
        self.channels
            .get(channel)
            .map(ChannelState::snapshot)
            .unwrap_or_default()
    }

    pub fn subscribers<'a>(&'a self, channel: &str) -> impl Iterator<Item = &'a ClientHandle> + 'a {
        self.channels
            .get(channel)
            .into_iter()
            .flat_map(|state| state.subscribers.iter())
            .filter_map(|connection_id| self.clients.get(connection_id))
    }
}
