use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};

use plaza_common::config::ClientConfig;
use plaza_common::ids::now_ms;
use plaza_presence::{
    acquire_local_media, CallMesh, ConnectionState, LocalMedia, MediaDevices, MediaDirective,
    MeshSettings, PresenceEvent, PresenceSynchronizer, Session, SyncOutcome, SyncSettings,
};
use plaza_protocol::{
    Envelope, ServerBroadcast, ServerError, ServerNotice, ServerPresenceState, ServerSubscribed,
    SignalMessage,
};

use crate::devices::HeadlessDevices;
use crate::net::{Connection, RelayLink};
use crate::peer::{HeadlessConnector, PeerEvent};
use crate::walk::Walker;

const HEARTBEAT_SECS: u64 = 20;
const FLUSH_TIMEOUT_SECS: u64 = 2;

pub struct App {
    session: Session,
    link: RelayLink,
    sync: PresenceSynchronizer<RelayLink>,
    mesh: CallMesh<HeadlessConnector, RelayLink>,
    devices: HeadlessDevices,
    walker: Walker,
    auto_media: (bool, bool),
}

impl App {
    pub fn new(
        config: &ClientConfig,
        link: RelayLink,
        peer_events: mpsc::UnboundedSender<PeerEvent>,
    ) -> anyhow::Result<Self> {
        let mut session = Session::from_config(&config.workspace_id, &config.identity, &config.privacy)?;
        let walker = Walker::from_config(&config.walk);
        session.position = walker.start(&config.walk);

        let sync = PresenceSynchronizer::new(link.clone(), SyncSettings::from(&config.space));
        let connector = HeadlessConnector::new(&session.user_id, peer_events);
        let mut mesh = CallMesh::new(
            &session.user_id,
            connector,
            link.clone(),
            MeshSettings::from(&config.mesh),
        );

        let mut devices = HeadlessDevices::from(&config.devices);
        let media = acquire_local_media(&mut devices, config.devices.microphone, config.devices.camera);
        tracing::info!(?media, "local media acquired");
        mesh.set_local_media(media);

        Ok(Self {
            session,
            link,
            sync,
            mesh,
            devices,
            walker,
            auto_media: (media.has_audio(), media.has_video()),
        })
    }

    pub fn start(&mut self) {
        if let Err(err) = self.link.subscribe_signaling() {
            tracing::warn!(error = %err, "signaling subscribe failed");
        }
        self.reconcile();
    }

    pub fn on_walk_tick(&mut self, rng: &mut StdRng) {
        let Some((position, direction)) = self.walker.next(self.session.position, rng) else {
            return;
        };
        self.session.position = position;
        self.session.direction = direction;
        self.reconcile();
        self.sync.publish_all(&self.session, now_ms());
        self.refresh_mesh();
    }

    pub fn reconcile(&mut self) {
        let outcome = self.sync.reconcile(&self.session, now_ms());
        if !outcome.opened.is_empty() || !outcome.closed.is_empty() {
            tracing::debug!(
                opened = outcome.opened.len(),
                closed = outcome.closed.len(),
                held = self.sync.channel_count(),
                "channels reconciled"
            );
        }
        self.absorb(outcome);
    }

    pub fn on_envelope(&mut self, env: Envelope) {
        let now = now_ms();
        match env.message_type.as_str() {
            "server.subscribed" => match serde_json::from_value::<ServerSubscribed>(env.payload) {
                Ok(ack) if ack.channel == self.link.signaling_channel() => {
                    tracing::debug!(channel = %ack.channel, "signaling channel joined");
                }
                Ok(ack) => self.sync.on_subscribed(&ack.channel, &self.session, now),
                Err(err) => tracing::warn!(error = %err, "bad server.subscribed"),
            },
            "server.presence_state" => match serde_json::from_value::<ServerPresenceState>(env.payload) {
                Ok(state) => {
                    let outcome = self.sync.on_snapshot(&state.channel, state.presences, &self.session, now);
                    self.absorb(outcome);
                }
                Err(err) => tracing::warn!(error = %err, "bad server.presence_state"),
            },
            "server.broadcast" => match serde_json::from_value::<ServerBroadcast>(env.payload) {
                Ok(broadcast) if broadcast.channel == self.link.signaling_channel() => {
                    self.on_signal(broadcast.payload);
                }
                Ok(broadcast) => tracing::debug!(channel = %broadcast.channel, "broadcast ignored"),
                Err(err) => tracing::warn!(error = %err, "bad server.broadcast"),
            },
            "server.error" => match serde_json::from_value::<ServerError>(env.payload) {
                Ok(err) => self.on_server_error(err),
                Err(err) => tracing::warn!(error = %err, "bad server.error"),
            },
            "server.notice" => {
                if let Ok(notice) = serde_json::from_value::<ServerNotice>(env.payload) {
                    tracing::trace!(text = %notice.text, "notice");
                }
            }
            other => tracing::debug!(message_type = other, "unhandled message"),
        }
    }

    pub fn on_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::LocalCandidate { peer, candidate } => {
                self.mesh.on_local_candidate(&peer, &candidate);
            }
            PeerEvent::State { peer, state } => {
                if self.mesh.on_transport_state(&peer, state) == Some(ConnectionState::Connected) {
                    tracing::info!(peer = %peer, "in call");
                }
            }
            PeerEvent::RemoteStream { peer, stream_id } => {
                if self.mesh.on_remote_stream(&peer, &stream_id) {
                    tracing::debug!(peer = %peer, stream = %stream_id, "remote stream attached");
                }
            }
        }
    }

    pub fn heartbeat(&self) {
        if let Err(err) = self.link.heartbeat() {
            tracing::warn!(error = %err, "heartbeat failed");
        }
    }

    pub fn leave(&mut self) {
        self.mesh.leave();
        let outcome = self.sync.leave();
        tracing::info!(closed = outcome.closed.len(), "left workspace");
        self.link.close();
    }

    fn on_signal(&mut self, payload: serde_json::Value) {
        let message: SignalMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "unreadable signaling message");
                return;
            }
        };
        if let Err(err) = self.mesh.on_signal(&message) {
            tracing::warn!(from = %message.from, error = %err, "signaling failed");
        }
    }

    fn on_server_error(&mut self, err: ServerError) {
        let refused = matches!(
            err.code.as_str(),
            "invalid_channel" | "forbidden_channel" | "too_many_channels"
        );
        match err.channel.as_deref() {
            Some(channel) if channel == self.link.signaling_channel() => {
                tracing::warn!(code = %err.code, message = %err.message, "signaling channel error");
            }
            Some(channel) if refused => self.sync.on_subscribe_failed(channel, &err.message),
            Some(channel) => {
                tracing::warn!(channel, code = %err.code, message = %err.message, "channel error");
            }
            None => tracing::warn!(code = %err.code, message = %err.message, "relay error"),
        }
    }

    fn absorb(&mut self, outcome: SyncOutcome) {
        for event in &outcome.events {
            match event {
                PresenceEvent::PeerConnected(peer) => {
                    let name = self.sync.peer(peer).map_or("?", |p| p.name.as_str());
                    tracing::info!(peer = %peer, name, "peer online");
                }
                PresenceEvent::PeerLeft(peer) => tracing::info!(peer = %peer, "peer offline"),
            }
        }
        if outcome.online_changed {
            self.refresh_mesh();
        }
    }

    fn refresh_mesh(&mut self) {
        let update = self.mesh.update(&self.session, self.sync.online());
        for peer in &update.entered {
            tracing::debug!(peer = %peer, "peer in range");
        }
        if update.directives.is_empty() {
            return;
        }
        let (auto_mic, auto_camera) = self.auto_media;
        for directive in &update.directives {
            match directive {
                MediaDirective::EnableMicrophone => {
                    self.devices.apply(&mut self.session.media, auto_mic, false);
                }
                MediaDirective::EnableCamera => {
                    self.devices.apply(&mut self.session.media, false, auto_camera);
                }
                MediaDirective::StopScreenShare => {
                    self.devices.stop_screen_share();
                    self.session.media.screen_sharing = false;
                }
                MediaDirective::CollapseCallView => tracing::info!("call view collapsed"),
            }
        }
        self.mesh.set_local_media(local_media(&self.session));
        self.sync.publish_all(&self.session, now_ms());
    }
}

fn local_media(session: &Session) -> LocalMedia {
    match (session.media.mic_on, session.media.camera_on) {
        (true, true) => LocalMedia::AudioVideo,
        (true, false) => LocalMedia::AudioOnly,
        (false, true) => LocalMedia::VideoOnly,
        (false, false) => LocalMedia::Placeholder,
    }
}

pub async fn run(config: ClientConfig, connection: Connection) -> anyhow::Result<()> {
    let Connection {
        outgoing,
        mut incoming,
        welcome,
        writer,
    } = connection;
    tracing::info!(
        connection = %welcome.connection_id,
        session = %welcome.session_id,
        user = %config.identity.user_id,
        "joined relay"
    );

    let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
    let link = RelayLink::new(outgoing, &config.workspace_id);
    let mut app = App::new(&config, link, peer_tx)?;
    app.start();

    let mut rng = StdRng::from_entropy();
    let mut walk_ticker = interval(Duration::from_millis(config.walk.tick_ms.max(10)));
    walk_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut resync = interval(Duration::from_millis(config.space.resync_interval_ms.max(100)));
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_SECS));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = walk_ticker.tick() => app.on_walk_tick(&mut rng),
            _ = resync.tick() => app.reconcile(),
            _ = heartbeat.tick() => app.heartbeat(),
            env = incoming.recv() => match env {
                Some(env) => app.on_envelope(env),
                None => {
                    tracing::warn!("relay connection lost");
                    break;
                }
            },
            Some(event) = peer_rx.recv() => app.on_peer_event(event),
            _ = &mut shutdown => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    app.leave();
    drop(app);
    if timeout(Duration::from_secs(FLUSH_TIMEOUT_SECS), writer).await.is_err() {
        tracing::warn!("relay writer did not flush before exit");
    }
    Ok(())
}
