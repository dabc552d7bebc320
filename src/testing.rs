//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::{HttpRequest, Input};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, watch};

use crate::{
    audio::{
        events::{EventBus, SessionEvent},
        player::{AudioPlayer, AudioResource, PlayerId, PlayerSignal, SignalSender},
        session::{PlaybackSession, SessionOptions, SessionServices, SessionSettings},
        track::Track,
    },
    error::{PlayerError, PlayerResult},
    sources::{AudioSourceProvider, AudioStream, StreamOptions, TrackResolver},
    voice::{ConnectionState, VoiceConnection, VoiceTransport},
};

pub(crate) const GUILD: GuildId = GuildId::new(1);
pub(crate) const VOICE: ChannelId = ChannelId::new(10);
pub(crate) const TEXT: ChannelId = ChannelId::new(20);

pub(crate) fn track(title: &str, secs: u64) -> Track {
    Track::new(
        format!("https://youtu.be/{title}"),
        title,
        Duration::from_secs(secs),
    )
}

/// Drains whatever is already queued on an event channel.
pub(crate) fn collect_events(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<&'static str> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind());
    }
    kinds
}

// Resolver

/// Answers a query with a registered result list, or with one 3-minute
/// track named after the query.
#[derive(Default)]
pub(crate) struct CatalogResolver {
    entries: Mutex<HashMap<String, Vec<Track>>>,
}

impl CatalogResolver {
    pub(crate) fn add(&self, query: &str, results: &[(&str, u64)]) {
        let tracks = results
            .iter()
            .map(|(title, secs)| track(title, *secs))
            .collect();
        self.entries.lock().insert(query.to_string(), tracks);
    }
}

#[async_trait]
impl TrackResolver for CatalogResolver {
    async fn search(&self, query: &str) -> PlayerResult<Vec<Track>> {
        Ok(self
            .entries
            .lock()
            .get(query)
            .cloned()
            .unwrap_or_else(|| vec![track(query, 180)]))
    }
}

// Source

pub(crate) struct FakeSource {
    client: reqwest::Client,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    opened: Mutex<Vec<String>>,
}

impl FakeSource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(Duration::ZERO),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn fail_url(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl AudioSourceProvider for FakeSource {
    async fn open(&self, url: &str, _options: StreamOptions) -> PlayerResult<AudioStream> {
        self.opened.lock().push(url.to_string());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(url) {
            return Err(PlayerError::Playback(format!("stream unavailable: {url}")));
        }
        let input = Input::from(HttpRequest::new(self.client.clone(), url.to_string()));
        Ok(AudioStream::new(url, input))
    }
}

// Player

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlayRecord {
    pub title: String,
    pub url: String,
    pub volume: f32,
    pub offset: Duration,
}

#[derive(Default)]
struct FakePlayerState {
    plays: Vec<PlayRecord>,
    loaded: bool,
    paused: bool,
    volume: Option<f32>,
    position: Option<Duration>,
    stops: usize,
}

pub(crate) struct FakePlayer {
    id: PlayerId,
    signals: SignalSender,
    state: Mutex<FakePlayerState>,
}

impl FakePlayer {
    fn new(signals: SignalSender) -> Self {
        Self {
            id: PlayerId::next(),
            signals,
            state: Mutex::new(FakePlayerState::default()),
        }
    }

    pub(crate) fn played_titles(&self) -> Vec<String> {
        self.state.lock().plays.iter().map(|p| p.title.clone()).collect()
    }

    pub(crate) fn last_play(&self) -> Option<PlayRecord> {
        self.state.lock().plays.last().cloned()
    }

    pub(crate) fn play_count(&self) -> usize {
        self.state.lock().plays.len()
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.state.lock().stops
    }

    pub(crate) fn volume(&self) -> Option<f32> {
        self.state.lock().volume
    }

    pub(crate) fn has_resource(&self) -> bool {
        self.state.lock().loaded
    }

    /// Moves the playhead of the active resource forward.
    pub(crate) fn advance(&self, elapsed: Duration) {
        if let Some(position) = self.state.lock().position.as_mut() {
            *position += elapsed;
        }
    }

    /// The active resource finishes on its own.
    pub(crate) fn end_track(&self) {
        self.unload();
        let _ = self.signals.send(PlayerSignal::TrackEnded);
    }

    pub(crate) fn fail_track(&self, reason: &str) {
        self.unload();
        let _ = self
            .signals
            .send(PlayerSignal::TrackErrored(reason.to_string()));
    }

    fn unload(&self) {
        let mut state = self.state.lock();
        state.loaded = false;
        state.position = None;
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    async fn play(&self, resource: AudioResource) -> PlayerResult<()> {
        let mut state = self.state.lock();
        state.plays.push(PlayRecord {
            title: resource.track.title().to_string(),
            url: resource.stream.url().to_string(),
            volume: resource.volume,
            offset: resource.start_offset,
        });
        state.loaded = true;
        state.paused = false;
        state.volume = Some(resource.volume);
        state.position = Some(resource.start_offset);
        Ok(())
    }

    fn pause(&self) -> bool {
        let mut state = self.state.lock();
        if state.loaded && !state.paused {
            state.paused = true;
            true
        } else {
            false
        }
    }

    fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if state.loaded && state.paused {
            state.paused = false;
            true
        } else {
            false
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.stops += 1;
        state.loaded = false;
        state.paused = false;
        state.position = None;
    }

    fn set_volume(&self, volume: f32) -> bool {
        let mut state = self.state.lock();
        if state.loaded {
            state.volume = Some(volume);
            true
        } else {
            false
        }
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    async fn position(&self) -> Option<Duration> {
        self.state.lock().position
    }
}

// Voice

pub(crate) struct FakeConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    state: watch::Sender<ConnectionState>,
    subscribe_ok: Arc<AtomicBool>,
    subscriptions: AtomicUsize,
    destroyed: AtomicBool,
}

impl FakeConnection {
    /// Simulates a gateway-driven state transition.
    pub(crate) fn signal(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn subscribe(&self, _player: &dyn AudioPlayer) -> bool {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.subscribe_ok.load(Ordering::SeqCst)
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct FakeTransport {
    joinable: AtomicBool,
    subscribe_ok: Arc<AtomicBool>,
    joins: AtomicUsize,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
    players: Mutex<Vec<Arc<FakePlayer>>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            joinable: AtomicBool::new(true),
            subscribe_ok: Arc::new(AtomicBool::new(true)),
            joins: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
            players: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_joinable(&self, joinable: bool) {
        self.joinable.store(joinable, Ordering::SeqCst);
    }

    pub(crate) fn set_subscribe_ok(&self, ok: bool) {
        self.subscribe_ok.store(ok, Ordering::SeqCst);
    }

    pub(crate) fn join_count(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub(crate) fn last_connection(&self) -> Option<Arc<FakeConnection>> {
        self.connections.lock().last().cloned()
    }

    pub(crate) fn players(&self) -> Vec<Arc<FakePlayer>> {
        self.players.lock().clone()
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    fn is_joinable(&self, _guild_id: GuildId, _channel_id: ChannelId) -> bool {
        self.joinable.load(Ordering::SeqCst)
    }

    async fn join_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlayerResult<Arc<dyn VoiceConnection>> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        let (state, _) = watch::channel(ConnectionState::Ready);
        let connection = Arc::new(FakeConnection {
            guild_id,
            channel_id,
            state,
            subscribe_ok: self.subscribe_ok.clone(),
            subscriptions: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        });
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }

    fn create_player(&self, _guild_id: GuildId, signals: SignalSender) -> Arc<dyn AudioPlayer> {
        let player = Arc::new(FakePlayer::new(signals));
        self.players.lock().push(player.clone());
        player
    }
}

// Harness

pub(crate) struct Harness {
    pub resolver: Arc<CatalogResolver>,
    pub source: Arc<FakeSource>,
    pub transport: Arc<FakeTransport>,
    pub bus: EventBus,
    pub settings: SessionSettings,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self {
            resolver: Arc::new(CatalogResolver::default()),
            source: FakeSource::new(),
            transport: FakeTransport::new(),
            bus: EventBus::new(),
            settings: SessionSettings::default(),
        }
    }

    pub(crate) fn services(&self) -> SessionServices {
        self.services_with(self.resolver.clone())
    }

    fn services_with(&self, resolver: Arc<dyn TrackResolver>) -> SessionServices {
        SessionServices {
            resolver,
            sources: self.source.clone(),
            transport: self.transport.clone(),
            events: self.bus.clone(),
            settings: self.settings.clone(),
        }
    }

    pub(crate) fn options(guild_id: GuildId) -> SessionOptions {
        SessionOptions::new(guild_id)
            .voice_channel(VOICE)
            .text_channel(TEXT)
    }

    pub(crate) fn session(&self) -> Arc<PlaybackSession> {
        self.session_for(GUILD)
    }

    pub(crate) fn session_for(&self, guild_id: GuildId) -> Arc<PlaybackSession> {
        PlaybackSession::new(Self::options(guild_id), self.services())
    }

    pub(crate) fn session_with_resolver(
        &self,
        resolver: Arc<dyn TrackResolver>,
    ) -> Arc<PlaybackSession> {
        PlaybackSession::new(Self::options(GUILD), self.services_with(resolver))
    }

    pub(crate) fn session_without_voice_channel(&self) -> Arc<PlaybackSession> {
        PlaybackSession::new(SessionOptions::new(GUILD), self.services())
    }

    /// Player of the first session created through this harness.
    pub(crate) fn player(&self) -> Arc<FakePlayer> {
        self.transport
            .players()
            .first()
            .cloned()
            .expect("no session was created")
    }

    /// Lets spawned signal handlers run to completion.
    pub(crate) async fn settle(&self) {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
