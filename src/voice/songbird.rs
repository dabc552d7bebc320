use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::{
    cache::Cache,
    model::{
        channel::ChannelType,
        id::{ChannelId, GuildId},
    },
};
use songbird::{
    events::CoreEvent, tracks::Track as SongbirdTrack, tracks::TrackHandle, Call, Event,
    EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{ConnectionState, VoiceConnection, VoiceTransport};
use crate::{
    audio::player::{AudioPlayer, AudioResource, PlayerId, PlayerSignal, SignalSender},
    error::{PlayerError, PlayerResult},
};

type CallLock = Arc<tokio::sync::Mutex<Call>>;
type PlayerTable = Arc<DashMap<PlayerId, Weak<SongbirdPlayer>>>;

/// Transporte de voz sobre songbird + la caché de serenity
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    players: PlayerTable,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, cache: Arc<Cache>) -> Self {
        Self {
            manager,
            cache,
            players: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    fn is_joinable(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let bot_id = self.cache.current_user().id;
        let Some(guild) = self.cache.guild(guild_id) else {
            debug!("Guild {} no está en caché", guild_id);
            return false;
        };
        let Some(channel) = guild.channels.get(&channel_id) else {
            return false;
        };
        if !matches!(channel.kind, ChannelType::Voice | ChannelType::Stage) {
            return false;
        }
        let Some(member) = guild.members.get(&bot_id) else {
            return false;
        };

        let permissions = guild.user_permissions_in(channel, member);
        permissions.view_channel() && permissions.connect() && permissions.speak()
    }

    async fn join_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlayerResult<Arc<dyn VoiceConnection>> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::Transport(format!("Error al conectar al canal de voz: {e}")))?;

        let (state, _) = watch::channel(ConnectionState::Ready);
        let state = Arc::new(state);
        {
            let mut handler = call.lock().await;
            // The Call outlives a leave/join cycle; drop handlers of the previous connection
            handler.remove_all_global_events();
            for event in [
                CoreEvent::DriverConnect,
                CoreEvent::DriverReconnect,
                CoreEvent::DriverDisconnect,
            ] {
                handler.add_global_event(
                    Event::Core(event),
                    ConnectionStateHandler {
                        guild_id,
                        state: state.clone(),
                    },
                );
            }
        }

        Ok(Arc::new(SongbirdConnection {
            guild_id,
            channel_id,
            call,
            manager: self.manager.clone(),
            state,
            players: self.players.clone(),
        }))
    }

    fn create_player(&self, guild_id: GuildId, signals: SignalSender) -> Arc<dyn AudioPlayer> {
        let player = Arc::new(SongbirdPlayer::new(guild_id, signals));
        self.players.retain(|_, p| p.strong_count() > 0);
        self.players.insert(player.id(), Arc::downgrade(&player));
        player
    }
}

/// Traduce los eventos del driver a [`ConnectionState`]
struct ConnectionStateHandler {
    guild_id: GuildId,
    state: Arc<watch::Sender<ConnectionState>>,
}

#[async_trait]
impl VoiceEventHandler for ConnectionStateHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::DriverConnect(_) => {
                self.state.send_replace(ConnectionState::Ready);
            }
            EventContext::DriverReconnect(_) => {
                info!("🔄 Reconectando al canal de voz en guild {}", self.guild_id);
                self.state.send_replace(ConnectionState::Connecting);
                self.state.send_replace(ConnectionState::Ready);
            }
            EventContext::DriverDisconnect(data) => {
                warn!(
                    "🔌 Driver desconectado en guild {}: {:?}",
                    self.guild_id, data.reason
                );
                self.state.send_replace(ConnectionState::Disconnected);
            }
            _ => {}
        }
        None
    }
}

pub struct SongbirdConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    call: CallLock,
    manager: Arc<Songbird>,
    state: Arc<watch::Sender<ConnectionState>>,
    players: PlayerTable,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
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

    async fn subscribe(&self, player: &dyn AudioPlayer) -> bool {
        let Some(player) = self
            .players
            .get(&player.id())
            .and_then(|entry| entry.value().upgrade())
        else {
            warn!("Reproductor {} no pertenece a este transporte", player.id());
            return false;
        };
        player.attach(self.call.clone()).await
    }

    async fn destroy(&self) {
        for entry in self.players.iter() {
            if let Some(player) = entry.value().upgrade() {
                player.detach(&self.call);
            }
        }
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("remove en guild {}: {}", self.guild_id, e);
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

#[derive(Default)]
struct PlayerInner {
    call: Option<CallLock>,
    pending: Option<(AudioResource, u64)>,
    handle: Option<TrackHandle>,
    paused: bool,
}

/// Reproductor de una sesión sobre un `Call` de songbird.
///
/// A resource played before any call is attached waits until
/// [`VoiceConnection::subscribe`] attaches one.
pub struct SongbirdPlayer {
    id: PlayerId,
    guild_id: GuildId,
    signals: SignalSender,
    generation: Arc<AtomicU64>,
    inner: Mutex<PlayerInner>,
}

impl SongbirdPlayer {
    fn new(guild_id: GuildId, signals: SignalSender) -> Self {
        Self {
            id: PlayerId::next(),
            guild_id,
            signals,
            generation: Arc::new(AtomicU64::new(0)),
            inner: Mutex::new(PlayerInner::default()),
        }
    }

    async fn attach(&self, call: CallLock) -> bool {
        let pending = {
            let mut inner = self.inner.lock();
            inner.call = Some(call.clone());
            inner.pending.take()
        };
        match pending {
            Some((resource, generation)) => self.start(call, resource, generation).await,
            None => true,
        }
    }

    fn detach(&self, call: &CallLock) {
        let mut inner = self.inner.lock();
        if inner.call.as_ref().is_some_and(|c| Arc::ptr_eq(c, call)) {
            inner.call = None;
        }
    }

    async fn start(&self, call: CallLock, resource: AudioResource, generation: u64) -> bool {
        let AudioResource {
            track,
            stream,
            volume,
            start_offset,
        } = resource;

        let handle = call
            .lock()
            .await
            .play(SongbirdTrack::new(stream.into_input()).volume(volume));
        if !start_offset.is_zero() {
            let seeking = handle.clone();
            let guild_id = self.guild_id;
            tokio::spawn(async move {
                if let Err(e) = seeking.seek_async(start_offset).await {
                    warn!("⏩ Seek a {:?} falló en guild {}: {}", start_offset, guild_id, e);
                }
            });
        }

        for (event, errored) in [(TrackEvent::End, false), (TrackEvent::Error, true)] {
            let notifier = TrackEndNotifier {
                guild_id: self.guild_id,
                generation: self.generation.clone(),
                expected: generation,
                signals: self.signals.clone(),
                errored,
            };
            if let Err(e) = handle.add_event(Event::Track(event), notifier) {
                warn!("No se pudo registrar evento de track: {:?}", e);
                return false;
            }
        }

        let mut inner = self.inner.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            // Superseded while the call lock was awaited
            let _ = handle.stop();
            return false;
        }
        inner.handle = Some(handle);
        debug!("▶️ '{}' en {} ({})", track.title(), self.id, self.guild_id);
        true
    }
}

#[async_trait]
impl AudioPlayer for SongbirdPlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    async fn play(&self, resource: AudioResource) -> PlayerResult<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (previous, call) = {
            let mut inner = self.inner.lock();
            inner.paused = false;
            inner.pending = None;
            (inner.handle.take(), inner.call.clone())
        };
        if let Some(previous) = previous {
            let _ = previous.stop();
        }

        match call {
            Some(call) => {
                if !self.start(call, resource, generation).await {
                    debug!("Recurso de {} no iniciado", self.id);
                }
            }
            None => self.inner.lock().pending = Some((resource, generation)),
        }
        Ok(())
    }

    fn pause(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.paused {
            return false;
        }
        let paused = inner.handle.as_ref().is_some_and(|h| h.pause().is_ok());
        inner.paused = paused;
        paused
    }

    fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.paused {
            return false;
        }
        let resumed = inner.handle.as_ref().is_some_and(|h| h.play().is_ok());
        if resumed {
            inner.paused = false;
        }
        resumed
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock();
        inner.pending = None;
        inner.paused = false;
        if let Some(handle) = inner.handle.take() {
            let _ = handle.stop();
        }
    }

    fn set_volume(&self, volume: f32) -> bool {
        self.inner
            .lock()
            .handle
            .as_ref()
            .is_some_and(|h| h.set_volume(volume).is_ok())
    }

    fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    async fn position(&self) -> Option<Duration> {
        let handle = self.inner.lock().handle.clone()?;
        match handle.get_info().await {
            Ok(state) => Some(state.position),
            Err(e) => {
                debug!("Sin posición para {}: {}", self.id, e);
                None
            }
        }
    }
}

/// Avisa a la sesión cuando termina el recurso de su generación.
///
/// songbird also fires `End` for tracks halted by `stop`; those carry an
/// older generation and are dropped here.
#[derive(Clone)]
struct TrackEndNotifier {
    guild_id: GuildId,
    generation: Arc<AtomicU64>,
    expected: u64,
    signals: SignalSender,
    errored: bool,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let signal = if self.errored {
            let reason = match ctx {
                EventContext::Track(tracks) => tracks
                    .first()
                    .map(|(state, _)| format!("{:?}", state.playing))
                    .unwrap_or_default(),
                _ => String::new(),
            };
            PlayerSignal::TrackErrored(reason)
        } else {
            PlayerSignal::TrackEnded
        };

        // Consume the generation so End and Error never both reach the session
        let current = self.generation.compare_exchange(
            self.expected,
            self.expected + 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if current.is_ok() {
            let _ = self.signals.send(signal);
        } else {
            debug!("Evento de track obsoleto ignorado en guild {}", self.guild_id);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::track::Track, sources::AudioStream};
    use pretty_assertions::assert_eq;
    use songbird::input::{HttpRequest, Input};
    use tokio::sync::mpsc;

    fn notifier(generation: &Arc<AtomicU64>, expected: u64, signals: &SignalSender, errored: bool) -> TrackEndNotifier {
        TrackEndNotifier {
            guild_id: GuildId::new(1),
            generation: generation.clone(),
            expected,
            signals: signals.clone(),
            errored,
        }
    }

    fn resource() -> AudioResource {
        let url = "https://example.com/a.mp3";
        let input = Input::from(HttpRequest::new(reqwest::Client::new(), url.to_string()));
        AudioResource::new(
            Track::new(url, "A", Duration::from_secs(60)),
            AudioStream::new(url, input),
            0.5,
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_notifier_signals_once_per_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(3));

        notifier(&generation, 3, &tx, false)
            .act(&EventContext::Track(&[]))
            .await;
        notifier(&generation, 3, &tx, true)
            .act(&EventContext::Track(&[]))
            .await;

        assert_eq!(rx.try_recv().ok(), Some(PlayerSignal::TrackEnded));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notifier_drops_superseded_resource() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(5));

        notifier(&generation, 4, &tx, false)
            .act(&EventContext::Track(&[]))
            .await;

        assert!(rx.try_recv().is_err());
        assert_eq!(generation.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_player_without_call_keeps_resource_pending() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let player = SongbirdPlayer::new(GuildId::new(1), tx);

        player.play(resource()).await.unwrap();

        assert!(player.inner.lock().pending.is_some());
        assert!(!player.pause());
        assert!(!player.set_volume(0.3));

        assert_eq!(player.position().await, None);

        player.stop();
        assert!(player.inner.lock().pending.is_none());
        assert!(!player.is_paused());
    }
}
