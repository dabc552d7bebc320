use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    events::{EventBus, QueueEndReason, SessionEvent},
    player::{AudioPlayer, AudioResource, PlayerSignal, SignalReceiver},
    queue::TrackQueue,
    track::{Requestor, Track},
};
use crate::{
    error::{PlayerError, PlayerResult},
    sources::{AudioSourceProvider, StreamOptions, TrackResolver},
    voice::{ConnectionState, ConnectionSupervisor, VoiceTransport},
};

/// Ajustes compartidos por todas las sesiones
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Volume a new session starts with (0.0 - 1.0)
    pub default_volume: f32,
    /// How long a dropped connection may take to start reconnecting
    pub reconnect_window: Duration,
    pub stream_options: StreamOptions,
    /// Emit `QueueEnd` when the last track finishes on its own
    pub queue_end_on_drain: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            reconnect_window: Duration::from_millis(5000),
            stream_options: StreamOptions::default(),
            queue_end_on_drain: true,
        }
    }
}

/// Collaborators injected into every session.
#[derive(Clone)]
pub struct SessionServices {
    pub resolver: Arc<dyn TrackResolver>,
    pub sources: Arc<dyn AudioSourceProvider>,
    pub transport: Arc<dyn VoiceTransport>,
    pub events: EventBus,
    pub settings: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub guild_id: GuildId,
    pub voice_channel: Option<ChannelId>,
    pub text_channel: Option<ChannelId>,
}

impl SessionOptions {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            voice_channel: None,
            text_channel: None,
        }
    }

    pub fn voice_channel(mut self, channel_id: ChannelId) -> Self {
        self.voice_channel = Some(channel_id);
        self
    }

    pub fn text_channel(mut self, channel_id: ChannelId) -> Self {
        self.text_channel = Some(channel_id);
        self
    }
}

/// Estado derivado de la sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Playing,
    Paused,
    Stopped,
}

struct SessionData {
    queue: TrackQueue,
    volume: f32,
    voice_channel: Option<ChannelId>,
    joining: bool,
    stopped: bool,
    audible: bool,
    /// The head could not start for lack of a connection and waits for
    /// the next join
    head_waiting: bool,
}

/// Playback orchestrator for one guild.
///
/// Every mutating operation, and the handling of the player's "track ended"
/// signal, runs under a per-session operation lock, so queue-length checks
/// never interleave. The queue head is always the track that is playing
/// (or paused), or the one waiting for a connection to start.
pub struct PlaybackSession {
    me: Weak<PlaybackSession>,
    guild_id: GuildId,
    text_channel: Option<ChannelId>,
    data: Mutex<SessionData>,
    op_lock: tokio::sync::Mutex<()>,
    player: Arc<dyn AudioPlayer>,
    supervisor: ConnectionSupervisor,
    resolver: Arc<dyn TrackResolver>,
    sources: Arc<dyn AudioSourceProvider>,
    events: EventBus,
    settings: SessionSettings,
}

impl PlaybackSession {
    /// Crea la sesión y su reproductor. Debe llamarse dentro de un runtime de tokio.
    pub fn new(options: SessionOptions, services: SessionServices) -> Arc<Self> {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let player = services
            .transport
            .create_player(options.guild_id, signals);
        let supervisor = ConnectionSupervisor::new(
            options.guild_id,
            services.transport.clone(),
            services.settings.reconnect_window,
        );

        let session = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            guild_id: options.guild_id,
            text_channel: options.text_channel,
            data: Mutex::new(SessionData {
                queue: TrackQueue::new(),
                volume: services.settings.default_volume,
                voice_channel: options.voice_channel,
                joining: false,
                stopped: false,
                audible: false,
                head_waiting: false,
            }),
            op_lock: tokio::sync::Mutex::new(()),
            player,
            supervisor,
            resolver: services.resolver,
            sources: services.sources,
            events: services.events,
            settings: services.settings,
        });

        tokio::spawn(listen_player_signals(Arc::downgrade(&session), signal_rx));
        debug!("🎛️ Sesión creada para guild {}", options.guild_id);
        session
    }

    // Getters

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn text_channel(&self) -> Option<ChannelId> {
        self.text_channel
    }

    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.data.lock().voice_channel
    }

    /// Cambia el canal de voz objetivo para el próximo `join`
    pub fn set_voice_channel(&self, channel_id: ChannelId) {
        self.data.lock().voice_channel = Some(channel_id);
    }

    /// Whether the queue holds anything (the head is playing or paused).
    pub fn is_playing(&self) -> bool {
        !self.data.lock().queue.is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.player.is_paused()
    }

    pub fn volume(&self) -> f32 {
        self.data.lock().volume
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.data.lock().queue.peek().cloned()
    }

    /// Playhead of the head track, if the player has it loaded.
    pub async fn position(&self) -> Option<Duration> {
        if !self.is_playing() || self.data.lock().head_waiting {
            return None;
        }
        self.player.position().await
    }

    pub fn queue(&self) -> Vec<Track> {
        self.data.lock().queue.iter().cloned().collect()
    }

    pub fn queue_len(&self) -> usize {
        self.data.lock().queue.len()
    }

    pub fn queue_duration(&self) -> Duration {
        self.data.lock().queue.total_duration()
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.connection().is_some()
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.supervisor.state()
    }

    /// `false` when the last started track could not be routed into the
    /// voice connection: the session believes it plays but nothing is heard.
    pub fn is_audible(&self) -> bool {
        self.data.lock().audible
    }

    pub fn state(&self) -> SessionState {
        let data = self.data.lock();
        if data.joining {
            SessionState::Connecting
        } else if !data.queue.is_empty() {
            if self.player.is_paused() {
                SessionState::Paused
            } else {
                SessionState::Playing
            }
        } else if data.stopped {
            SessionState::Stopped
        } else {
            SessionState::Idle
        }
    }

    // Operaciones

    /// Busca `query`, encola el mejor resultado y lo reproduce si la cola
    /// estaba vacía. Devuelve la pista encolada.
    pub async fn play(&self, query: &str, requestor: Option<Requestor>) -> PlayerResult<Track> {
        let _op = self.op_lock.lock().await;

        let candidates = self.resolver.search(query).await?;
        let track = candidates
            .into_iter()
            .next()
            .ok_or(PlayerError::NoResultsFound)?
            .with_requestor(requestor);

        let (starts_now, head_waiting) = {
            let mut data = self.data.lock();
            data.queue.enqueue(track.clone());
            data.stopped = false;
            (data.queue.len() == 1, data.head_waiting)
        };

        if starts_now {
            if let Err(e) = self.start_head(&track).await {
                warn!("❌ No se pudo iniciar '{}': {}", track.title(), e);
                self.data.lock().queue.pop_back();
                return Err(e);
            }
        } else if head_waiting {
            if let Err(e) = self.join_locked().await {
                warn!("❌ No se pudo reconectar en guild {}: {}", self.guild_id, e);
                self.data.lock().queue.pop_back();
                return Err(e);
            }
            self.start_waiting_head().await?;
        } else {
            info!(
                "📋 '{}' en cola (posición {}) en guild {}",
                track.title(),
                self.queue_len(),
                self.guild_id
            );
        }

        Ok(track)
    }

    /// Se une al canal de voz de la sesión
    ///
    /// A head left waiting by a lost connection starts once joined.
    pub async fn join(&self) -> PlayerResult<()> {
        let _op = self.op_lock.lock().await;
        self.join_locked().await?;
        self.start_waiting_head().await
    }

    /// Stops whatever plays, releases the player and drops the connection.
    pub async fn leave(&self) {
        let _op = self.op_lock.lock().await;

        if self.is_playing() {
            if let Err(e) = self.stop_locked() {
                debug!("stop al salir: {}", e);
            }
        }
        self.player.stop();
        self.supervisor.destroy().await;
        info!("👋 Sesión de guild {} salió del canal de voz", self.guild_id);
    }

    /// Starts `track` on the player from `seek_offset` without touching the
    /// queue. Only a start from zero is announced with `TrackStart`.
    pub async fn play_track(&self, track: &Track, seek_offset: Duration) -> PlayerResult<()> {
        let _op = self.op_lock.lock().await;
        self.play_track_locked(track, seek_offset, seek_offset.is_zero())
            .await
    }

    /// Ajusta el volumen del recurso activo
    pub async fn set_volume(&self, amount: f32) -> PlayerResult<()> {
        let _op = self.op_lock.lock().await;
        {
            let mut data = self.data.lock();
            if data.queue.is_empty() {
                return Err(PlayerError::NotPlaying);
            }
            data.volume = amount;
        }

        if !self.player.set_volume(amount) {
            debug!("Sin recurso activo; el volumen se aplicará a la próxima pista");
        }
        info!("🔊 Volumen ajustado a {}%", (amount * 100.0).round() as u32);
        Ok(())
    }

    /// Restarts the head from `position`. The stream is reopened from the
    /// source and the offset is a start hint; fidelity depends on the audio
    /// source.
    pub async fn seek(&self, position: Duration) -> PlayerResult<()> {
        let _op = self.op_lock.lock().await;
        let head = self
            .data
            .lock()
            .queue
            .peek()
            .cloned()
            .ok_or(PlayerError::NotPlaying)?;

        if position >= head.duration() {
            return Err(PlayerError::PositionOutOfRange);
        }

        self.play_track_locked(&head, position, false).await
    }

    /// Detiene la reproducción y vacía la cola
    pub async fn stop(&self) -> PlayerResult<()> {
        let _op = self.op_lock.lock().await;
        self.stop_locked()
    }

    /// State-tolerant: pausing with nothing loaded is a no-op. Returns
    /// whether the player changed state.
    pub async fn pause(&self) -> bool {
        let _op = self.op_lock.lock().await;
        let changed = self.player.pause();
        if changed {
            info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        } else {
            debug!("pause sin efecto en guild {}", self.guild_id);
        }
        changed
    }

    pub async fn resume(&self) -> bool {
        let _op = self.op_lock.lock().await;
        let changed = self.player.resume();
        if changed {
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        } else {
            debug!("resume sin efecto en guild {}", self.guild_id);
        }
        changed
    }

    /// Salta `count` pistas y reproduce la nueva cabeza.
    ///
    /// Returns the track now playing, or `None` when the skip consumed the
    /// whole queue (which then ends with `QueueEnd { reason: Skipped }`).
    pub async fn skip(&self, count: usize) -> PlayerResult<Option<Track>> {
        let _op = self.op_lock.lock().await;

        let next = {
            let mut data = self.data.lock();
            let len = data.queue.len();
            if len == 0 {
                return Err(PlayerError::NotPlaying);
            }
            if len == 1 {
                return Err(PlayerError::CannotSkipLastTrack);
            }
            if count == 0 {
                return Err(PlayerError::InvalidSkipCount);
            }
            if count > len {
                return Err(PlayerError::InsufficientQueueItems);
            }
            // Nothing is dequeued unless a new head can be started
            if count < len && self.supervisor.connection().is_none() {
                return Err(PlayerError::NoConnection);
            }
            for _ in 0..count {
                data.queue.dequeue();
            }
            data.queue.peek().cloned()
        };

        info!("⏭️ {} pista(s) saltada(s) en guild {}", count, self.guild_id);
        self.advance(next, QueueEndReason::Skipped).await
    }

    /// Mezcla la cola. If the head changed while playing, the new head
    /// starts so the head keeps matching what is heard.
    pub async fn shuffle(&self) -> PlayerResult<Option<Track>> {
        let _op = self.op_lock.lock().await;

        let (before, after, head_waiting) = {
            let mut data = self.data.lock();
            if data.queue.len() > 1
                && !data.head_waiting
                && self.supervisor.connection().is_none()
            {
                return Err(PlayerError::NoConnection);
            }
            let before = data.queue.peek().cloned();
            data.queue.shuffle();
            (before, data.queue.peek().cloned(), data.head_waiting)
        };

        let head_changed = match (&before, &after) {
            (Some(before), Some(after)) => before.url() != after.url(),
            _ => false,
        };
        if head_changed && !head_waiting {
            return self.advance(after, QueueEndReason::Drained).await;
        }
        Ok(after)
    }

    // Internos (requieren el op_lock)

    async fn start_head(&self, track: &Track) -> PlayerResult<()> {
        if self.supervisor.connection().is_none() {
            self.join_locked().await?;
        }
        self.play_track_locked(track, Duration::ZERO, true).await
    }

    async fn join_locked(&self) -> PlayerResult<()> {
        if self.supervisor.connection().is_some() {
            debug!("Ya conectado en guild {}", self.guild_id);
            return Ok(());
        }

        let channel_id = {
            let mut data = self.data.lock();
            let channel_id = data.voice_channel.ok_or(PlayerError::NotJoinable)?;
            data.joining = true;
            channel_id
        };

        let result = self.supervisor.connect(channel_id).await;
        self.data.lock().joining = false;
        result.map(|_| ())
    }

    async fn play_track_locked(
        &self,
        track: &Track,
        seek_offset: Duration,
        announce: bool,
    ) -> PlayerResult<()> {
        let connection = self
            .supervisor
            .connection()
            .ok_or(PlayerError::NoConnection)?;

        let stream = self
            .sources
            .open(track.url(), self.settings.stream_options)
            .await?;
        let volume = self.data.lock().volume;

        self.player
            .play(AudioResource::new(track.clone(), stream, volume, seek_offset))
            .await?;

        let audible = connection.subscribe(self.player.as_ref()).await;
        if !audible {
            warn!(
                "⚠️ {} (guild {}); el audio puede no escucharse",
                PlayerError::SubscriptionFailed,
                self.guild_id
            );
        }
        self.data.lock().audible = audible;

        if announce {
            info!("🎵 Reproduciendo: {}", track.title());
            self.emit_track_start(track.clone());
        } else {
            info!("⏩ '{}' desde {:?}", track.title(), seek_offset);
        }
        Ok(())
    }

    fn stop_locked(&self) -> PlayerResult<()> {
        if self.data.lock().queue.is_empty() {
            return Err(PlayerError::NotPlaying);
        }

        self.player.stop();
        {
            let mut data = self.data.lock();
            data.queue.clear();
            data.stopped = true;
            data.head_waiting = false;
        }

        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        self.emit_queue_end(QueueEndReason::Stopped);
        Ok(())
    }

    /// Dequeues the finished head and starts the next track that opens.
    async fn on_track_end(&self) {
        let _op = self.op_lock.lock().await;

        let next = {
            let mut data = self.data.lock();
            if data.queue.dequeue().is_none() {
                return;
            }
            data.queue.peek().cloned()
        };

        if let Err(e) = self.advance(next, QueueEndReason::Drained).await {
            debug!("Avance de cola detenido en guild {}: {}", self.guild_id, e);
        }
    }

    async fn start_waiting_head(&self) -> PlayerResult<()> {
        let head = {
            let data = self.data.lock();
            if !data.head_waiting {
                return Ok(());
            }
            data.queue.peek().cloned()
        };
        if let Some(head) = &head {
            info!("▶️ Retomando '{}' en guild {}", head.title(), self.guild_id);
        }
        self.advance(head, QueueEndReason::Drained).await.map(|_| ())
    }

    /// Starts `next` as the new head. Heads that fail to open are dropped
    /// and the following one is tried.
    ///
    /// Returns the track that started, or `None` once the queue ran out
    /// (ending it with `reason`). Without a connection the head is kept and
    /// marked as waiting for the next join.
    async fn advance(
        &self,
        mut next: Option<Track>,
        reason: QueueEndReason,
    ) -> PlayerResult<Option<Track>> {
        while let Some(track) = next.take() {
            match self.play_track_locked(&track, Duration::ZERO, true).await {
                Ok(()) => {
                    self.data.lock().head_waiting = false;
                    return Ok(Some(track));
                }
                Err(PlayerError::NoConnection) => {
                    warn!(
                        "🔌 Sin conexión en guild {}; '{}' espera un nuevo join",
                        self.guild_id,
                        track.title()
                    );
                    self.player.stop();
                    self.data.lock().head_waiting = true;
                    return Err(PlayerError::NoConnection);
                }
                Err(e) => {
                    error!("Error al reproducir siguiente track '{}': {}", track.title(), e);
                    let mut data = self.data.lock();
                    data.queue.dequeue();
                    next = data.queue.peek().cloned();
                }
            }
        }

        self.player.stop();
        self.data.lock().head_waiting = false;
        match reason {
            QueueEndReason::Drained if !self.settings.queue_end_on_drain => {
                debug!("📭 Cola vacía en guild {}", self.guild_id);
            }
            QueueEndReason::Drained => {
                info!("📭 Cola terminada en guild {}", self.guild_id);
                self.emit_queue_end(reason);
            }
            QueueEndReason::Skipped | QueueEndReason::Stopped => {
                self.data.lock().stopped = true;
                self.emit_queue_end(reason);
            }
        }
        Ok(None)
    }

    fn emit_track_start(&self, track: Track) {
        if let Some(session) = self.me.upgrade() {
            self.events.emit(SessionEvent::TrackStart { session, track });
        }
    }

    fn emit_queue_end(&self, reason: QueueEndReason) {
        if let Some(session) = self.me.upgrade() {
            self.events.emit(SessionEvent::QueueEnd { session, reason });
        }
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("guild_id", &self.guild_id)
            .field("player", &self.player.id())
            .finish_non_exhaustive()
    }
}

async fn listen_player_signals(session: Weak<PlaybackSession>, mut signals: SignalReceiver) {
    while let Some(signal) = signals.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        match signal {
            PlayerSignal::TrackEnded => {
                debug!("Track terminado en guild {}", session.guild_id());
            }
            PlayerSignal::TrackErrored(reason) => {
                error!(
                    "❌ Error en track para guild {}: {}",
                    session.guild_id(),
                    reason
                );
            }
        }
        session.on_track_end().await;
    }
}
