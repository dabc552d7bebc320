use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};

use super::{ConnectionState, VoiceConnection, VoiceTransport};
use crate::error::{PlayerError, PlayerResult};

struct Supervised {
    generation: u64,
    connection: Arc<dyn VoiceConnection>,
    watcher: JoinHandle<()>,
}

type Slot = Mutex<Option<Supervised>>;

/// Owns the voice connection of one session.
///
/// After an unexpected `Disconnected`, the connection gets one window to
/// re-enter `Signalling` or `Connecting` (or to be seen `Ready` again when
/// those transitions were coalesced). If none happens in time it is
/// destroyed and [`ConnectionSupervisor::connection`] returns `None` until
/// the next [`ConnectionSupervisor::connect`].
pub struct ConnectionSupervisor {
    guild_id: GuildId,
    transport: Arc<dyn VoiceTransport>,
    reconnect_window: Duration,
    slot: Arc<Slot>,
    next_generation: AtomicU64,
}

impl ConnectionSupervisor {
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        reconnect_window: Duration,
    ) -> Self {
        Self {
            guild_id,
            transport,
            reconnect_window,
            slot: Arc::new(Mutex::new(None)),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Se une al canal y empieza a vigilar la conexión
    pub async fn connect(&self, channel_id: ChannelId) -> PlayerResult<Arc<dyn VoiceConnection>> {
        if !self.transport.is_joinable(self.guild_id, channel_id) {
            warn!(
                "🚫 Canal {} no disponible para unirse en guild {}",
                channel_id, self.guild_id
            );
            return Err(PlayerError::NotJoinable);
        }

        let connection = self
            .transport
            .join_channel(self.guild_id, channel_id)
            .await?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let watcher = tokio::spawn(supervise(
            self.guild_id,
            generation,
            connection.clone(),
            self.reconnect_window,
            Arc::downgrade(&self.slot),
        ));

        let previous = self.slot.lock().replace(Supervised {
            generation,
            connection: connection.clone(),
            watcher,
        });
        if let Some(previous) = previous {
            previous.watcher.abort();
        }

        info!(
            "🔊 Conectado al canal de voz {} en guild {}",
            channel_id, self.guild_id
        );
        Ok(connection)
    }

    /// The live connection, if any. A connection that outlived its
    /// reconnect window is already gone from here.
    pub fn connection(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.slot.lock().as_ref().map(|s| s.connection.clone())
    }

    pub fn state(&self) -> Option<ConnectionState> {
        self.slot.lock().as_ref().map(|s| s.connection.state())
    }

    /// Destruye la conexión de inmediato
    pub async fn destroy(&self) {
        let supervised = self.slot.lock().take();
        if let Some(supervised) = supervised {
            supervised.watcher.abort();
            supervised.connection.destroy().await;
            info!("👋 Conexión de voz destruida en guild {}", self.guild_id);
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(supervised) = self.slot.lock().take() {
            supervised.watcher.abort();
        }
    }
}

/// Watches one connection until it is destroyed or its state channel closes.
async fn supervise(
    guild_id: GuildId,
    generation: u64,
    connection: Arc<dyn VoiceConnection>,
    window: Duration,
    slot: Weak<Slot>,
) {
    let mut rx = connection.watch_state();
    let mut state = *rx.borrow_and_update();

    loop {
        match state {
            ConnectionState::Ready => debug!("✅ Conexión lista en guild {}", guild_id),
            ConnectionState::Signalling | ConnectionState::Connecting => {
                debug!("🔄 Conexión en estado {} en guild {}", state, guild_id)
            }
            ConnectionState::Disconnected => {
                warn!(
                    "🔌 Desconectado en guild {}, esperando reconexión ({:?})",
                    guild_id, window
                );
                let outcome = timeout(
                    window,
                    // `watch` keeps only the latest value: a Connecting followed
                    // at once by Ready is seen as Ready
                    rx.wait_for(|s| *s != ConnectionState::Disconnected),
                )
                .await
                .map(|recv| recv.map(|_| ()));

                match outcome {
                    Ok(Ok(())) => info!("🔄 Reconectando al canal de voz en guild {}", guild_id),
                    Ok(Err(_)) => {
                        debug!("Canal de estado cerrado en guild {}", guild_id);
                        return;
                    }
                    Err(_) => {
                        warn!("❌ Desconectado por completo en guild {}", guild_id);
                        if let Some(slot) = slot.upgrade() {
                            let mut guard = slot.lock();
                            if guard.as_ref().is_some_and(|s| s.generation == generation) {
                                guard.take();
                            }
                        }
                        connection.destroy().await;
                        return;
                    }
                }
            }
        }

        if rx.changed().await.is_err() {
            return;
        }
        state = *rx.borrow_and_update();
    }
}
