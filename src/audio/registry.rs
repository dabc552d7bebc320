use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::info;

use super::{
    events::{EventBus, SessionEvent},
    session::{PlaybackSession, SessionOptions, SessionServices},
};

/// Sesiones activas, una por guild.
///
/// A session is removed as soon as it emits `QueueEnd`, so the next command
/// for that guild starts from a fresh session.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<GuildId, Arc<PlaybackSession>>>,
    services: SessionServices,
}

impl SessionRegistry {
    pub fn new(services: SessionServices) -> Self {
        let sessions: Arc<DashMap<GuildId, Arc<PlaybackSession>>> = Arc::new(DashMap::new());

        let weak = Arc::downgrade(&sessions);
        services.events.on(move |event| {
            let SessionEvent::QueueEnd { session, reason } = event else {
                return;
            };
            let Some(sessions) = weak.upgrade() else {
                return;
            };
            // Only the registered instance; a replaced session must not evict its successor
            let removed = sessions
                .remove_if(&session.guild_id(), |_, current| Arc::ptr_eq(current, session))
                .is_some();
            if removed {
                info!(
                    "🧹 Sesión de guild {} retirada ({:?})",
                    session.guild_id(),
                    reason
                );
            }
        });

        Self { sessions, services }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession>> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Devuelve la sesión del guild, creándola con `options` si no existe.
    /// The voice channel is refreshed on an existing session when given.
    pub fn get_or_create(&self, options: SessionOptions) -> Arc<PlaybackSession> {
        if let Some(session) = self.get(options.guild_id) {
            if let Some(channel_id) = options.voice_channel {
                session.set_voice_channel(channel_id);
            }
            return session;
        }

        self.sessions
            .entry(options.guild_id)
            .or_insert_with(|| {
                info!("🎛️ Nueva sesión para guild {}", options.guild_id);
                PlaybackSession::new(options.clone(), self.services.clone())
            })
            .value()
            .clone()
    }

    /// Quita la sesión sin detenerla; el llamador decide qué hacer con ella
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession>> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn events(&self) -> &EventBus {
        &self.services.events
    }

    /// Leaves every voice channel. Used on shutdown.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<PlaybackSession>> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        for session in sessions {
            session.leave().await;
        }
        self.sessions.clear();
    }
}
