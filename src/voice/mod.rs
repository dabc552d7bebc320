//! # Voice
//!
//! Boundary to the voice-gateway transport and the supervision of one
//! connection per session.
//!
//! - [`VoiceTransport`] joins channels and creates audio players.
//! - [`VoiceConnection`] publishes [`ConnectionState`] changes over a
//!   `watch` channel, attaches a player and can be destroyed.
//! - [`supervisor::ConnectionSupervisor`] owns the live connection and its
//!   bounded reconnect window.
//! - [`songbird`](mod@self::songbird) adapts all of the above to songbird.

pub mod songbird;
pub mod supervisor;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc};
use tokio::sync::watch;

use crate::{
    audio::player::{AudioPlayer, SignalSender},
    error::PlayerResult,
};

pub use supervisor::ConnectionSupervisor;

/// Estado de la conexión de voz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Signalling,
    Connecting,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Signalling => "signalling",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn guild_id(&self) -> GuildId;

    fn channel_id(&self) -> ChannelId;

    fn state(&self) -> ConnectionState;

    /// Receiver of every state transition, starting at the current state.
    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    /// Routes the player's audio into this connection. `false` when the
    /// player could not be attached.
    async fn subscribe(&self, player: &dyn AudioPlayer) -> bool;

    /// Tears the connection down immediately.
    async fn destroy(&self);
}

/// Transporte de voz (gateway de Discord)
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Whether the channel can be joined right now (exists, is a voice
    /// channel, and the bot may connect).
    fn is_joinable(&self, guild_id: GuildId, channel_id: ChannelId) -> bool;

    async fn join_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlayerResult<Arc<dyn VoiceConnection>>;

    /// Creates the audio player a session will own. Natural track ends are
    /// reported on `signals`.
    fn create_player(&self, guild_id: GuildId, signals: SignalSender) -> Arc<dyn AudioPlayer>;
}
