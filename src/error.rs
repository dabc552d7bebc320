//! Error types for playback sessions.
//!
//! Every validation failure of a session operation is a synchronous
//! rejection carried by [`PlayerError`]. The command layer renders the
//! `Display` text to the user.

use thiserror::Error;

/// Errores de las operaciones de sesión
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// The target voice channel cannot be joined right now
    #[error("Channel is not joinable.")]
    NotJoinable,

    /// The resolver returned no candidates
    #[error("No results found.")]
    NoResultsFound,

    /// Playback attempted without a live voice connection
    #[error("No connection found.")]
    NoConnection,

    /// Volume/seek/stop invoked while the queue is empty
    #[error("Player is not playing anything.")]
    NotPlaying,

    #[error("Position is longer than track duration.")]
    PositionOutOfRange,

    #[error("Not enough items to skip.")]
    InsufficientQueueItems,

    #[error("Number to skip must be greater than 0.")]
    InvalidSkipCount,

    #[error("Cannot skip the only track; stop instead.")]
    CannotSkipLastTrack,

    /// The connection did not attach the player. Logged, never returned
    /// from a session operation.
    #[error("Failed to subscribe to the voice connection.")]
    SubscriptionFailed,

    /// Join failure reported by the voice transport itself
    #[error("Voice transport error: {0}")]
    Transport(String),

    /// The audio source could not be opened or the player refused it
    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Search failed: {0}")]
    Search(String),
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
