//! Backend-facing audio player contract.
//!
//! A session owns exactly one [`AudioPlayer`], created by the voice
//! transport. The player holds at most one active [`AudioResource`] and
//! reports natural completion through [`PlayerSignal`]s.

use async_trait::async_trait;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::sync::mpsc;

use super::track::Track;
use crate::{error::PlayerResult, sources::AudioStream};

static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(u64);

impl PlayerId {
    pub fn next() -> Self {
        Self(NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Señales que el backend envía a la sesión
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerSignal {
    /// The active resource reached its end on its own
    TrackEnded,
    /// The active resource died mid-stream
    TrackErrored(String),
}

pub type SignalSender = mpsc::UnboundedSender<PlayerSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<PlayerSignal>;

/// An opened stream wrapped for playback at a given gain and start offset.
pub struct AudioResource {
    pub track: Track,
    pub stream: AudioStream,
    pub volume: f32,
    /// Playback-start hint; the stream itself always opens at zero
    pub start_offset: Duration,
}

impl AudioResource {
    pub fn new(track: Track, stream: AudioStream, volume: f32, start_offset: Duration) -> Self {
        Self {
            track,
            stream,
            volume,
            start_offset,
        }
    }
}

impl fmt::Debug for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioResource")
            .field("track", &self.track.title())
            .field("url", &self.stream.url())
            .field("volume", &self.volume)
            .field("start_offset", &self.start_offset)
            .finish()
    }
}

/// Reproductor de audio de una sesión.
///
/// Implementations must not deliver [`PlayerSignal`]s for a resource that
/// was replaced by a later `play` or halted by `stop`.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    fn id(&self) -> PlayerId;

    /// Replaces the active resource and starts it.
    async fn play(&self, resource: AudioResource) -> PlayerResult<()>;

    /// Returns whether the player actually changed state.
    fn pause(&self) -> bool;

    fn resume(&self) -> bool;

    /// Halts and releases the active resource.
    fn stop(&self);

    /// Sets the active resource's gain; `false` when nothing is loaded.
    fn set_volume(&self, volume: f32) -> bool;

    fn is_paused(&self) -> bool;

    /// Playhead of the active resource, start offset included. `None` when
    /// nothing is loaded.
    async fn position(&self) -> Option<Duration>;
}
