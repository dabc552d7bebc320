//! # Sources
//!
//! Boundaries to the two collaborators that sit in front of playback:
//!
//! - [`TrackResolver`]: turns a text query into ranked candidate tracks.
//! - [`AudioSourceProvider`]: opens a streamable audio payload for a URL.
//!
//! [`youtube`] holds the yt-dlp backed implementations of both.

pub mod youtube;

use async_trait::async_trait;
use songbird::input::Input;
use std::fmt;

use crate::{audio::track::Track, error::PlayerResult};

pub use youtube::{YtDlpResolver, YtDlpSource};

/// Resuelve una búsqueda de texto a pistas candidatas
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Candidates in ranked order. An empty list is a valid answer.
    async fn search(&self, query: &str) -> PlayerResult<Vec<Track>>;
}

/// Opciones para abrir un stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub audio_only: bool,
    /// Bytes the provider may read ahead before playback starts
    pub buffer_hint: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            audio_only: true,
            buffer_hint: 1 << 25,
        }
    }
}

/// Abre el audio de una pista
#[async_trait]
pub trait AudioSourceProvider: Send + Sync {
    async fn open(&self, url: &str, options: StreamOptions) -> PlayerResult<AudioStream>;
}

/// A streamable payload ready to be wrapped into an audio resource.
pub struct AudioStream {
    url: String,
    input: Input,
}

impl AudioStream {
    pub fn new(url: impl Into<String>, input: Input) -> Self {
        Self {
            url: url.into(),
            input,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn into_input(self) -> Input {
        self.input
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream").field("url", &self.url).finish()
    }
}
