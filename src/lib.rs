//! # Open Music Sessions
//!
//! Per-guild Discord voice playback: a track queue, a playback state
//! machine, a supervised voice connection with a bounded reconnect window,
//! and lifecycle events.
//!
//! - [`audio`]: sessions, queue, events and the session registry
//! - [`voice`]: voice transport boundary, connection supervision and the
//!   songbird adapters
//! - [`sources`]: search and audio source boundaries (yt-dlp backed)
//! - [`bot`]: serenity event handler, text commands and notifications
//! - [`config`]: environment configuration

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod voice;

#[cfg(test)]
mod testing;
