//! # Audio Module
//!
//! Per-guild playback sessions for Open Music.
//!
//! ## Architecture
//!
//! ### [`session`] - Playback Session
//! - One [`PlaybackSession`] per guild, owning its queue, player and
//!   supervised voice connection
//! - Every mutating operation is serialized through an operation lock
//! - The queue head is always the track that is playing or paused
//!
//! ### [`queue`] - Queue Management
//! - FIFO [`TrackQueue`] with shuffle
//!
//! ### [`events`] - Lifecycle Events
//! - [`EventBus`] delivering `TrackStart` / `QueueEnd` to listeners in
//!   registration order
//!
//! ### [`registry`] - Session Registry
//! - Guild to session map; sessions are evicted when their queue ends
//!
//! ### [`player`] - Player Contract
//! - The backend-facing [`AudioPlayer`] trait and its completion signals
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_music_sessions::audio::{SessionOptions, SessionRegistry};
//! # use open_music_sessions::audio::SessionServices;
//! use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(services: SessionServices) -> anyhow::Result<()> {
//! let registry = SessionRegistry::new(services);
//! let session = registry.get_or_create(
//!     SessionOptions::new(GuildId::new(1)).voice_channel(ChannelId::new(2)),
//! );
//!
//! session.play("lofi beats", None).await?;
//! session.pause().await;
//! session.resume().await;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod track;

pub use events::{EventBus, QueueEndReason, SessionEvent};
pub use player::{AudioPlayer, AudioResource, PlayerId, PlayerSignal};
pub use queue::TrackQueue;
pub use registry::SessionRegistry;
pub use session::{PlaybackSession, SessionOptions, SessionServices, SessionSettings, SessionState};
pub use track::{Requestor, Track};
