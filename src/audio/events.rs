//! Session lifecycle events.
//!
//! The [`EventBus`] is an explicit publish/subscribe handle given to every
//! session at construction. Listeners run synchronously, in registration
//! order, on the task that emits. There is no persistence or replay.

use parking_lot::RwLock;
use std::{fmt, sync::Arc};
use tokio::sync::mpsc;
use tracing::debug;

use super::{session::PlaybackSession, track::Track};

/// Why a session's queue ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEndReason {
    /// Explicit `stop`
    Stopped,
    /// The last track finished on its own
    Drained,
    /// `skip` consumed every remaining track
    Skipped,
}

#[derive(Clone)]
pub enum SessionEvent {
    /// A track started from its beginning (seeks are not announced)
    TrackStart {
        session: Arc<PlaybackSession>,
        track: Track,
    },
    QueueEnd {
        session: Arc<PlaybackSession>,
        reason: QueueEndReason,
    },
}

impl SessionEvent {
    pub fn session(&self) -> &Arc<PlaybackSession> {
        match self {
            SessionEvent::TrackStart { session, .. } | SessionEvent::QueueEnd { session, .. } => {
                session
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::TrackStart { .. } => "trackStart",
            SessionEvent::QueueEnd { .. } => "queueEnd",
        }
    }
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::TrackStart { session, track } => f
                .debug_struct("TrackStart")
                .field("guild_id", &session.guild_id())
                .field("track", &track.title())
                .finish(),
            SessionEvent::QueueEnd { session, reason } => f
                .debug_struct("QueueEnd")
                .field("guild_id", &session.guild_id())
                .field("reason", reason)
                .finish(),
        }
    }
}

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Publish/subscribe channel for [`SessionEvent`]s.
///
/// Cloning yields another handle to the same set of listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un listener; se invoca en orden de registro
    pub fn on<F>(&self, listener: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Forwards every event into an unbounded channel, for async consumers.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    pub fn emit(&self, event: SessionEvent) {
        // Snapshot so a listener may register another without deadlocking
        let listeners: Vec<Listener> = self.listeners.read().clone();
        debug!(
            "📣 Evento {} para guild {} ({} listeners)",
            event.kind(),
            event.session().guild_id(),
            listeners.len()
        );
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_listeners_run_in_registration_order() {
        let harness = Harness::new();
        let session = harness.session();
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.on(move |event| seen.lock().push(format!("{name}:{}", event.kind())));
        }

        bus.emit(SessionEvent::QueueEnd {
            session,
            reason: QueueEndReason::Stopped,
        });

        assert_eq!(
            *seen.lock(),
            vec!["first:queueEnd", "second:queueEnd", "third:queueEnd"]
        );
    }

    #[tokio::test]
    async fn test_separate_buses_do_not_cross_talk() {
        let harness = Harness::new();
        let session = harness.session();
        let a = EventBus::new();
        let b = EventBus::new();
        let mut rx_a = a.subscribe_channel();
        let mut rx_b = b.subscribe_channel();

        a.emit(SessionEvent::QueueEnd {
            session,
            reason: QueueEndReason::Drained,
        });

        assert!(matches!(
            rx_a.try_recv(),
            Ok(SessionEvent::QueueEnd {
                reason: QueueEndReason::Drained,
                ..
            })
        ));
        assert!(rx_b.try_recv().is_err());
    }
}
