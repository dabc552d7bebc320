use serenity::http::Http;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::commands::render_now_playing;
use crate::audio::events::{EventBus, QueueEndReason, SessionEvent};

/// Publica los eventos de sesión en el canal de texto de cada sesión
pub fn spawn(events: &EventBus, http: Arc<Http>) -> JoinHandle<()> {
    let mut rx = events.subscribe_channel();

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Some(channel_id) = event.session().text_channel() else {
                debug!("Sesión sin canal de texto; evento {} no publicado", event.kind());
                continue;
            };
            let Some(text) = render(&event) else {
                continue;
            };

            if let Err(e) = channel_id.say(&http, text).await {
                error!("Error al enviar mensaje a {}: {:?}", channel_id, e);
            }
        }
    })
}

/// Texto para un evento; `None` when the event is not worth a message.
pub fn render(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::TrackStart { track, .. } => {
            Some(format!("▶️ Ahora suena: {}", render_now_playing(track)))
        }
        SessionEvent::QueueEnd { reason, .. } => match reason {
            QueueEndReason::Stopped => None,
            QueueEndReason::Drained | QueueEndReason::Skipped => {
                Some("📭 Cola terminada. Usa `play` para seguir escuchando.".to_string())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::track::Requestor,
        testing::{track, Harness},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    #[tokio::test]
    async fn test_render_events() {
        let harness = Harness::new();
        let session = harness.session();
        let track =
            track("Lofi", 3600).with_requestor(Some(Requestor::new(UserId::new(3), "ana")));

        let start = SessionEvent::TrackStart {
            session: session.clone(),
            track,
        };
        assert_eq!(
            render(&start).as_deref(),
            Some("▶️ Ahora suena: 🎵 **Lofi** (1h) - pedido por ana")
        );

        let stopped = SessionEvent::QueueEnd {
            session: session.clone(),
            reason: QueueEndReason::Stopped,
        };
        assert_eq!(render(&stopped), None);

        let drained = SessionEvent::QueueEnd {
            session,
            reason: QueueEndReason::Drained,
        };
        assert!(render(&drained).unwrap().starts_with("📭"));
    }
}
