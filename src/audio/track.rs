use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::time::Duration;

/// Miembro del servidor que pidió la pista
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requestor {
    pub id: UserId,
    pub name: String,
}

impl Requestor {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A resolved, playable audio item.
///
/// Immutable once created: the requestor can only be attached through
/// [`Track::with_requestor`], which consumes the value before it is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    url: String,
    title: String,
    duration: Duration,
    requestor: Option<Requestor>,
    added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(url: impl Into<String>, title: impl Into<String>, duration: Duration) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            duration,
            requestor: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_requestor(mut self, requestor: Option<Requestor>) -> Self {
        self.requestor = requestor;
        self
    }

    // Getters
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn duration(&self) -> Duration {
        self.duration
    }
    pub fn requestor(&self) -> Option<&Requestor> {
        self.requestor.as_ref()
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Duración legible, p.ej. `3m 25s`
    pub fn display_duration(&self) -> String {
        humantime::format_duration(Duration::from_secs(self.duration.as_secs())).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_requestor_is_attached_once() {
        let track = Track::new("https://youtu.be/a", "A", Duration::from_secs(205))
            .with_requestor(Some(Requestor::new(UserId::new(7), "dj")));

        assert_eq!(track.requestor().map(|r| r.name.as_str()), Some("dj"));
        assert_eq!(track.display_duration(), "3m 25s");
    }
}
