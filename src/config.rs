use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{audio::session::SessionSettings, sources::StreamOptions};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub queue_end_on_drain: bool,

    // Conexión
    pub reconnect_timeout_ms: u64,

    // Fuentes
    pub stream_buffer_hint: usize,
    pub search_limit: usize,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the process
    /// environment in [`Config::load`]).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            command_prefix: var("COMMAND_PREFIX", "."),

            // Audio
            default_volume: var("DEFAULT_VOLUME", "1.0")
                .parse()
                .context("DEFAULT_VOLUME inválido")?,
            max_queue_size: var("MAX_QUEUE_SIZE", "1000")
                .parse()
                .context("MAX_QUEUE_SIZE inválido")?,
            queue_end_on_drain: var("QUEUE_END_ON_DRAIN", "true")
                .parse()
                .context("QUEUE_END_ON_DRAIN inválido")?,

            // Conexión
            reconnect_timeout_ms: var("RECONNECT_TIMEOUT_MS", "5000")
                .parse()
                .context("RECONNECT_TIMEOUT_MS inválido")?,

            // Fuentes
            stream_buffer_hint: var("STREAM_BUFFER_HINT", "33554432") // 32 MiB
                .parse()
                .context("STREAM_BUFFER_HINT inválido")?,
            search_limit: var("SEARCH_LIMIT", "5")
                .parse()
                .context("SEARCH_LIMIT inválido")?,
            ytdlp_path: var("YTDLP_PATH", "yt-dlp"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Timeouts, limits and buffer sizes must be greater than 0
    /// - The command prefix must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.reconnect_timeout_ms == 0 {
            anyhow::bail!("Reconnect timeout must be greater than 0");
        }

        if self.stream_buffer_hint == 0 {
            anyhow::bail!("Stream buffer hint must be greater than 0");
        }

        if self.search_limit == 0 {
            anyhow::bail!("Search limit must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        Ok(())
    }

    pub fn reconnect_window(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }

    /// Returns a summary of the current configuration for logging.
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Audio: {}% vol, {} max queue, queueEnd on drain={}\n  \
            Voice: {}ms reconnect window\n  \
            Sources: {} ({} results), {} KiB buffer hint",
            self.command_prefix,
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.queue_end_on_drain,
            self.reconnect_timeout_ms,
            self.ytdlp_path,
            self.search_limit,
            self.stream_buffer_hint / 1024,
        )
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            reconnect_window: config.reconnect_window(),
            stream_options: StreamOptions {
                audio_only: true,
                buffer_hint: config.stream_buffer_hint,
            },
            queue_end_on_drain: config.queue_end_on_drain,
        }
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin default para el token)
            discord_token: String::new(),
            command_prefix: ".".to_string(),

            default_volume: 1.0,
            max_queue_size: 1000,
            queue_end_on_drain: true,

            reconnect_timeout_ms: 5000,

            stream_buffer_hint: 1 << 25,
            search_limit: 5,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply() {
        let config = load(&[("DISCORD_TOKEN", "token")]).unwrap();

        assert_eq!(config.command_prefix, ".");
        assert_eq!(config.default_volume, 1.0);
        assert_eq!(config.reconnect_window(), Duration::from_millis(5000));
        assert_eq!(config.stream_buffer_hint, 33_554_432);
        assert_eq!(config.search_limit, 5);
        assert!(config.queue_end_on_drain);
        assert_eq!(config.ytdlp_path, "yt-dlp");
    }

    #[test]
    fn test_token_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_overrides_and_validation() {
        let config = load(&[
            ("DISCORD_TOKEN", "token"),
            ("COMMAND_PREFIX", "!"),
            ("DEFAULT_VOLUME", "0.3"),
            ("QUEUE_END_ON_DRAIN", "false"),
            ("RECONNECT_TIMEOUT_MS", "2500"),
        ])
        .unwrap();
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.default_volume, 0.3);
        assert!(!config.queue_end_on_drain);

        assert!(load(&[("DISCORD_TOKEN", "t"), ("DEFAULT_VOLUME", "1.5")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "t"), ("RECONNECT_TIMEOUT_MS", "0")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "t"), ("SEARCH_LIMIT", "many")]).is_err());
    }

    #[test]
    fn test_session_settings_follow_config() {
        let config = load(&[
            ("DISCORD_TOKEN", "token"),
            ("DEFAULT_VOLUME", "0.5"),
            ("STREAM_BUFFER_HINT", "1024"),
        ])
        .unwrap();

        let settings = SessionSettings::from(&config);

        assert_eq!(settings.default_volume, 0.5);
        assert_eq!(settings.reconnect_window, Duration::from_millis(5000));
        assert_eq!(settings.stream_options.buffer_hint, 1024);
        assert!(settings.stream_options.audio_only);
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secret"));
    }
}
