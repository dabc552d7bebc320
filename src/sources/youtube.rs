use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use songbird::input::{HttpRequest, Input, YoutubeDl};
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::{AudioSourceProvider, AudioStream, StreamOptions, TrackResolver};
use crate::{
    audio::track::Track,
    error::{PlayerError, PlayerResult},
};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("regex de YouTube válida")
});

/// Verifica si una URL es de YouTube
pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

/// Información extraída de yt-dlp (una línea JSON por resultado)
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
}

impl YtDlpEntry {
    fn into_track(self) -> Option<Track> {
        let url = self
            .webpage_url
            .or_else(|| self.url.filter(|u| u.starts_with("http")))
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={id}"))
            })?;
        let title = self.title.unwrap_or_else(|| url.clone());
        let duration = self
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_default();

        Some(Track::new(url, title, duration))
    }
}

/// Parses yt-dlp `--dump-json` output, keeping the line order as ranking.
pub(crate) fn parse_search_output(stdout: &str) -> Vec<Track> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => entry.into_track(),
            Err(e) => {
                debug!("Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}

/// Resolver que busca en YouTube mediante yt-dlp
pub struct YtDlpResolver {
    binary: String,
    limit: usize,
    // Limitar requests concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, limit: usize) -> Self {
        Self {
            binary: binary.into(),
            limit: limit.max(1),
            rate_limiter: Semaphore::new(3),
        }
    }

    async fn run(&self, args: &[&str]) -> PlayerResult<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| PlayerError::Search(e.to_string()))?;

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| PlayerError::Search(format!("Error al ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PlayerError::Search(format!("yt-dlp error: {}", error.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn search(&self, query: &str) -> PlayerResult<Vec<Track>> {
        let query = query.trim();
        let stdout = if is_youtube_url(query) {
            debug!("📊 Obteniendo info de: {}", query);
            self.run(&["--no-playlist", "--dump-json", "--no-warnings", query])
                .await?
        } else {
            info!("🔍 Buscando en YouTube: {}", query);
            let search_query = format!("ytsearch{}:{}", self.limit, query);
            self.run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?
        };

        let tracks = parse_search_output(&stdout);
        debug!("{} resultados para '{}'", tracks.len(), query);
        Ok(tracks)
    }
}

/// Abre el audio con los inputs perezosos de songbird
pub struct YtDlpSource {
    client: reqwest::Client,
    program: &'static str,
}

impl YtDlpSource {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            program: "yt-dlp",
        }
    }

    /// Ejecutable compatible con yt-dlp usado para extraer el audio.
    ///
    /// songbird's `YoutubeDl` input borrows its program for `'static`, so a
    /// custom path is leaked here. Configure it once per process.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        let program = program.into();
        if program != self.program {
            self.program = Box::leak(program.into_boxed_str());
        }
        self
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSourceProvider for YtDlpSource {
    async fn open(&self, url: &str, options: StreamOptions) -> PlayerResult<AudioStream> {
        let parsed =
            Url::parse(url).map_err(|_| PlayerError::Playback(format!("URL mal formada: {url}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PlayerError::Playback(format!(
                "Esquema no soportado: {}",
                parsed.scheme()
            )));
        }

        // songbird hace su propio buffering; el hint sólo se registra
        debug!(
            "🎵 Abriendo stream (audio_only={}, buffer_hint={}): {}",
            options.audio_only, options.buffer_hint, url
        );

        let input = if is_youtube_url(url) {
            Input::from(YoutubeDl::new_ytdl_like(
                self.program,
                self.client.clone(),
                url.to_string(),
            ))
        } else {
            if !options.audio_only {
                warn!("⚠️ URL directa abierta tal cual, sin filtrar video: {}", url);
            }
            Input::from(HttpRequest::new(self.client.clone(), url.to_string()))
        };

        Ok(AudioStream::new(url, input))
    }
}
