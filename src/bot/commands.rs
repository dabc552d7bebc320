use serenity::model::id::{ChannelId, GuildId};
use std::{fmt::Write as _, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    audio::{
        registry::SessionRegistry,
        session::{PlaybackSession, SessionOptions},
        track::{Requestor, Track},
    },
    error::{PlayerError, PlayerResult},
};

/// Tracks listed by the `queue` command
const QUEUE_PAGE: usize = 10;

/// Comandos de texto soportados
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(String),
    Join,
    Leave,
    Seek(Duration),
    Skip(usize),
    Stop,
    Pause,
    Resume,
    Volume(f32),
    Shuffle,
    Queue,
    NowPlaying,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Comando desconocido: `{0}`")]
    Unknown(String),

    #[error("Uso: `{0}`")]
    Usage(&'static str),

    #[error("El volumen debe estar entre 0 y 1.")]
    VolumeOutOfRange,
}

impl Command {
    /// Parses a message. `None` when the message is not addressed to the
    /// bot (missing prefix or empty command).
    pub fn parse(prefix: &str, content: &str) -> Option<Result<Self, ParseError>> {
        let body = content.trim().strip_prefix(prefix)?;
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };
        if name.is_empty() {
            return None;
        }

        Some(Self::from_parts(&name.to_lowercase(), args))
    }

    fn from_parts(name: &str, args: &str) -> Result<Self, ParseError> {
        let command = match name {
            "play" | "p" => {
                if args.is_empty() {
                    return Err(ParseError::Usage("play <búsqueda o URL>"));
                }
                Command::Play(args.to_string())
            }
            "join" => Command::Join,
            "leave" | "disconnect" => Command::Leave,
            "seek" => {
                let seconds: f64 = args
                    .parse()
                    .map_err(|_| ParseError::Usage("seek <segundos>"))?;
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(ParseError::Usage("seek <segundos>"));
                }
                Command::Seek(Duration::from_secs_f64(seconds))
            }
            "skip" | "s" => {
                let count = if args.is_empty() {
                    1
                } else {
                    args.parse().map_err(|_| ParseError::Usage("skip [cantidad]"))?
                };
                Command::Skip(count)
            }
            "stop" => Command::Stop,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "volume" | "vol" => {
                let volume: f32 = args
                    .parse()
                    .map_err(|_| ParseError::Usage("volume <0-1>"))?;
                if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
                    return Err(ParseError::VolumeOutOfRange);
                }
                Command::Volume(volume)
            }
            "shuffle" => Command::Shuffle,
            "queue" | "q" => Command::Queue,
            "np" | "nowplaying" => Command::NowPlaying,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Quién invoca el comando y desde dónde
#[derive(Debug, Clone)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    /// Canal de voz del autor, si está en uno
    pub voice_channel: Option<ChannelId>,
    pub requestor: Requestor,
    pub max_queue_size: usize,
}

impl Invocation {
    fn options(&self) -> SessionOptions {
        let options = SessionOptions::new(self.guild_id).text_channel(self.text_channel);
        match self.voice_channel {
            Some(channel_id) => options.voice_channel(channel_id),
            None => options,
        }
    }
}

/// Ejecuta un comando y devuelve la respuesta para el canal de texto
pub async fn execute(registry: &SessionRegistry, command: Command, invocation: Invocation) -> String {
    debug!("Comando {:?} en guild {}", command, invocation.guild_id);
    match run(registry, command, &invocation).await {
        Ok(reply) => reply,
        Err(e) => format!("❌ {e}"),
    }
}

async fn run(
    registry: &SessionRegistry,
    command: Command,
    invocation: &Invocation,
) -> PlayerResult<String> {
    let existing = || registry.get(invocation.guild_id).ok_or(PlayerError::NotPlaying);

    match command {
        Command::Play(query) => {
            let session = registry.get_or_create(invocation.options());
            if session.queue_len() >= invocation.max_queue_size {
                return Ok(format!(
                    "❌ La cola está llena ({} pistas).",
                    invocation.max_queue_size
                ));
            }
            let track = session
                .play(&query, Some(invocation.requestor.clone()))
                .await?;
            let position = session.queue_len();
            if position <= 1 {
                Ok(format!("🎵 Reproduciendo: **{}** ({})", track.title(), track.display_duration()))
            } else {
                Ok(format!(
                    "📋 Añadido a la cola: **{}** ({}) - posición {}",
                    track.title(),
                    track.display_duration(),
                    position
                ))
            }
        }
        Command::Join => {
            let session = registry.get_or_create(invocation.options());
            session.join().await?;
            Ok("🔊 Conectado al canal de voz".to_string())
        }
        Command::Leave => {
            if let Some(session) = registry.remove(invocation.guild_id) {
                session.leave().await;
                info!("👋 Sesión cerrada en guild {}", invocation.guild_id);
            }
            Ok("👋 Desconectado del canal de voz".to_string())
        }
        Command::Seek(position) => {
            existing()?.seek(position).await?;
            Ok(format!("⏩ Posición: {}", humantime::format_duration(whole_seconds(position))))
        }
        Command::Skip(count) => match existing()?.skip(count).await? {
            Some(track) => Ok(format!("⏭️ Saltada(s) {count}. Ahora: **{}**", track.title())),
            None => Ok("⏭️ Cola terminada".to_string()),
        },
        Command::Stop => {
            existing()?.stop().await?;
            Ok("⏹️ Reproducción detenida y cola limpiada".to_string())
        }
        Command::Pause => {
            let paused = match registry.get(invocation.guild_id) {
                Some(session) => session.pause().await,
                None => false,
            };
            Ok(if paused { "⏸️ Pausado" } else { "ℹ️ No hay nada que pausar" }.to_string())
        }
        Command::Resume => {
            let resumed = match registry.get(invocation.guild_id) {
                Some(session) => session.resume().await,
                None => false,
            };
            Ok(if resumed { "▶️ Reanudado" } else { "ℹ️ No hay nada que reanudar" }.to_string())
        }
        Command::Volume(volume) => {
            existing()?.set_volume(volume).await?;
            Ok(format!("🔊 Volumen: {}%", (volume * 100.0).round() as u32))
        }
        Command::Shuffle => match existing()?.shuffle().await? {
            Some(head) => Ok(format!("🔀 Cola mezclada. Ahora: **{}**", head.title())),
            None => Err(PlayerError::NotPlaying),
        },
        Command::Queue => Ok(render_queue(&existing()?)),
        Command::NowPlaying => {
            let session = existing()?;
            let track = session.now_playing().ok_or(PlayerError::NotPlaying)?;
            Ok(render_progress(&track, session.position().await))
        }
    }
}

fn whole_seconds(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}

pub fn render_now_playing(track: &Track) -> String {
    render_progress(track, None)
}

/// Like [`render_now_playing`], with the playhead when it is known.
fn render_progress(track: &Track, position: Option<Duration>) -> String {
    let mut text = match position {
        Some(position) => format!(
            "🎵 **{}** ({} / {})",
            track.title(),
            humantime::format_duration(whole_seconds(position)),
            track.display_duration()
        ),
        None => format!("🎵 **{}** ({})", track.title(), track.display_duration()),
    };
    if let Some(requestor) = track.requestor() {
        let _ = write!(text, " - pedido por {}", requestor.name);
    }
    text
}

fn render_queue(session: &Arc<PlaybackSession>) -> String {
    let tracks = session.queue();
    if tracks.is_empty() {
        return "📭 La cola está vacía".to_string();
    }

    let mut text = String::from("📋 **Cola**\n");
    for (index, track) in tracks.iter().take(QUEUE_PAGE).enumerate() {
        let marker = if index == 0 { "▶️" } else { "  " };
        let _ = writeln!(
            text,
            "{marker} {}. {} ({})",
            index + 1,
            track.title(),
            track.display_duration()
        );
    }
    if tracks.len() > QUEUE_PAGE {
        let _ = writeln!(text, "... y {} más", tracks.len() - QUEUE_PAGE);
    }
    let _ = write!(
        text,
        "Total: {} pistas, {}",
        tracks.len(),
        humantime::format_duration(whole_seconds(session.queue_duration()))
    );
    text
}
