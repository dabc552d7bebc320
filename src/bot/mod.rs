//! # Bot Module
//!
//! Discord glue for Open Music playback sessions.
//!
//! - [`MusicBot`] implements Serenity's [`EventHandler`]: it parses prefix
//!   commands from guild messages and cleans a session up when the bot is
//!   disconnected from voice by someone else.
//! - [`commands`] parses and executes the text commands against the
//!   [`SessionRegistry`].
//! - [`notifier`] posts session events in each session's text channel.
//!
//! The registry lives in the client's `TypeMap` under [`SessionRegistryKey`].

use serenity::{
    all::{Context, EventHandler, Message, Ready, VoiceState},
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod notifier;

use crate::{
    audio::{registry::SessionRegistry, track::Requestor},
    config::Config,
};
use commands::{Command, Invocation};

pub struct SessionRegistryKey;

impl TypeMapKey for SessionRegistryKey {
    type Value = SessionRegistry;
}

/// Handler de eventos de Discord
pub struct MusicBot {
    config: Arc<Config>,
}

impl MusicBot {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn registry(ctx: &Context) -> Option<SessionRegistry> {
        ctx.data.read().await.get::<SessionRegistryKey>().cloned()
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(parsed) = Command::parse(&self.config.command_prefix, &msg.content) else {
            return;
        };

        let reply = match parsed {
            Err(e) => format!("❌ {e}"),
            Ok(command) => {
                let Some(registry) = Self::registry(&ctx).await else {
                    error!("Registro de sesiones no inicializado");
                    return;
                };
                // Canal de voz del autor según la caché
                let voice_channel = ctx.cache.guild(guild_id).and_then(|guild| {
                    guild
                        .voice_states
                        .get(&msg.author.id)
                        .and_then(|state| state.channel_id)
                });
                let invocation = Invocation {
                    guild_id,
                    text_channel: msg.channel_id,
                    voice_channel,
                    requestor: Requestor::new(msg.author.id, msg.author.name.clone()),
                    max_queue_size: self.config.max_queue_size,
                };
                commands::execute(&registry, command, invocation).await
            }
        };

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            error!("Error al responder comando: {:?}", e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        // Bot fue desconectado
        let Some(registry) = Self::registry(&ctx).await else {
            return;
        };
        if let Some(session) = registry.remove(guild_id) {
            warn!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
            session.leave().await;
        }
    }
}
