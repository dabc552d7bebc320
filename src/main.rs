use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use open_music_sessions::{
    audio::{EventBus, SessionRegistry, SessionServices, SessionSettings},
    bot::{notifier, MusicBot, SessionRegistryKey},
    config::Config,
    sources::{YtDlpResolver, YtDlpSource},
    voice::songbird::SongbirdTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music_sessions=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Construir cliente
    let manager = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(MusicBot::new(config.clone()))
        .register_songbird_with(manager.clone())
        .await?;

    let services = SessionServices {
        resolver: Arc::new(YtDlpResolver::new(&config.ytdlp_path, config.search_limit)),
        sources: Arc::new(YtDlpSource::new().program(config.ytdlp_path.as_str())),
        transport: Arc::new(SongbirdTransport::new(manager, client.cache.clone())),
        events: EventBus::new(),
        settings: SessionSettings::from(&config),
    };
    let registry = SessionRegistry::new(services);
    notifier::spawn(registry.events(), client.http.clone());

    {
        let mut data = client.data.write().await;
        data.insert::<SessionRegistryKey>(registry.clone());
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: {}", config.ytdlp_path);
    }
}
