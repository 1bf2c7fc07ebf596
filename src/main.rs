use anyhow::Result;
use serenity::{
    model::{gateway::GatewayIntents, id::ApplicationId},
    Client,
};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{
    discord_voice::SongbirdDriver, player::PlaybackController, registry::GuildRegistry,
    service::QueueService, voice::VoiceSessionManager,
};
use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::{ResolverPool, YtDlpResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config.ytdlp_path).await;
    }

    info!("{}", config.summary());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Construir cliente
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .application_id(ApplicationId::new(config.application_id))
        .event_handler(JukeboxBot::new(config.clone()))
        .register_songbird_with(songbird.clone())
        .await?;

    // Motor de reproducción
    let driver = SongbirdDriver::new(songbird, client.cache.clone(), config.default_volume)?;
    let registry = Arc::new(GuildRegistry::new(config.max_queue_size));
    let voice = Arc::new(VoiceSessionManager::new(Arc::new(driver)));
    let (controller, events) = PlaybackController::new(registry.clone(), voice.clone());
    let resolver = ResolverPool::new(
        Arc::new(YtDlpResolver::new(config.ytdlp_path.clone())),
        config.resolver_workers,
    );
    let queue = Arc::new(QueueService::new(registry, voice, controller.clone(), resolver));

    {
        let mut data = client.data.write().await;
        data.insert::<QueueService>(queue);
    }

    let shutdown = CancellationToken::new();
    let controller_task = tokio::spawn(controller.run(events, shutdown.clone()));

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        signal.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start_autosharded().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    shutdown.cancel();
    if let Err(e) = controller_task.await {
        error!("El controlador de reproducción terminó con error: {:?}", e);
    }

    Ok(())
}

async fn health_check(ytdlp_path: &str) -> Result<()> {
    let yt_dlp = async_process::Command::new(ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK yt-dlp {}", String::from_utf8_lossy(&yt_dlp.stdout).trim());
        Ok(())
    } else {
        anyhow::bail!("yt-dlp no disponible en `{}`", ytdlp_path);
    }
}
