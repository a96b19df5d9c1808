use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;

use crate::audio::player::{QueueController, QueueSettings};
use crate::audio::songbird_transport::SongbirdGateway;
use crate::bot::{announcer::ChannelAnnouncer, JukeboxBot};
use crate::config::Config;
use crate::sources::MediaPipeline;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    let pipeline = Arc::new(MediaPipeline::from_config(&config));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&pipeline).await;
    }

    if let Err(e) = pipeline.verify_dependencies().await {
        warn!("⚠️ Dependencias de audio no disponibles: {:?}", e);
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let songbird = Songbird::serenity();
    let gateway = SongbirdGateway::new(songbird.clone(), pipeline, config.track_start_timeout);
    let announcer = ChannelAnnouncer::new(Arc::new(Http::new(&config.discord_token)));
    let controller = QueueController::new(
        Arc::new(gateway),
        Arc::new(announcer),
        QueueSettings::from_config(&config),
    );

    let config = Arc::new(config);
    let handler = JukeboxBot::new(config.clone(), controller);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(pipeline: &MediaPipeline) -> Result<()> {
    pipeline.verify_dependencies().await?;
    println!("OK");
    Ok(())
}
