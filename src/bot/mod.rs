//! # Bot Module
//!
//! Discord side of Guild Jukebox: text commands in, chat replies and
//! announcements out.
//!
//! The bot is built around the [`JukeboxBot`] struct which implements
//! Serenity's [`EventHandler`] trait. All playback goes through the
//! [`QueueController`]; the bot never touches songbird directly.

use serenity::{
    all::{Context, EventHandler, Message, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod announcer;
pub mod commands;
pub mod events;
pub mod handlers;

use crate::{audio::player::QueueController, config::Config};

pub struct JukeboxBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    controller: QueueController,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, controller: QueueController) -> Self {
        Self { config, controller }
    }

    pub fn prefix(&self) -> &str {
        &self.config.command_prefix
    }

    pub fn controller(&self) -> &QueueController {
        &self.controller
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("⌨️ Prefijo de comandos: {}", self.prefix());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if let Err(e) = handlers::handle_message(&ctx, &msg, self).await {
            error!("Error manejando mensaje: {:?}", e);
        }
    }

    /// Si alguien desconecta al bot del canal de voz, la cola de esa guild se
    /// detiene y se libera. Los avisos de una conexión que ya no es la de la
    /// cola se ignoran.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        let channel_id = old.and_then(|state| state.channel_id);
        debug!("🔌 Bot salió de {:?} en guild {}", channel_id, guild_id);

        if self.controller.disconnected(guild_id, channel_id).await {
            info!("🧹 Bot desconectado en guild {}, cola detenida", guild_id);
        }
    }
}
