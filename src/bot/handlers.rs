use anyhow::Result;
use serenity::{
    model::{
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::player::{Announcement, PlayRequest},
    bot::{commands::Command, JukeboxBot},
    error::JukeboxError,
    sources::TrackRef,
};

/// Maneja los mensajes de texto con el prefijo del bot
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &JukeboxBot) -> Result<()> {
    if msg.author.bot {
        return Ok(());
    }

    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let Some(command) = Command::parse(&msg.content, bot.prefix()) else {
        return Ok(());
    };

    info!(
        "📝 Comando {} usado por {} en guild {}",
        command.name(),
        msg.author.name,
        guild_id
    );

    let (reply, announcements) = match command {
        Command::Play(arg) => handle_play(ctx, msg, bot, guild_id, arg).await,
        Command::Skip => (skip_reply(bot.controller().skip(guild_id).await), Vec::new()),
        Command::Stop => (stop_reply(bot.controller().stop(guild_id).await), Vec::new()),
    };

    // La respuesta al comando va antes que "Now playing"
    let sent = msg.channel_id.say(&ctx.http, reply).await;
    bot.controller().announce(announcements).await;
    sent?;

    let controller = bot.controller();
    debug!(
        "📊 Guild {}: {:?}, {} pendientes, {} colas activas",
        guild_id,
        controller.state(guild_id).await,
        controller.pending_len(guild_id).await,
        controller.active_guilds()
    );

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    msg: &Message,
    bot: &JukeboxBot,
    guild_id: GuildId,
    arg: Option<String>,
) -> (String, Vec<Announcement>) {
    let Some(raw) = arg else {
        return ("❌ Provide a YouTube URL.".to_string(), Vec::new());
    };

    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, msg.author.id) else {
        return ("❌ Join a voice channel first.".to_string(), Vec::new());
    };

    let request = PlayRequest {
        guild_id,
        voice_channel_id,
        text_channel_id: msg.channel_id,
        track: TrackRef::parse(&raw),
        requested_by: msg.author.id,
    };

    match bot.controller().enqueue(request).await {
        Ok(enqueued) => (play_reply(Ok(enqueued.position)), enqueued.announcements),
        Err(e) => (play_reply(Err(e)), Vec::new()),
    }
}

fn play_reply(result: Result<usize, JukeboxError>) -> String {
    match result {
        Ok(position) => format!("🎶 Added to queue ({})", position),
        Err(e) => error_reply(e),
    }
}

fn skip_reply(result: Result<(), JukeboxError>) -> String {
    match result {
        Ok(()) => "⏭️ Skipped.".to_string(),
        Err(e) => error_reply(e),
    }
}

fn stop_reply(result: Result<usize, JukeboxError>) -> String {
    match result {
        Ok(cleared) => {
            debug!("stop limpió {} pistas pendientes", cleared);
            "🛑 Stopped and cleared queue.".to_string()
        }
        Err(e) => error_reply(e),
    }
}

fn error_reply(error: JukeboxError) -> String {
    if error.is_user_error() {
        debug!("Comando rechazado: {}", error);
    } else {
        warn!("Comando falló: {}", error);
    }

    match error {
        JukeboxError::Join { .. } => "❌ Could not join your voice channel.".to_string(),
        other => format!("❌ {}.", other),
    }
}

/// Canal de voz en el que está el usuario, según la caché
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_play_reply() {
        assert_eq!(play_reply(Ok(1)), "🎶 Added to queue (1)");
        assert_eq!(
            play_reply(Err(JukeboxError::QueueFull { max: 5 })),
            "❌ The queue is full (max 5)."
        );
        assert_eq!(
            play_reply(Err(JukeboxError::Join {
                message: "timed out".into()
            })),
            "❌ Could not join your voice channel."
        );
    }

    #[test]
    fn test_skip_and_stop_replies() {
        assert_eq!(skip_reply(Ok(())), "⏭️ Skipped.");
        assert_eq!(skip_reply(Err(JukeboxError::NothingPlaying)), "❌ Nothing playing.");
        assert_eq!(stop_reply(Ok(3)), "🛑 Stopped and cleared queue.");
        assert_eq!(stop_reply(Err(JukeboxError::NothingToStop)), "❌ Nothing to stop.");
    }
}
