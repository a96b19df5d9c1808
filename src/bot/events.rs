use serenity::{async_trait, model::id::GuildId};
use songbird::{
    events::CoreEvent,
    tracks::PlayMode,
    Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::transport::{PipelineStatus, TrackFinish, TrackOutcome};

/// Cuánto se espera a yt-dlp al terminar una pista para leer su código de salida
const SOURCE_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Handler para cuando termina un track (fin natural o `stop`)
pub struct TrackEndNotifier {
    pub finish: TrackFinish,
    pub status: PipelineStatus,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        debug!(
            "🎵 Track terminó en guild {} (generación {})",
            self.finish.guild_id(),
            self.finish.generation()
        );
        // La espera por yt-dlp no debe frenar el resto de eventos de la llamada
        let finish = self.finish.clone();
        let status = self.status.clone();
        tokio::spawn(async move {
            let outcome = status.outcome(SOURCE_EXIT_GRACE).await;
            status.mark_stopped();
            finish.fire(outcome);
        });

        None
    }
}

/// Handler para errores de tracks
pub struct TrackErrorNotifier {
    pub finish: TrackFinish,
    pub status: PipelineStatus,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let mut reason = String::from("playback error");
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    reason = format!("{:?}", e);
                }
            }
        }

        warn!(
            "❌ Error en track para guild {}: {}",
            self.finish.guild_id(),
            reason
        );
        self.status.mark_stopped();
        self.finish.fire(TrackOutcome::Failed(reason));

        None
    }
}

/// Handler para desconexiones del driver de voz
pub struct DriverDisconnectLogger {
    pub guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for DriverDisconnectLogger {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::DriverDisconnect(data) = ctx {
            info!(
                "🔌 Driver de voz desconectado en guild {}: {:?}",
                self.guild_id, data.reason
            );
        }

        None
    }
}

/// Registra los eventos de una pista recién lanzada
pub fn register_track_events(
    handle: &songbird::tracks::TrackHandle,
    finish: &TrackFinish,
    status: &PipelineStatus,
) -> songbird::tracks::TrackResult<()> {
    handle.add_event(
        VoiceEvent::Track(TrackEvent::End),
        TrackEndNotifier {
            finish: finish.clone(),
            status: status.clone(),
        },
    )?;

    handle.add_event(
        VoiceEvent::Track(TrackEvent::Error),
        TrackErrorNotifier {
            finish: finish.clone(),
            status: status.clone(),
        },
    )?;

    Ok(())
}

/// Registra los eventos globales de una llamada
pub fn register_call_events(call: &mut Call, guild_id: GuildId) {
    call.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverDisconnect),
        DriverDisconnectLogger { guild_id },
    );
}
