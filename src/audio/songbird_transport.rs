//! Transporte de voz sobre songbird.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{input::Input, tracks::TrackHandle, Call, Songbird};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::transport::{
        PipelineStatus, PlaybackHandle, TrackFinish, TrackOutcome, VoiceConnection, VoiceGateway,
    },
    bot::events::{register_call_events, register_track_events},
    error::JukeboxError,
    sources::{watch_source, MediaPipeline, TrackRef},
};

pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    pipeline: Arc<MediaPipeline>,
    start_timeout: Duration,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>, pipeline: Arc<MediaPipeline>, start_timeout: Duration) -> Self {
        Self {
            manager,
            pipeline,
            start_timeout,
        }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, JukeboxError> {
        let call = match self.manager.join(guild_id, channel_id).await {
            Ok(call) => call,
            Err(e) => {
                // Un join fallido puede dejar la llamada a medio crear
                if let Err(remove_err) = self.manager.remove(guild_id).await {
                    debug!("No había llamada que limpiar en {}: {:?}", guild_id, remove_err);
                }
                return Err(JukeboxError::Join {
                    message: e.to_string(),
                });
            }
        };

        register_call_events(&mut *call.lock().await, guild_id);
        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Box::new(SongbirdConnection {
            guild_id,
            call,
            manager: self.manager.clone(),
            pipeline: self.pipeline.clone(),
            start_timeout: self.start_timeout,
        }))
    }
}

pub struct SongbirdConnection {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    manager: Arc<Songbird>,
    pipeline: Arc<MediaPipeline>,
    start_timeout: Duration,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(
        &mut self,
        track: &TrackRef,
        finish: TrackFinish,
    ) -> Result<Box<dyn PlaybackHandle>, JukeboxError> {
        let opened = self.pipeline.open(track)?;
        let status = match opened.source {
            Some(source) => {
                let status = PipelineStatus::with_source();
                watch_source(source, status.clone());
                status
            }
            None => PipelineStatus::without_source(),
        };
        let input: Input = opened.input.into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        if let Err(e) = register_track_events(&handle, &finish, &status) {
            status.mark_stopped();
            let _ = handle.stop();
            return Err(JukeboxError::pipeline(track, format!("{:?}", e)));
        }

        watch_start(
            handle.clone(),
            finish.clone(),
            status.clone(),
            track.clone(),
            self.start_timeout,
        );
        debug!("▶️ Pista lanzada en guild {}: {}", self.guild_id, track);

        Ok(Box::new(SongbirdPlayback {
            handle,
            finish,
            status,
        }))
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_channel().is_some()
    }

    async fn release(&mut self) {
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => debug!("Llamada ya cerrada en {}: {:?}", self.guild_id, e),
        }
    }
}

/// Si la pista no llega a sonar en `timeout` se da por fallida.
///
/// Los errores de arranque los reporta el evento `TrackEvent::Error`; aquí solo
/// se cubre el caso de un pipeline que no produce audio ni termina.
fn watch_start(
    handle: TrackHandle,
    finish: TrackFinish,
    status: PipelineStatus,
    track: TrackRef,
    timeout: Duration,
) {
    tokio::spawn(async move {
        match tokio::time::timeout(timeout, handle.make_playable_async()).await {
            Ok(Ok(())) => debug!("✅ Pista lista: {}", track),
            Ok(Err(e)) => debug!("Pista terminada antes de sonar ({}): {:?}", track, e),
            Err(_) => {
                warn!("⏱️ {} no empezó a sonar en {:?}", track, timeout);
                finish.fire(TrackOutcome::Failed(format!(
                    "did not start within {}",
                    humantime::format_duration(timeout)
                )));
                status.mark_stopped();
                let _ = handle.stop();
            }
        }
    });
}

struct SongbirdPlayback {
    handle: TrackHandle,
    finish: TrackFinish,
    status: PipelineStatus,
}

impl PlaybackHandle for SongbirdPlayback {
    fn stop(&self) {
        self.status.mark_stopped();
        if let Err(e) = self.handle.stop() {
            // La pista ya no existe en el driver, nadie más va a avisar
            debug!("stop sobre pista terminada: {:?}", e);
            self.finish.fire(TrackOutcome::Finished);
        }
    }
}
