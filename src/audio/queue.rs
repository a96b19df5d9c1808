use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::VecDeque;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::{
    audio::transport::{PlaybackHandle, VoiceConnection},
    error::JukeboxError,
    sources::TrackRef,
};

#[derive(Debug, Clone)]
pub struct QueuedTrack {
    pub track: TrackRef,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl QueuedTrack {
    pub fn new(track: TrackRef, requested_by: UserId) -> Self {
        Self {
            track,
            requested_by,
            added_at: Utc::now(),
        }
    }
}

/// Pista que está sonando ahora mismo
pub struct NowPlaying {
    pub item: QueuedTrack,
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    handle: Box<dyn PlaybackHandle>,
    watchdog: Option<AbortHandle>,
}

impl NowPlaying {
    pub fn stop(&self) {
        self.handle.stop();
    }
}

/// Estado explícito del reproductor de una guild
pub enum PlayerState {
    Idle,
    Playing(NowPlaying),
}

/// Estado observable desde fuera del controlador
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No hay cola para la guild
    Absent,
    Idle,
    Playing,
}

/// Cola de una guild: pistas pendientes, conexión de voz y reproducción actual
pub struct GuildQueue {
    guild_id: GuildId,
    voice_channel_id: ChannelId,
    text_channel_id: ChannelId,
    pending: VecDeque<QueuedTrack>,
    connection: Box<dyn VoiceConnection>,
    state: PlayerState,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(
        guild_id: GuildId,
        voice_channel_id: ChannelId,
        text_channel_id: ChannelId,
        connection: Box<dyn VoiceConnection>,
        max_size: usize,
    ) -> Self {
        Self {
            guild_id,
            voice_channel_id,
            text_channel_id,
            pending: VecDeque::new(),
            connection,
            state: PlayerState::Idle,
            max_size,
        }
    }

    pub fn voice_channel_id(&self) -> ChannelId {
        self.voice_channel_id
    }

    pub fn text_channel_id(&self) -> ChannelId {
        self.text_channel_id
    }

    pub fn connection(&self) -> &dyn VoiceConnection {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> &mut dyn VoiceConnection {
        self.connection.as_mut()
    }

    /// Agrega una pista al final y devuelve su posición en orden de reproducción
    /// (1 = la siguiente en sonar si no hay nada sonando)
    pub fn push(&mut self, item: QueuedTrack) -> Result<usize, JukeboxError> {
        if self.pending.len() >= self.max_size {
            return Err(JukeboxError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola de {}: {}", self.guild_id, item.track);
        self.pending.push_back(item);
        Ok(self.position_of_last())
    }

    fn position_of_last(&self) -> usize {
        self.pending.len() + usize::from(self.is_playing())
    }

    /// Saca la siguiente pista (FIFO)
    pub fn pop_next(&mut self) -> Option<QueuedTrack> {
        let next = self.pending.pop_front();
        match &next {
            Some(item) => debug!("➡️ Siguiente en cola (FIFO): {}", item.track),
            None => debug!("📭 Cola vacía en {}", self.guild_id),
        }
        next
    }

    pub fn clear(&mut self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        info!("🗑️ Cola limpiada: {} pistas removidas", cleared);
        cleared
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlayerState::Playing(_))
    }

    pub fn state(&self) -> PlaybackState {
        match self.state {
            PlayerState::Idle => PlaybackState::Idle,
            PlayerState::Playing(_) => PlaybackState::Playing,
        }
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        match &self.state {
            PlayerState::Playing(now) => Some(now),
            PlayerState::Idle => None,
        }
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.now_playing().map(|now| now.generation)
    }

    /// `Idle → Playing`
    pub fn start_playing(&mut self, item: QueuedTrack, generation: u64, handle: Box<dyn PlaybackHandle>) {
        self.state = PlayerState::Playing(NowPlaying {
            item,
            generation,
            started_at: Utc::now(),
            handle,
            watchdog: None,
        });
    }

    /// Asocia a la pista actual la tarea que la corta por duración
    pub fn set_watchdog(&mut self, watchdog: AbortHandle) {
        match &mut self.state {
            PlayerState::Playing(now) => now.watchdog = Some(watchdog),
            PlayerState::Idle => watchdog.abort(),
        }
    }

    /// `Playing → Idle`; devuelve la pista que sonaba y cancela su watchdog
    pub fn finish_playing(&mut self) -> Option<NowPlaying> {
        match std::mem::replace(&mut self.state, PlayerState::Idle) {
            PlayerState::Playing(mut now) => {
                if let Some(watchdog) = now.watchdog.take() {
                    watchdog.abort();
                }
                Some(now)
            }
            PlayerState::Idle => None,
        }
    }
}
