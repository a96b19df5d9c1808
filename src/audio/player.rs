use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::AbortHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        announcer::Announcer,
        queue::{GuildQueue, PlaybackState, QueuedTrack},
        registry::{GuildRegistry, GuildSlot, SharedSlot},
        transport::{TrackFinish, TrackOutcome, TrackSignal, VoiceGateway},
    },
    config::Config,
    error::JukeboxError,
    sources::TrackRef,
};

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub max_queue_size: usize,
    /// Tiempo máximo que puede sonar una pista antes de cortarla
    pub max_track_duration: Option<Duration>,
}

impl QueueSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            max_track_duration: config.max_track_duration,
        }
    }
}

/// Pedido de `play` ya validado por el dispatcher
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub voice_channel_id: ChannelId,
    pub text_channel_id: ChannelId,
    pub track: TrackRef,
    pub requested_by: UserId,
}

/// Aviso para el canal de texto de una cola
#[derive(Debug, Clone, PartialEq)]
pub enum Announcement {
    NowPlaying {
        channel_id: ChannelId,
        track: TrackRef,
    },
    TrackFailed {
        channel_id: ChannelId,
        track: TrackRef,
        reason: String,
    },
}

/// Resultado de `enqueue`. Los avisos se publican con
/// [`QueueController::announce`] después de responder al usuario.
#[must_use]
#[derive(Debug)]
pub struct Enqueued {
    pub position: usize,
    pub announcements: Vec<Announcement>,
}

/// Controlador de colas: una cola por guild, una pista sonando a la vez.
///
/// Todas las transiciones de una guild (enqueue, fin de pista, skip, stop,
/// watchdog) se ejecutan con el lock de su casilla tomado, así que nunca corren
/// dos a la vez para la misma guild. El fin de cada pista llega como
/// [`TrackSignal`] por un canal y se procesa en su propia tarea. Los avisos al
/// canal de texto se publican siempre con el lock ya liberado.
#[derive(Clone)]
pub struct QueueController {
    registry: GuildRegistry,
    gateway: Arc<dyn VoiceGateway>,
    announcer: Arc<dyn Announcer>,
    signals: UnboundedSender<TrackSignal>,
    generations: Arc<AtomicU64>,
    settings: QueueSettings,
}

impl QueueController {
    /// Crea el controlador y lanza la tarea que recibe las señales de fin de
    /// pista. Debe llamarse dentro de un runtime de tokio.
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        announcer: Arc<dyn Announcer>,
        settings: QueueSettings,
    ) -> Self {
        let (signals, receiver) = mpsc::unbounded_channel();

        let controller = Self {
            registry: GuildRegistry::new(),
            gateway,
            announcer,
            signals,
            generations: Arc::new(AtomicU64::new(0)),
            settings,
        };

        controller.spawn_signal_pump(receiver);
        controller
    }

    fn spawn_signal_pump(&self, mut receiver: UnboundedReceiver<TrackSignal>) {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(signal) = receiver.recv().await {
                let controller = controller.clone();
                tokio::spawn(async move {
                    controller.on_track_signal(signal).await;
                });
            }
        });
    }

    /// Agrega una pista a la cola de la guild, creando la cola (y uniéndose al
    /// canal de voz) si no existe. La posición cuenta la pista que está sonando.
    pub async fn enqueue(&self, request: PlayRequest) -> Result<Enqueued, JukeboxError> {
        let guild_id = request.guild_id;

        loop {
            let slot = self.registry.get_or_insert(guild_id);
            let mut guard = slot.lock().await;

            // La cola se cerró entre la búsqueda y el lock
            if guard.is_retired() {
                continue;
            }

            if guard.queue.is_none() {
                let connection = match self
                    .gateway
                    .join(guild_id, request.voice_channel_id)
                    .await
                {
                    Ok(connection) => connection,
                    Err(e) => {
                        error!("Error al conectar al canal de voz en guild {}: {}", guild_id, e);
                        self.registry.retire(guild_id, &slot, &mut guard);
                        return Err(e);
                    }
                };

                info!(
                    "🔊 Conectado al canal de voz {} en guild {}",
                    request.voice_channel_id, guild_id
                );
                guard.queue = Some(GuildQueue::new(
                    guild_id,
                    request.voice_channel_id,
                    request.text_channel_id,
                    connection,
                    self.settings.max_queue_size,
                ));
            }

            let queue = match guard.queue.as_mut() {
                Some(queue) => queue,
                None => continue,
            };

            let position = queue.push(QueuedTrack::new(request.track, request.requested_by))?;
            let idle = !queue.is_playing();

            let mut announcements = Vec::new();
            if idle {
                self.advance_locked(guild_id, &slot, &mut guard, &mut announcements)
                    .await;
            }

            return Ok(Enqueued {
                position,
                announcements,
            });
        }
    }

    /// Empieza la siguiente pista si la guild tiene cola y no hay nada sonando.
    /// Las señales que llegan después de cerrar la cola no hacen nada.
    pub async fn advance(&self, guild_id: GuildId) {
        let Some(slot) = self.registry.get(guild_id) else {
            debug!("advance sin cola en guild {}", guild_id);
            return;
        };

        let mut announcements = Vec::new();
        {
            let mut guard = slot.lock().await;
            match guard.queue.as_ref() {
                Some(queue) if !queue.is_playing() => {}
                _ => return,
            }

            self.advance_locked(guild_id, &slot, &mut guard, &mut announcements)
                .await;
        }

        self.announce(announcements).await;
    }

    /// Transición central. Con la casilla bloqueada y el reproductor en `Idle`:
    /// saca la siguiente pista y la reproduce, o cierra la cola si no queda nada.
    /// Una pista cuyo pipeline no arranca se trata como terminada.
    async fn advance_locked(
        &self,
        guild_id: GuildId,
        slot: &SharedSlot,
        guard: &mut GuildSlot,
        announcements: &mut Vec<Announcement>,
    ) {
        loop {
            let Some(queue) = guard.queue.as_mut() else {
                return;
            };

            if queue.is_playing() {
                warn!("advance con una pista sonando en guild {}", guild_id);
                return;
            }

            let Some(item) = queue.pop_next() else {
                info!("📭 Cola vacía, saliendo del canal de voz en guild {}", guild_id);
                queue.connection_mut().release().await;
                self.registry.retire(guild_id, slot, guard);
                return;
            };

            let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
            let finish = TrackFinish::new(guild_id, generation, self.signals.clone());
            let track = item.track.clone();
            let channel_id = queue.text_channel_id();

            match queue.connection_mut().play(&track, finish).await {
                Ok(handle) => {
                    let waited = chrono::Utc::now() - item.added_at;
                    info!(
                        "▶️ Reproduciendo: {} en guild {} (pedida por {}, en cola {}s)",
                        track,
                        guild_id,
                        item.requested_by,
                        waited.num_seconds()
                    );
                    queue.start_playing(item, generation, handle);
                    if let Some(watchdog) = self.arm_watchdog(guild_id, generation) {
                        queue.set_watchdog(watchdog);
                    }

                    announcements.push(Announcement::NowPlaying { channel_id, track });
                    return;
                }
                Err(e) => {
                    warn!("❌ No se pudo reproducir {} en guild {}: {}", track, guild_id, e);
                    announcements.push(Announcement::TrackFailed {
                        channel_id,
                        track,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Maneja el fin (o error) de una pista. Solo cuenta la señal de la pista
    /// que está sonando; las demás son tardías o repetidas. Tras liberar el
    /// lock publica el fallo (si lo hubo) y avanza a la siguiente pista.
    pub async fn on_track_signal(&self, signal: TrackSignal) {
        let guild_id = signal.guild_id;

        let Some(slot) = self.registry.get(guild_id) else {
            debug!(
                "Señal tardía para guild {} (generación {}), sin cola",
                guild_id, signal.generation
            );
            return;
        };

        let mut announcements = Vec::new();
        {
            let mut guard = slot.lock().await;
            let Some(queue) = guard.queue.as_mut() else {
                return;
            };

            if queue.current_generation() != Some(signal.generation) {
                debug!(
                    "Señal obsoleta para guild {} (generación {})",
                    guild_id, signal.generation
                );
                return;
            }

            let channel_id = queue.text_channel_id();
            if let Some(finished) = queue.finish_playing() {
                let played = chrono::Utc::now() - finished.started_at;

                match signal.outcome {
                    TrackOutcome::Finished => {
                        info!(
                            "🎵 Pista terminada en guild {}: {} ({}s)",
                            guild_id,
                            finished.item.track,
                            played.num_seconds()
                        );
                    }
                    TrackOutcome::Failed(reason) => {
                        error!(
                            "❌ Error en pista para guild {}: {} - {}",
                            guild_id, finished.item.track, reason
                        );
                        announcements.push(Announcement::TrackFailed {
                            channel_id,
                            track: finished.item.track,
                            reason,
                        });
                    }
                }
            }
        }

        self.announce(announcements).await;
        // Si entre medio llegó un enqueue o un stop, advance no hace nada
        self.advance(guild_id).await;
    }

    /// Publica los avisos en el canal de texto. Nunca se llama con un lock de
    /// guild tomado.
    pub async fn announce(&self, announcements: Vec<Announcement>) {
        for announcement in announcements {
            match announcement {
                Announcement::NowPlaying { channel_id, track } => {
                    self.announcer.now_playing(channel_id, &track).await;
                }
                Announcement::TrackFailed {
                    channel_id,
                    track,
                    reason,
                } => {
                    self.announcer.track_failed(channel_id, &track, &reason).await;
                }
            }
        }
    }

    /// Detiene la pista actual. El avance lo hace la señal de fin que dispara el
    /// transporte, nunca esta función.
    pub async fn skip(&self, guild_id: GuildId) -> Result<(), JukeboxError> {
        let slot = self
            .registry
            .get(guild_id)
            .ok_or(JukeboxError::NothingPlaying)?;

        let guard = slot.lock().await;
        let now = guard
            .queue
            .as_ref()
            .and_then(|queue| queue.now_playing())
            .ok_or(JukeboxError::NothingPlaying)?;

        info!("⏭️ Saltando {} en guild {}", now.item.track, guild_id);
        now.stop();
        Ok(())
    }

    /// Vacía la cola, detiene la pista, sale del canal y elimina la cola.
    /// Devuelve cuántas pistas pendientes se descartaron.
    pub async fn stop(&self, guild_id: GuildId) -> Result<usize, JukeboxError> {
        let slot = self
            .registry
            .get(guild_id)
            .ok_or(JukeboxError::NothingToStop)?;

        let mut guard = slot.lock().await;
        self.teardown_locked(guild_id, &slot, &mut guard)
            .await
            .ok_or(JukeboxError::NothingToStop)
    }

    /// El bot dejó el canal de voz `channel_id` sin que nadie usara `stop`.
    ///
    /// La cola solo se detiene si sigue asociada a ese canal y su conexión ya
    /// no está activa: el aviso de una conexión anterior (por ejemplo, la
    /// salida propia al vaciarse la cola) no toca una cola creada después.
    /// Devuelve `true` si detuvo la cola.
    pub async fn disconnected(&self, guild_id: GuildId, channel_id: Option<ChannelId>) -> bool {
        let Some(slot) = self.registry.get(guild_id) else {
            debug!("Desconexión en guild {} sin cola activa", guild_id);
            return false;
        };

        let mut guard = slot.lock().await;
        let Some(queue) = guard.queue.as_ref() else {
            return false;
        };

        if channel_id.is_some_and(|channel| channel != queue.voice_channel_id()) {
            debug!(
                "Desconexión de {:?} ignorada, la cola de {} usa {}",
                channel_id,
                guild_id,
                queue.voice_channel_id()
            );
            return false;
        }

        if queue.connection().is_connected().await {
            debug!("Desconexión obsoleta en guild {}, la conexión sigue activa", guild_id);
            return false;
        }

        self.teardown_locked(guild_id, &slot, &mut guard).await.is_some()
    }

    async fn teardown_locked(
        &self,
        guild_id: GuildId,
        slot: &SharedSlot,
        guard: &mut GuildSlot,
    ) -> Option<usize> {
        let mut queue = guard.queue.take()?;

        let cleared = queue.clear();
        if let Some(now) = queue.finish_playing() {
            now.stop();
        }
        queue.connection_mut().release().await;
        self.registry.retire(guild_id, slot, guard);

        info!(
            "⏹️ Reproducción detenida en guild {} (canal {})",
            guild_id,
            queue.voice_channel_id()
        );
        Some(cleared)
    }

    pub async fn state(&self, guild_id: GuildId) -> PlaybackState {
        let Some(slot) = self.registry.get(guild_id) else {
            return PlaybackState::Absent;
        };

        let guard = slot.lock().await;
        let state = guard
            .queue
            .as_ref()
            .map_or(PlaybackState::Absent, |queue| queue.state());
        state
    }

    pub async fn pending_len(&self, guild_id: GuildId) -> usize {
        let Some(slot) = self.registry.get(guild_id) else {
            return 0;
        };

        let guard = slot.lock().await;
        let len = guard.queue.as_ref().map_or(0, |queue| queue.len());
        len
    }

    pub fn active_guilds(&self) -> usize {
        self.registry.len()
    }

    fn arm_watchdog(&self, guild_id: GuildId, generation: u64) -> Option<AbortHandle> {
        let limit = self.settings.max_track_duration?;

        let controller = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            controller.expire(guild_id, generation, limit).await;
        });
        Some(task.abort_handle())
    }

    /// Corta la pista `generation` si sigue sonando
    async fn expire(&self, guild_id: GuildId, generation: u64, limit: Duration) {
        let Some(slot) = self.registry.get(guild_id) else {
            return;
        };

        let guard = slot.lock().await;
        if let Some(now) = guard.queue.as_ref().and_then(|queue| queue.now_playing()) {
            if now.generation == generation {
                warn!(
                    "⏰ {} superó {} en guild {}, cortando",
                    now.item.track,
                    humantime::format_duration(limit),
                    guild_id
                );
                now.stop();
            }
        }
    }
}
