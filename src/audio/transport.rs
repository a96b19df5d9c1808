//! Límites entre el controlador de colas y el transporte de voz.
//!
//! El controlador nunca habla con songbird directamente: pide una conexión a un
//! [`VoiceGateway`], reproduce pistas a través de [`VoiceConnection`] y se entera
//! del final de cada pista por la señal de un solo uso [`TrackFinish`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc::UnboundedSender, watch};
use tracing::debug;

use crate::{error::JukeboxError, sources::TrackRef};

/// Cómo terminó una pista
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// Fin natural, o detenida con `skip`
    Finished,
    /// Falló la descarga, la transcodificación o la reproducción
    Failed(String),
}

/// Señal enviada al controlador cuando termina la reproducción `generation`
#[derive(Debug, Clone)]
pub struct TrackSignal {
    pub guild_id: GuildId,
    pub generation: u64,
    pub outcome: TrackOutcome,
}

/// Señal de fin de pista de un solo uso.
///
/// Los clones comparten el mismo estado: si el fin y el error de una pista llegan
/// los dos, solo el primero se entrega al controlador.
#[derive(Clone)]
pub struct TrackFinish {
    guild_id: GuildId,
    generation: u64,
    sender: Arc<Mutex<Option<UnboundedSender<TrackSignal>>>>,
}

impl TrackFinish {
    pub fn new(guild_id: GuildId, generation: u64, sender: UnboundedSender<TrackSignal>) -> Self {
        Self {
            guild_id,
            generation,
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Entrega la señal. Devuelve `false` si ya se había entregado.
    pub fn fire(&self, outcome: TrackOutcome) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            debug!(
                "Señal repetida ignorada (guild {}, generación {})",
                self.guild_id, self.generation
            );
            return false;
        };

        let signal = TrackSignal {
            guild_id: self.guild_id,
            generation: self.generation,
            outcome,
        };

        if sender.send(signal).is_err() {
            debug!("Controlador detenido, señal descartada");
        }
        true
    }

    #[cfg(test)]
    pub fn is_fired(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Cómo terminó el proceso de origen (yt-dlp) de una pista
#[derive(Debug, Clone, PartialEq)]
pub enum SourceExit {
    Running,
    Success,
    Failed(String),
}

/// Estado compartido entre el pipeline de una pista y sus eventos de fin.
///
/// Un fin de pista solo cuenta como error del origen si nadie la detuvo y el
/// proceso de origen salió con error.
#[derive(Clone)]
pub struct PipelineStatus {
    stopped: Arc<AtomicBool>,
    source: Arc<watch::Sender<SourceExit>>,
}

impl PipelineStatus {
    /// Pipeline con un proceso de origen todavía corriendo
    pub fn with_source() -> Self {
        Self::starting_at(SourceExit::Running)
    }

    /// Pipeline sin proceso de origen (pista local)
    pub fn without_source() -> Self {
        Self::starting_at(SourceExit::Success)
    }

    fn starting_at(state: SourceExit) -> Self {
        let (source, _) = watch::channel(state);
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            source: Arc::new(source),
        }
    }

    /// La pista se detuvo a propósito (skip, stop, watchdog) o ya terminó
    pub fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn source_exited(&self, exit: SourceExit) {
        self.source.send_replace(exit);
    }

    #[cfg(test)]
    pub fn source_state(&self) -> SourceExit {
        self.source.borrow().clone()
    }

    /// Resultado de una pista que acaba de terminar. Espera hasta `grace` a
    /// que el proceso de origen termine para conocer su código de salida.
    pub async fn outcome(&self, grace: Duration) -> TrackOutcome {
        if self.is_stopped() {
            return TrackOutcome::Finished;
        }

        let mut receiver = self.source.subscribe();
        let exit = match tokio::time::timeout(
            grace,
            receiver.wait_for(|state| *state != SourceExit::Running),
        )
        .await
        {
            Ok(Ok(state)) => state.clone(),
            _ => SourceExit::Running,
        };

        match exit {
            SourceExit::Failed(reason) if !self.is_stopped() => TrackOutcome::Failed(reason),
            _ => TrackOutcome::Finished,
        }
    }
}

/// Reproducción en curso
pub trait PlaybackHandle: Send + Sync {
    /// Detiene la pista. El transporte debe disparar su [`TrackFinish`].
    fn stop(&self);
}

/// Conexión a un canal de voz, propiedad exclusiva de una cola
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Arranca el pipeline de `track` y empieza a reproducirlo.
    ///
    /// Si devuelve `Ok`, el transporte promete disparar `finish` exactamente una
    /// vez cuando la pista termine o falle.
    async fn play(
        &mut self,
        track: &TrackRef,
        finish: TrackFinish,
    ) -> Result<Box<dyn PlaybackHandle>, JukeboxError>;

    /// `false` si la conexión de voz se cayó (por ejemplo, alguien sacó al bot
    /// del canal)
    async fn is_connected(&self) -> bool;

    /// Sale del canal y libera la conexión
    async fn release(&mut self);
}

/// Punto de entrada al transporte de voz
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, JukeboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    #[test]
    fn test_finish_fires_once_across_clones() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let finish = TrackFinish::new(GuildId::new(1), 7, tx);
        let on_error = finish.clone();

        assert!(!finish.is_fired());
        assert!(finish.fire(TrackOutcome::Finished));
        assert!(!on_error.fire(TrackOutcome::Failed("boom".into())));
        assert!(on_error.is_fired());

        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.generation, 7);
        assert_eq!(signal.guild_id, GuildId::new(1));
        assert_eq!(signal.outcome, TrackOutcome::Finished);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_outcome_reports_failed_source() {
        let status = PipelineStatus::with_source();
        status.source_exited(SourceExit::Failed("yt-dlp exited with exit status: 1".into()));

        assert_eq!(
            status.outcome(Duration::from_millis(10)).await,
            TrackOutcome::Failed("yt-dlp exited with exit status: 1".into())
        );
    }

    #[tokio::test]
    async fn test_outcome_waits_for_source_exit() {
        let status = PipelineStatus::with_source();
        let source = status.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            source.source_exited(SourceExit::Failed("exit status: 2".into()));
        });

        assert_eq!(
            status.outcome(Duration::from_secs(2)).await,
            TrackOutcome::Failed("exit status: 2".into())
        );
    }

    #[tokio::test]
    async fn test_stopped_track_is_never_a_failure() {
        let status = PipelineStatus::with_source();
        status.mark_stopped();
        status.source_exited(SourceExit::Failed("broken pipe".into()));

        assert_eq!(status.outcome(Duration::from_millis(10)).await, TrackOutcome::Finished);
    }

    #[tokio::test]
    async fn test_outcome_without_source_or_still_running() {
        assert_eq!(
            PipelineStatus::without_source()
                .outcome(Duration::from_millis(10))
                .await,
            TrackOutcome::Finished
        );
        assert_eq!(
            PipelineStatus::with_source()
                .outcome(Duration::from_millis(10))
                .await,
            TrackOutcome::Finished
        );
    }

    #[test]
    fn test_fire_after_controller_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let finish = TrackFinish::new(GuildId::new(1), 1, tx);
        assert!(finish.fire(TrackOutcome::Finished));
    }
}
