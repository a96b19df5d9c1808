//! Transporte falso para probar el controlador sin Discord.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    audio::{
        announcer::MockAnnouncer,
        player::QueueController,
        queue::PlaybackState,
        transport::{PlaybackHandle, TrackFinish, TrackOutcome, VoiceConnection, VoiceGateway},
    },
    error::JukeboxError,
    sources::TrackRef,
};

pub struct NoopHandle;

impl PlaybackHandle for NoopHandle {
    fn stop(&self) {}
}

/// Una reproducción registrada por el transporte falso
#[derive(Clone)]
pub struct FakePlay {
    pub guild_id: GuildId,
    pub track: TrackRef,
    pub finish: TrackFinish,
    stopped: Arc<AtomicBool>,
}

impl FakePlay {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct FakeState {
    joins: usize,
    releases: usize,
    fail_join: bool,
    failing: HashSet<TrackRef>,
    plays: Vec<FakePlay>,
    connections: Vec<Arc<AtomicBool>>,
}

#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<FakeState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_join(self) -> Self {
        self.state.lock().fail_join = true;
        self
    }

    /// El pipeline de `track` fallará al arrancar
    pub fn fail_track(&self, track: TrackRef) {
        self.state.lock().failing.insert(track);
    }

    pub fn joins(&self) -> usize {
        self.state.lock().joins
    }

    pub fn releases(&self) -> usize {
        self.state.lock().releases
    }

    pub fn plays(&self) -> Vec<FakePlay> {
        self.state.lock().plays.clone()
    }

    pub fn played_tracks(&self) -> Vec<String> {
        self.plays().iter().map(|p| p.track.to_string()).collect()
    }

    /// Reproducciones cuya señal de fin todavía no se disparó
    pub fn active_plays(&self) -> usize {
        self.plays().iter().filter(|p| !p.finish.is_fired()).count()
    }

    /// Simula que Discord sacó al bot de todos los canales
    pub fn disconnect_all(&self) {
        for connected in &self.state.lock().connections {
            connected.store(false, Ordering::SeqCst);
        }
    }

    /// Simula el fin de la reproducción `index`
    pub fn finish(&self, index: usize, outcome: TrackOutcome) -> bool {
        let finish = self.state.lock().plays[index].finish.clone();
        finish.fire(outcome)
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        _channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, JukeboxError> {
        let mut state = self.state.lock();
        if state.fail_join {
            return Err(JukeboxError::Join {
                message: "missing permissions".to_string(),
            });
        }

        state.joins += 1;
        let connected = Arc::new(AtomicBool::new(true));
        state.connections.push(connected.clone());
        Ok(Box::new(FakeConnection {
            guild_id,
            connected,
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    guild_id: GuildId,
    connected: Arc<AtomicBool>,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(
        &mut self,
        track: &TrackRef,
        finish: TrackFinish,
    ) -> Result<Box<dyn PlaybackHandle>, JukeboxError> {
        let mut state = self.state.lock();
        if state.failing.contains(track) {
            return Err(JukeboxError::pipeline(track, "yt-dlp exited with status 1"));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        state.plays.push(FakePlay {
            guild_id: self.guild_id,
            track: track.clone(),
            finish: finish.clone(),
            stopped: stopped.clone(),
        });

        Ok(Box::new(FakeHandle { finish, stopped }))
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn release(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.state.lock().releases += 1;
    }
}

struct FakeHandle {
    finish: TrackFinish,
    stopped: Arc<AtomicBool>,
}

impl PlaybackHandle for FakeHandle {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.finish.fire(TrackOutcome::Finished);
    }
}

pub fn permissive_announcer() -> Arc<MockAnnouncer> {
    let mut announcer = MockAnnouncer::new();
    announcer.expect_now_playing().returning(|_, _| ());
    announcer.expect_track_failed().returning(|_, _, _| ());
    Arc::new(announcer)
}

/// Espera (con límite) a que se cumpla una condición
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

pub async fn wait_for_state(controller: &QueueController, guild_id: GuildId, expected: PlaybackState) {
    for _ in 0..400 {
        if controller.state(guild_id).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("guild {} never reached {:?}", guild_id, expected);
}
