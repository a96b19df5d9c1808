pub mod transcoder;
pub mod ytdlp;

use anyhow::Result;
use songbird::input::ChildContainer;
use std::{
    fmt,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    process::{Child, Stdio},
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    audio::transport::{PipelineStatus, SourceExit},
    config::Config,
    error::JukeboxError,
};

pub use transcoder::{TranscodeInput, Transcoder};
pub use ytdlp::YtDlp;

/// Palabra reservada que selecciona la pista local de prueba
pub const FIXTURE_TOKEN: &str = "test";

/// Tono que suena para `test` si no hay `FIXTURE_TRACK`
const FIXTURE_TONE_HZ: u32 = 440;
const FIXTURE_TONE_SECONDS: u32 = 5;

const SOURCE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Referencia a una pista tal como la escribió el usuario
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackRef {
    /// URL de la plataforma de video (no se valida aquí)
    Remote(String),
    /// Pista local configurada en `FIXTURE_TRACK` (o un tono generado)
    Fixture,
}

impl TrackRef {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == FIXTURE_TOKEN {
            TrackRef::Fixture
        } else {
            TrackRef::Remote(raw.to_string())
        }
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackRef::Remote(url) => f.write_str(url),
            TrackRef::Fixture => f.write_str(FIXTURE_TOKEN),
        }
    }
}

/// Procesos de una pista ya lanzada
pub struct OpenedTrack {
    /// Entrada para el transporte de voz; el último hijo produce el audio
    pub input: ChildContainer,
    /// yt-dlp, vigilado aparte para conocer su código de salida
    pub source: Option<Child>,
}

/// yt-dlp → ffmpeg, entregando PCM listo para el transporte de voz
#[derive(Debug, Clone)]
pub struct MediaPipeline {
    source: YtDlp,
    transcoder: Transcoder,
    fixture: Option<PathBuf>,
}

impl MediaPipeline {
    pub fn new(source: YtDlp, transcoder: Transcoder, fixture: Option<PathBuf>) -> Self {
        Self {
            source,
            transcoder,
            fixture,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            YtDlp::new(
                config.ytdlp_path.clone(),
                config.ytdlp_format.clone(),
                config.cookies_file.clone(),
            )
            .with_default_cookies(),
            Transcoder::new(config.ffmpeg_path.clone()),
            config.fixture_path.clone(),
        )
    }

    /// Lanza los procesos de la pista. Al soltar el contenedor se termina
    /// ffmpeg; yt-dlp queda en `OpenedTrack::source`.
    pub fn open(&self, track: &TrackRef) -> Result<OpenedTrack, JukeboxError> {
        match track {
            TrackRef::Remote(url) => self.open_remote(track, url),
            TrackRef::Fixture => match &self.fixture {
                Some(path) => self.open_fixture(track, path),
                None => self.open_tone(track),
            },
        }
    }

    fn open_remote(&self, track: &TrackRef, url: &str) -> Result<OpenedTrack, JukeboxError> {
        let mut source = self
            .source
            .spawn(url)
            .map_err(|e| JukeboxError::pipeline(track, format!("{}: {}", self.source.binary(), e)))?;

        let stdout = match source.stdout.take() {
            Some(stdout) => stdout,
            None => {
                reap(&mut source);
                return Err(JukeboxError::pipeline(track, "yt-dlp sin stdout"));
            }
        };

        match self.transcoder.spawn(TranscodeInput::Pipe, Stdio::from(stdout)) {
            Ok(transcoder) => Ok(OpenedTrack {
                input: ChildContainer::from(transcoder),
                source: Some(source),
            }),
            Err(e) => {
                reap(&mut source);
                Err(JukeboxError::pipeline(
                    track,
                    format!("{}: {}", self.transcoder.binary(), e),
                ))
            }
        }
    }

    fn open_fixture(&self, track: &TrackRef, path: &Path) -> Result<OpenedTrack, JukeboxError> {
        if !path.exists() {
            return Err(JukeboxError::pipeline(
                track,
                format!("pista de prueba no encontrada: {}", path.display()),
            ));
        }

        self.open_local(track, TranscodeInput::File(path))
    }

    fn open_tone(&self, track: &TrackRef) -> Result<OpenedTrack, JukeboxError> {
        self.open_local(
            track,
            TranscodeInput::Tone {
                frequency: FIXTURE_TONE_HZ,
                seconds: FIXTURE_TONE_SECONDS,
            },
        )
    }

    fn open_local(&self, track: &TrackRef, input: TranscodeInput<'_>) -> Result<OpenedTrack, JukeboxError> {
        let transcoder = self
            .transcoder
            .spawn(input, Stdio::null())
            .map_err(|e| JukeboxError::pipeline(track, format!("{}: {}", self.transcoder.binary(), e)))?;

        Ok(OpenedTrack {
            input: ChildContainer::from(transcoder),
            source: None,
        })
    }

    /// Verifica que yt-dlp y ffmpeg estén disponibles
    pub async fn verify_dependencies(&self) -> Result<()> {
        self.source.verify().await?;
        self.transcoder.verify().await?;

        match &self.fixture {
            Some(path) if !path.exists() => warn!(
                "⚠️ Pista de prueba no encontrada en {} - '{}' fallará",
                path.display(),
                FIXTURE_TOKEN
            ),
            Some(path) => info!("✅ Pista de prueba: {}", path.display()),
            None => info!(
                "✅ '{}' reproduce un tono de {} Hz generado por ffmpeg",
                FIXTURE_TOKEN, FIXTURE_TONE_HZ
            ),
        }

        Ok(())
    }
}

/// Vigila el proceso de origen de una pista y publica cómo terminó. Si la
/// pista se detiene antes, el proceso se mata.
pub fn watch_source(mut child: Child, status: PipelineStatus) {
    tokio::spawn(async move {
        loop {
            match child.try_wait() {
                Ok(Some(exit)) if exit.success() => {
                    status.source_exited(SourceExit::Success);
                    return;
                }
                Ok(Some(exit)) => {
                    warn!("❌ yt-dlp terminó con error: {}", exit);
                    status.source_exited(SourceExit::Failed(format!("yt-dlp exited with {}", exit)));
                    return;
                }
                Ok(None) if status.is_stopped() => {
                    debug!("Pista detenida, terminando yt-dlp");
                    reap(&mut child);
                    status.source_exited(SourceExit::Success);
                    return;
                }
                Ok(None) => tokio::time::sleep(SOURCE_POLL_INTERVAL).await,
                Err(e) => {
                    warn!("No se pudo consultar el estado de yt-dlp: {}", e);
                    status.source_exited(SourceExit::Success);
                    return;
                }
            }
        }
    });
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Reenvía el stderr de un proceso hijo al log, línea por línea
pub(crate) fn forward_stderr(child: &mut Child, tool: &'static str) {
    if let Some(stderr) = child.stderr.take() {
        tokio::task::spawn_blocking(move || {
            for line in BufReader::new(stderr).lines().map_while(std::result::Result::ok) {
                if !line.trim().is_empty() {
                    warn!("[{}] {}", tool, line);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_track_ref_parse() {
        assert_eq!(TrackRef::parse("test"), TrackRef::Fixture);
        assert_eq!(TrackRef::parse(" test "), TrackRef::Fixture);
        assert_eq!(
            TrackRef::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            TrackRef::Remote("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string())
        );
        // Solo la palabra exacta selecciona la pista de prueba
        assert_eq!(TrackRef::parse("TEST"), TrackRef::Remote("TEST".to_string()));
    }

    #[test]
    fn test_track_ref_display() {
        assert_eq!(TrackRef::Fixture.to_string(), "test");
        assert_eq!(TrackRef::Remote("https://youtu.be/x".into()).to_string(), "https://youtu.be/x");
    }

    fn open_err(pipeline: &MediaPipeline, track: &TrackRef) -> JukeboxError {
        match pipeline.open(track) {
            Err(e) => e,
            Ok(_) => panic!("{} should not open", track),
        }
    }

    #[test]
    fn test_missing_fixture_is_pipeline_error() {
        let pipeline = MediaPipeline::new(
            YtDlp::new("yt-dlp", "bestaudio", None),
            Transcoder::new("ffmpeg"),
            Some(PathBuf::from("/nonexistent/fixture.mp3")),
        );

        let err = open_err(&pipeline, &TrackRef::Fixture);
        assert!(matches!(err, JukeboxError::Pipeline { .. }));
    }

    #[test]
    fn test_fixture_without_file_uses_generated_tone() {
        let pipeline = MediaPipeline::new(
            YtDlp::new("yt-dlp", "bestaudio", None),
            Transcoder::new("/nonexistent/ffmpeg-binary"),
            None,
        );

        // Sin archivo no se comprueba ninguna ruta: el error viene de lanzar ffmpeg
        let err = open_err(&pipeline, &TrackRef::Fixture);
        assert!(err.to_string().contains("/nonexistent/ffmpeg-binary"));
        assert!(!err.to_string().contains("no encontrada"));
    }

    #[test]
    fn test_missing_source_binary_is_pipeline_error() {
        let pipeline = MediaPipeline::new(
            YtDlp::new("/nonexistent/yt-dlp-binary", "bestaudio", None),
            Transcoder::new("ffmpeg"),
            None,
        );

        let err = open_err(&pipeline, &TrackRef::Remote("https://youtu.be/x".into()));
        assert!(err.to_string().contains("https://youtu.be/x"));
    }

    #[tokio::test]
    async fn test_failed_source_exit_is_reported() {
        let child = std::process::Command::new("sh")
            .args(["-c", "exit 3"])
            .spawn()
            .unwrap();

        let status = PipelineStatus::with_source();
        watch_source(child, status.clone());

        match status.outcome(Duration::from_secs(5)).await {
            crate::audio::transport::TrackOutcome::Failed(reason) => {
                assert!(reason.starts_with("yt-dlp exited with"), "{}", reason);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stopped_track_kills_source() {
        let child = std::process::Command::new("sh")
            .args(["-c", "sleep 30"])
            .spawn()
            .unwrap();

        let status = PipelineStatus::with_source();
        status.mark_stopped();
        watch_source(child, status.clone());

        // El proceso se mata en vez de esperar los 30 segundos
        for _ in 0..50 {
            if status.source_state() != SourceExit::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(status.source_state(), SourceExit::Success);
    }
}
