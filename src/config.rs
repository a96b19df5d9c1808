use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    #[serde(skip_serializing)]
    pub discord_token: String,
    pub command_prefix: String,

    // Cola
    pub max_queue_size: usize,

    // Pipeline de audio
    pub ytdlp_path: String,
    pub ytdlp_format: String,
    pub cookies_file: Option<PathBuf>,
    pub ffmpeg_path: String,
    pub fixture_path: Option<PathBuf>, // None = tono generado

    // Límites
    pub track_start_timeout: Duration,
    pub max_track_duration: Option<Duration>, // None = sin límite
}

impl Config {
    /// Carga la configuración desde el entorno (y `.env` si existe).
    /// Falla si `DISCORD_TOKEN` falta o está vacío.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de variables.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let discord_token = var("DISCORD_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .context("DISCORD_TOKEN no está definido")?;

        let config = Self {
            discord_token,
            command_prefix: var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            max_queue_size: match var("MAX_QUEUE_SIZE") {
                Some(val) => val.parse().context("MAX_QUEUE_SIZE inválido")?,
                None => defaults.max_queue_size,
            },

            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_format: var("YTDLP_FORMAT").unwrap_or(defaults.ytdlp_format),
            cookies_file: var("YTDLP_COOKIES")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            ffmpeg_path: var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            fixture_path: var("FIXTURE_TRACK")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .or(defaults.fixture_path),

            track_start_timeout: match var("TRACK_START_TIMEOUT") {
                Some(val) => humantime::parse_duration(val.trim())
                    .context("TRACK_START_TIMEOUT inválido")?,
                None => defaults.track_start_timeout,
            },
            max_track_duration: match var("MAX_TRACK_DURATION") {
                Some(val) if val.trim() == "0" => None,
                Some(val) => Some(
                    humantime::parse_duration(val.trim()).context("MAX_TRACK_DURATION inválido")?,
                ),
                None => defaults.max_track_duration,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The command prefix must not be empty or contain whitespace
    /// - Queue size must be greater than 0
    /// - Start timeout must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.is_empty() || self.command_prefix.contains(char::is_whitespace) {
            anyhow::bail!("Command prefix must be non-empty without spaces, got: {:?}", self.command_prefix);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.track_start_timeout.is_zero() {
            anyhow::bail!("Track start timeout must be greater than 0");
        }

        if matches!(self.max_track_duration, Some(d) if d.is_zero()) {
            anyhow::bail!("Max track duration must be greater than 0 (use 0 to disable)");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Queue: max {} tracks\n  \
            Pipeline: {} -f {} | {} (cookies: {})\n  \
            Fixture: {}\n  \
            Limits: start timeout {}, max duration {}",
            self.command_prefix,
            self.max_queue_size,
            self.ytdlp_path,
            self.ytdlp_format,
            self.ffmpeg_path,
            self.cookies_file
                .as_ref()
                .map_or("auto".to_string(), |p| p.display().to_string()),
            self.fixture_path
                .as_ref()
                .map_or("generated tone".to_string(), |p| p.display().to_string()),
            humantime::format_duration(self.track_start_timeout),
            self.max_track_duration
                .map_or("off".to_string(), |d| humantime::format_duration(d).to_string()),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            max_queue_size: 1000,

            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_format: "bestaudio".to_string(),
            cookies_file: None,
            ffmpeg_path: "ffmpeg".to_string(),
            fixture_path: None,

            track_start_timeout: Duration::from_secs(30),
            max_track_duration: Some(Duration::from_secs(7200)), // 2 horas
        }
    }
}
