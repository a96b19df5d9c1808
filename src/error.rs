//! Errores del controlador de colas y del pipeline de audio.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JukeboxError {
    // Transporte de voz
    #[error("Could not join voice channel: {message}")]
    Join { message: String },

    // yt-dlp / ffmpeg
    #[error("Audio pipeline failed for {track}: {message}")]
    Pipeline { track: String, message: String },

    // Errores del usuario
    #[error("The queue is full (max {max})")]
    QueueFull { max: usize },

    #[error("Nothing playing")]
    NothingPlaying,

    #[error("Nothing to stop")]
    NothingToStop,
}

impl JukeboxError {
    pub fn pipeline(track: impl ToString, message: impl ToString) -> Self {
        Self::Pipeline {
            track: track.to_string(),
            message: message.to_string(),
        }
    }

    /// Errores causados por el comando del usuario y no por el bot.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. } | Self::NothingPlaying | Self::NothingToStop
        )
    }
}
