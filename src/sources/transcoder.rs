use anyhow::Result;
use std::{
    path::Path,
    process::{Child, Command, Stdio},
};
use tracing::{debug, error, info};

/// Formato de salida: PCM s16le, 48kHz, estéreo
pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;

/// Entrada del transcoder
#[derive(Debug, Clone, Copy)]
pub enum TranscodeInput<'a> {
    /// stdin, normalmente el stdout de yt-dlp
    Pipe,
    /// Archivo local (pista de prueba)
    File(&'a Path),
    /// Tono generado por ffmpeg, para probar sin archivos
    Tone { frequency: u32, seconds: u32 },
}

/// Normaliza cualquier stream de audio a PCM usando ffmpeg
#[derive(Debug, Clone)]
pub struct Transcoder {
    binary: String,
}

impl Transcoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn args(&self, input: TranscodeInput<'_>) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];

        match input {
            TranscodeInput::Pipe => args.extend(["-i".to_string(), "pipe:0".to_string()]),
            TranscodeInput::File(path) => args.extend(["-i".to_string(), path.display().to_string()]),
            TranscodeInput::Tone { frequency, seconds } => args.extend([
                "-f".to_string(),
                "lavfi".to_string(),
                "-i".to_string(),
                format!("sine=frequency={}:duration={}", frequency, seconds),
            ]),
        }

        // PCM dentro de un contenedor WAV para que symphonia pueda detectar el formato
        args.extend([
            "-vn".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ar".to_string(),
            SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            CHANNELS.to_string(),
            "-f".to_string(),
            "wav".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }

    pub fn spawn(&self, input: TranscodeInput<'_>, stdin: Stdio) -> std::io::Result<Child> {
        debug!("🚀 {} {:?}", self.binary, self.args(input));

        let mut child = Command::new(&self.binary)
            .args(self.args(input))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        super::forward_stderr(&mut child, "ffmpeg");
        Ok(child)
    }

    /// Verifica que ffmpeg esté disponible
    pub async fn verify(&self) -> Result<()> {
        let check = tokio::process::Command::new(&self.binary)
            .arg("-version")
            .output()
            .await;

        match check {
            Ok(output) if output.status.success() => {
                info!("✅ ffmpeg disponible");
                Ok(())
            }
            _ => {
                error!("❌ ffmpeg no encontrado. Instala con: sudo apt install ffmpeg");
                anyhow::bail!("ffmpeg no disponible ({})", self.binary);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let pos = args.iter().position(|a| a == flag).unwrap();
        &args[pos + 1]
    }

    #[test]
    fn test_output_is_48k_stereo_s16le() {
        let args = Transcoder::new("ffmpeg").args(TranscodeInput::Pipe);

        assert_eq!(value_after(&args, "-acodec"), "pcm_s16le");
        assert_eq!(value_after(&args, "-ar"), "48000");
        assert_eq!(value_after(&args, "-ac"), "2");
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn test_input_source() {
        let transcoder = Transcoder::new("ffmpeg");

        let piped = transcoder.args(TranscodeInput::Pipe);
        assert_eq!(value_after(&piped, "-i"), "pipe:0");

        let file = transcoder.args(TranscodeInput::File(Path::new("assets/test.mp3")));
        assert_eq!(value_after(&file, "-i"), "assets/test.mp3");
    }

    #[test]
    fn test_tone_uses_lavfi_sine() {
        let args = Transcoder::new("ffmpeg").args(TranscodeInput::Tone {
            frequency: 440,
            seconds: 5,
        });

        assert_eq!(value_after(&args, "-f"), "lavfi");
        assert_eq!(value_after(&args, "-i"), "sine=frequency=440:duration=5");
        assert_eq!(value_after(&args, "-acodec"), "pcm_s16le");
        // El formato de salida sigue siendo WAV
        let output_format = args.iter().rposition(|a| a == "-f").unwrap();
        assert_eq!(args[output_format + 1], "wav");
    }
}
