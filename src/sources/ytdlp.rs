use anyhow::Result;
use std::{
    path::PathBuf,
    process::{Child, Command, Stdio},
};
use tracing::{debug, error, info, warn};

/// Adaptador de origen: `yt-dlp` escribiendo el mejor audio disponible en stdout
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    format: String,
    cookies: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, format: impl Into<String>, cookies: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            format: format.into(),
            cookies,
        }
    }

    /// Usa el archivo de cookies configurado o, si no hay, el primero que exista
    pub fn with_default_cookies(mut self) -> Self {
        if self.cookies.is_none() {
            self.cookies = find_cookies_file();
        }
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Argumentos para descargar `url` como stream de audio por stdout
    pub fn args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.format.clone(),
            "--no-playlist".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
        ];

        if let Some(cookies) = &self.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }

        // "--" evita que una URL que empiece por '-' se lea como opción
        args.extend(["-o".to_string(), "-".to_string(), "--".to_string(), url.to_string()]);
        args
    }

    /// Lanza el proceso; el stdout queda disponible para el transcoder
    pub fn spawn(&self, url: &str) -> std::io::Result<Child> {
        debug!("🚀 {} {:?}", self.binary, self.args(url));

        let mut child = Command::new(&self.binary)
            .args(self.args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        super::forward_stderr(&mut child, "yt-dlp");
        Ok(child)
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify(&self) -> Result<()> {
        let check = tokio::process::Command::new(&self.binary)
            .arg("--version")
            .output()
            .await;

        match check {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
                Ok(())
            }
            _ => {
                error!("❌ yt-dlp no encontrado. Instala con: pip install yt-dlp");
                anyhow::bail!("yt-dlp no disponible ({})", self.binary);
            }
        }
    }
}

/// Busca archivo de cookies disponible
fn find_cookies_file() -> Option<PathBuf> {
    let cookies_paths = [
        format!("{}/.config/yt-dlp/cookies.txt", std::env::var("HOME").unwrap_or_default()),
        "/app/.config/yt-dlp/cookies.txt".to_string(),
        "./cookies.txt".to_string(),
    ];

    for path in cookies_paths {
        if std::path::Path::new(&path).exists() {
            info!("🍪 Cookies encontradas en: {}", path);
            return Some(PathBuf::from(path));
        }
    }

    warn!("🍪 No se encontraron cookies - algunos videos pueden fallar");
    None
}
