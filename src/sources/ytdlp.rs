use serde::Deserialize;
use std::{process::Command, time::Duration};
use tracing::{debug, info, warn};

use super::{classify, MetadataResolver, ResolveMode, Target, Track};
use crate::error::{ExtractionError, PlaybackResult};

/// Información extraída de yt-dlp (`--dump-single-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    /// URL del formato seleccionado con `-f`
    url: Option<String>,
    duration: Option<f64>,
    entries: Option<Vec<YtDlpInfo>>,
}

/// Resolvedor que invoca el binario `yt-dlp` de forma bloqueante.
pub struct YtDlpResolver {
    binary: String,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn run(&self, target: &Target) -> PlaybackResult<String> {
        let output = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "--dump-single-json",
                "--format",
                "bestaudio/best",
                "--socket-timeout",
                "30",
                "--no-warnings",
            ])
            .arg(target.to_argument())
            .output()
            .map_err(|e| ExtractionError::Backend(format!("no se pudo ejecutar {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp terminó con {}: {}", output.status, stderr.trim());
            return Err(classify_failure(&stderr).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MetadataResolver for YtDlpResolver {
    fn resolve(&self, query: &str, mode: ResolveMode) -> PlaybackResult<Track> {
        // Validar antes de lanzar el proceso
        let target = classify(query, mode)?;
        let stdout = self.run(&target)?;
        let track = parse_output(&stdout, &target)?;

        info!("✅ Resuelto: {} ({})", track.title(), track.url());
        Ok(track)
    }
}

/// Convierte la salida JSON de yt-dlp en un [`Track`].
fn parse_output(stdout: &str, target: &Target) -> PlaybackResult<Track> {
    let mut info: YtDlpInfo = serde_json::from_str(stdout.trim())
        .map_err(|e| ExtractionError::Backend(format!("respuesta de yt-dlp ilegible: {e}")))?;

    // Las búsquedas devuelven una playlist; se toma el primer resultado
    let info = match info.entries.take() {
        Some(entries) => entries.into_iter().next().ok_or_else(|| match target {
            Target::Search { term, .. } => ExtractionError::NoResults(term.clone()),
            Target::Url(url) => ExtractionError::NoResults(url.clone()),
        })?,
        None => info,
    };

    let stream_url = info
        .url
        .ok_or_else(|| ExtractionError::InvalidSource("sin formato de audio reproducible".to_string()))?;

    let url = info
        .webpage_url
        .or(info.original_url)
        .unwrap_or_else(|| match target {
            Target::Url(url) => url.clone(),
            Target::Search { .. } => stream_url.clone(),
        });
    let title = info.title.unwrap_or_else(|| url.clone());

    let duration = info
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|secs| Duration::from_secs(secs.round() as u64));

    match duration {
        Some(d) => debug!("🎵 Stream obtenido para: {} ({})", title, humantime::format_duration(d)),
        None => debug!("🎵 Stream obtenido para: {} (en vivo)", title),
    }

    let track = Track::new(title, url, stream_url);
    Ok(match duration {
        Some(d) => track.with_duration(d),
        None => track,
    })
}

fn classify_failure(stderr: &str) -> ExtractionError {
    let lower = stderr.to_lowercase();
    let first_line = stderr
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("sin salida")
        .trim()
        .to_string();

    if lower.contains("unsupported url")
        || lower.contains("is not a valid url")
        || lower.contains("video unavailable")
        || lower.contains("private video")
    {
        ExtractionError::InvalidSource(first_line)
    } else {
        ExtractionError::Backend(first_line)
    }
}
