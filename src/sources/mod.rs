//! # Sources Module
//!
//! Turns a user query into a playable [`Track`].
//!
//! Resolution is blocking and network bound (it shells out to `yt-dlp`), so
//! callers never invoke a [`MetadataResolver`] directly from the async
//! scheduler: they go through [`ResolverPool`], which runs each call on the
//! blocking thread pool and caps how many run at once.

pub mod ytdlp;

use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

use crate::error::{ExtractionError, PlaybackError, PlaybackResult};

pub use ytdlp::YtDlpResolver;

/// Unidad reproducible ya resuelta. Inmutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    url: String,
    stream_url: String,
    duration: Option<Duration>,
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            stream_url: stream_url.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    /// URL efímera; solo la usa la sesión de voz.
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

/// Cómo interpretar la consulta del usuario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    #[default]
    Auto,
    SoundCloud,
    Direct,
}

impl ResolveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveMode::Auto => "auto",
            ResolveMode::SoundCloud => "soundcloud",
            ResolveMode::Direct => "direct",
        }
    }
}

impl fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "youtube" => Ok(ResolveMode::Auto),
            "soundcloud" => Ok(ResolveMode::SoundCloud),
            "direct" => Ok(ResolveMode::Direct),
            other => Err(format!("modo de búsqueda desconocido: {other}")),
        }
    }
}

/// Lo que finalmente se le pasa al backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Url(String),
    Search { provider: &'static str, term: String },
}

impl Target {
    /// Argumento posicional para yt-dlp (`ytsearch1:...`, `scsearch1:...` o la URL).
    pub fn to_argument(&self) -> String {
        match self {
            Target::Url(url) => url.clone(),
            Target::Search { provider, term } => format!("{provider}1:{term}"),
        }
    }
}

/// `true` si la consulta es una URL http(s) bien formada.
pub fn is_url(query: &str) -> bool {
    Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// Clasifica la consulta según el modo. `Direct` solo acepta URLs.
pub fn classify(query: &str, mode: ResolveMode) -> PlaybackResult<Target> {
    let query = query.trim();

    if is_url(query) {
        return Ok(Target::Url(query.to_string()));
    }

    match mode {
        _ if query.is_empty() => Err(PlaybackError::InvalidQuery(query.to_string())),
        ResolveMode::Direct => Err(PlaybackError::InvalidQuery(query.to_string())),
        ResolveMode::Auto => Ok(Target::Search {
            provider: "ytsearch",
            term: query.to_string(),
        }),
        ResolveMode::SoundCloud => Ok(Target::Search {
            provider: "scsearch",
            term: query.to_string(),
        }),
    }
}

/// Contrato del resolvedor externo. Bloqueante: usar siempre vía [`ResolverPool`].
#[cfg_attr(test, mockall::automock)]
pub trait MetadataResolver: Send + Sync {
    fn resolve(&self, query: &str, mode: ResolveMode) -> PlaybackResult<Track>;
}

/// Ejecuta resoluciones fuera del scheduler, con un máximo de `workers` simultáneas.
#[derive(Clone)]
pub struct ResolverPool {
    resolver: Arc<dyn MetadataResolver>,
    permits: Arc<Semaphore>,
}

impl ResolverPool {
    pub fn new(resolver: Arc<dyn MetadataResolver>, workers: usize) -> Self {
        Self {
            resolver,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn resolve(&self, query: &str, mode: ResolveMode) -> PlaybackResult<Track> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ExtractionError::Backend("pool de resolución cerrado".to_string()))?;

        debug!("🔍 Resolviendo `{}` (modo {})", query, mode);

        // El permiso vive con la tarea bloqueante, aunque el llamador se cancele
        let resolver = Arc::clone(&self.resolver);
        let query = query.to_owned();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            resolver.resolve(&query, mode)
        })
        .await
            .map_err(|e| ExtractionError::Backend(format!("worker abortado: {e}")))?
    }
}
