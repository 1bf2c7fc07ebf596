use serenity::model::id::ChannelId;
use thiserror::Error;

/// Fallos del resolvedor de metadata (yt-dlp u otro backend).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no se encontraron resultados para `{0}`")]
    NoResults(String),

    #[error("el backend de extracción falló: {0}")]
    Backend(String),

    #[error("fuente no válida: {0}")]
    InvalidSource(String),
}

/// Errores visibles para el usuario. Ninguno es fatal para el estado del guild.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("`{0}` no es una URL válida")]
    InvalidQuery(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("debes estar en un canal de voz")]
    NoUserChannel,

    #[error("sin permiso para conectar a <#{0}>")]
    Forbidden(ChannelId),

    #[error("el bot no está conectado a voz")]
    NotConnected,

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("error de conexión de voz: {0}")]
    Voice(String),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;
