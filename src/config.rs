use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    #[serde(default)]
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Resolución de metadata
    pub resolver_workers: usize,
    pub ytdlp_path: String,
}

impl Config {
    /// Carga la configuración desde `.env` y variables de entorno.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let settings = config::Config::builder()
            .set_default("default_volume", f64::from(defaults.default_volume))?
            .set_default("max_queue_size", defaults.max_queue_size as i64)?
            .set_default("resolver_workers", defaults.resolver_workers as i64)?
            .set_default("ytdlp_path", defaults.ytdlp_path)?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size and worker count must be greater than 0
    /// - Token and application id must be present
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN is required");
        }

        if self.application_id == 0 {
            anyhow::bail!("APPLICATION_ID is required");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.resolver_workers == 0 {
            anyhow::bail!("Resolver workers must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} max queue\n  \
            Resolver: {} workers via `{}`",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.resolver_workers,
            self.ytdlp_path,
        )
    }
}

/// Valores por defecto cuando no hay variable de entorno.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 1000,

            resolver_workers: num_cpus::get(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
