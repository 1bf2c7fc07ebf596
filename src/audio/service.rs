use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    player::PlaybackController,
    queue::RepeatMode,
    registry::GuildRegistry,
    voice::VoiceSessionManager,
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::{ResolveMode, ResolverPool, Track},
};

/// Resultado de un `enqueue` exitoso.
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub track: Track,
    /// Posición en la cola; `None` si el guild estaba libre y empezó a sonar.
    pub position: Option<usize>,
}

/// Vista de solo lectura de la cola de un guild.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub upcoming: Vec<Track>,
    pub total: usize,
    pub repeat: RepeatMode,
}

/// Operaciones de cola que usan los comandos.
pub struct QueueService {
    registry: Arc<GuildRegistry>,
    voice: Arc<VoiceSessionManager>,
    controller: Arc<PlaybackController>,
    resolver: ResolverPool,
}

impl QueueService {
    pub fn new(
        registry: Arc<GuildRegistry>,
        voice: Arc<VoiceSessionManager>,
        controller: Arc<PlaybackController>,
        resolver: ResolverPool,
    ) -> Self {
        Self {
            registry,
            voice,
            controller,
            resolver,
        }
    }

    /// Resuelve `query`, conecta al canal del usuario y agrega el track.
    ///
    /// Si falla la resolución la cola no cambia.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
        query: &str,
        mode: ResolveMode,
    ) -> PlaybackResult<Enqueued> {
        let channel_id = user_channel.ok_or(PlaybackError::NoUserChannel)?;

        let track = self.resolver.resolve(query, mode).await?;
        self.voice.ensure_connected(guild_id, channel_id).await?;

        let (was_idle, position) = self.registry.with_state(guild_id, |state| {
            let was_idle = !state.is_playing() && state.is_empty();
            state.push(track.clone()).map(|position| (was_idle, position))
        })?;

        self.controller.play_next(guild_id).await;

        Ok(Enqueued {
            track,
            position: (!was_idle).then_some(position),
        })
    }

    /// Aplica desde la próxima decisión; el track actual sigue sonando.
    pub fn set_repeat(&self, guild_id: GuildId, mode: RepeatMode) -> RepeatMode {
        self.registry.with_state(guild_id, |state| state.set_repeat(mode))
    }

    pub fn repeat(&self, guild_id: GuildId) -> RepeatMode {
        self.registry.with_state(guild_id, |state| state.repeat())
    }

    /// Salta el track actual. Sin reproducción es un no-op.
    pub async fn skip(&self, guild_id: GuildId) -> Option<Track> {
        let skipped = self.controller.skip(guild_id).await;
        if let Some(track) = &skipped {
            info!("⏭️ Saltado en guild {}: {}", guild_id, track.title());
        }
        skipped
    }

    /// Vacía cola y track actual. Idempotente.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        self.controller.stop(guild_id).await
    }

    pub fn peek(&self, guild_id: GuildId, n: usize) -> Vec<Track> {
        self.registry.with_state(guild_id, |state| state.peek(n))
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.registry.with_state(guild_id, |state| state.current().cloned())
    }

    pub fn snapshot(&self, guild_id: GuildId, n: usize) -> QueueSnapshot {
        self.registry.with_state(guild_id, |state| QueueSnapshot {
            current: state.current().cloned(),
            upcoming: state.peek(n),
            total: state.len(),
            repeat: state.repeat(),
        })
    }

    /// Detiene todo y sale del canal de voz. Devuelve `false` si no estaba conectado.
    pub async fn leave(&self, guild_id: GuildId) -> PlaybackResult<bool> {
        self.controller.stop(guild_id).await;
        self.voice.disconnect(guild_id).await
    }

    /// El bot fue movido a otro canal desde Discord.
    pub fn moved(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.voice.moved(guild_id, channel_id);
    }

    /// El bot fue sacado de voz desde fuera (kick, canal borrado).
    pub async fn connection_lost(&self, guild_id: GuildId) {
        if !self.voice.is_connected(guild_id) {
            return;
        }

        warn!("🔌 Conexión de voz perdida en guild {}", guild_id);
        self.controller.stop(guild_id).await;
        self.voice.forget(guild_id);
    }
}
