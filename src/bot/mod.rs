//! # Bot Module
//!
//! Discord gateway handler for the jukebox bot.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Command dispatch and replies ([`handlers`])
//! - Voice state tracking, so a kicked bot does not keep a stale session
//!
//! All playback logic lives behind [`QueueService`]; the handler only turns
//! interactions into service calls and renders the result.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{error, info};

pub mod commands;
pub mod handlers;

use crate::{audio::service::QueueService, config::Config};

impl TypeMapKey for QueueService {
    type Value = Arc<QueueService>;
}

/// El servicio se inserta en `client.data` al arrancar: el driver de voz
/// necesita el cache del cliente ya construido.
async fn queue_service(ctx: &Context) -> Option<Arc<QueueService>> {
    ctx.data.read().await.get::<QueueService>().cloned()
}

/// Handler de eventos de Discord.
pub struct JukeboxBot {
    config: Arc<Config>,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Registra comandos en el guild de desarrollo si está configurado, si no globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("📝 Registrando comandos en guild {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await
            }
            None => {
                info!("📝 Registrando comandos globales");
                commands::register_global_commands(ctx).await
            }
        }
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        let Some(queue) = queue_service(&ctx).await else {
            error!("❌ Servicio de cola no inicializado");
            return;
        };

        if let Err(e) = handlers::handle_command(&ctx, command, &queue).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    /// Sigue al bot cuando lo sacan o lo mueven de canal desde fuera.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }
        let (Some(guild_id), Some(queue)) = (new.guild_id, queue_service(&ctx).await) else {
            return;
        };

        match new.channel_id {
            Some(channel_id) => queue.moved(guild_id, channel_id),
            None => queue.connection_lost(guild_id).await,
        }
    }
}
