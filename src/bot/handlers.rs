use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{
        queue::RepeatMode,
        service::{Enqueued, QueueService},
    },
    error::{PlaybackError, PlaybackResult},
    sources::ResolveMode,
    ui::embeds,
};

/// Canciones listadas por `/queue`
const QUEUE_PAGE: usize = 10;

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, queue: &QueueService) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(ctx, &command, "❌ Este comando solo funciona en servidores", true).await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, queue, guild_id).await,
        "skip" => handle_skip(ctx, &command, queue, guild_id).await,
        "stop" => handle_stop(ctx, &command, queue, guild_id).await,
        "repeat" => handle_repeat(ctx, &command, queue, guild_id).await,
        "queue" => handle_queue(ctx, &command, queue, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, &command, queue, guild_id).await,
        "leave" => handle_leave(ctx, &command, queue, guild_id).await,
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await,
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    queue: &QueueService,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query").unwrap_or_default();
    let mode = match string_option(command, "mode") {
        Some(raw) => match raw.parse::<ResolveMode>() {
            Ok(mode) => mode,
            Err(e) => return reply(ctx, command, &format!("❌ {}", e), true).await,
        },
        None => ResolveMode::default(),
    };

    // La resolución puede tardar más que la ventana de respuesta
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let user_channel = get_user_voice_channel(ctx, guild_id, command.user.id);
    let result = queue.enqueue(guild_id, user_channel, query, mode).await;
    if let Err(e) = &result {
        warn!("⚠️ /play falló en guild {}: {}", guild_id, e);
    }

    match play_reply(result) {
        PlayReply::Public(embed) => {
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
        }
        // El defer es público: se retira y el error va en un follow-up efímero
        PlayReply::Private(embed) => {
            command.delete_response(&ctx.http).await?;
            command
                .create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new().embed(embed).ephemeral(true),
                )
                .await?;
        }
    }
    Ok(())
}

/// Respuesta a `/play`: el éxito se anuncia al canal, el error solo al usuario.
enum PlayReply {
    Public(CreateEmbed),
    Private(CreateEmbed),
}

fn play_reply(result: PlaybackResult<Enqueued>) -> PlayReply {
    match result {
        Ok(queued) => PlayReply::Public(embeds::create_track_added_embed(&queued.track, queued.position)),
        Err(e) => PlayReply::Private(embeds::create_error_embed(&user_message(&e))),
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    queue: &QueueService,
    guild_id: GuildId,
) -> Result<()> {
    match queue.skip(guild_id).await {
        Some(track) => reply(ctx, command, &format!("⏭️ Saltada: **{}**", track.title()), false).await,
        None => reply(ctx, command, "💤 No hay nada reproduciéndose", true).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    queue: &QueueService,
    guild_id: GuildId,
) -> Result<()> {
    queue.stop(guild_id).await;
    reply(ctx, command, "⏹️ Reproducción detenida y cola limpiada", false).await
}

async fn handle_repeat(
    ctx: &Context,
    command: &CommandInteraction,
    queue: &QueueService,
    guild_id: GuildId,
) -> Result<()> {
    let mode = match string_option(command, "mode").map(str::parse::<RepeatMode>) {
        Some(Ok(mode)) => mode,
        Some(Err(e)) => return reply(ctx, command, &format!("❌ {}", e), true).await,
        None => RepeatMode::Off,
    };

    queue.set_repeat(guild_id, mode);

    let message = match mode {
        RepeatMode::Off => "➡️ Repetición desactivada",
        RepeatMode::One => "🔂 Repitiendo la canción actual",
        RepeatMode::All => "🔁 Repitiendo toda la cola",
    };
    reply(ctx, command, message, false).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    queue: &QueueService,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = queue.snapshot(guild_id, QUEUE_PAGE);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::create_queue_embed(&snapshot)),
            ),
        )
        .await?;
    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    queue: &QueueService,
    guild_id: GuildId,
) -> Result<()> {
    let Some(current) = queue.now_playing(guild_id) else {
        return reply(ctx, command, "❌ No hay nada reproduciéndose actualmente", true).await;
    };

    let embed = embeds::create_now_playing_embed(&current, queue.repeat(guild_id));
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    queue: &QueueService,
    guild_id: GuildId,
) -> Result<()> {
    match queue.leave(guild_id).await {
        Ok(true) => reply(ctx, command, "👋 Desconectado del canal de voz", false).await,
        Ok(false) => reply(ctx, command, "💤 No estoy en un canal de voz", true).await,
        Err(e) => reply(ctx, command, &format!("❌ {}", user_message(&e)), true).await,
    }
}

/// Respuesta simple; las de error son efímeras.
async fn reply(ctx: &Context, command: &CommandInteraction, content: &str, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Texto para el usuario a partir del error de dominio.
fn user_message(error: &PlaybackError) -> String {
    match error {
        PlaybackError::InvalidQuery(_) => {
            format!("{}. En modo `direct` solo se aceptan URLs http(s)", error)
        }
        PlaybackError::NoUserChannel => "🔇 Debes estar en un canal de voz para usar este comando".to_string(),
        _ => error.to_string(),
    }
}
