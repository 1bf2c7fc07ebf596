use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{queue::RepeatMode, service::QueueSnapshot},
    sources::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Jukebox Bot";

fn duration_field(track: &Track) -> String {
    match track.duration() {
        Some(duration) => format_duration(duration),
        None => "🔴 En vivo".to_string(),
    }
}

fn repeat_icon(mode: RepeatMode) -> &'static str {
    match mode {
        RepeatMode::Off => "▶️",
        RepeatMode::One => "🔂",
        RepeatMode::All => "🔁",
    }
}

pub fn create_now_playing_embed(track: &Track, repeat: RepeatMode) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .url(track.url())
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Duración", duration_field(track), true)
        .field(format!("{} Repetición", repeat_icon(repeat)), repeat.as_str(), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// `position` es `None` cuando el track empezó a sonar de inmediato.
pub fn create_track_added_embed(track: &Track, position: Option<usize>) -> CreateEmbed {
    let (title, footer) = match position {
        None => ("🎵 Reproduciendo Ahora".to_string(), STANDARD_FOOTER.to_string()),
        Some(position) => (
            "✅ Canción Agregada".to_string(),
            format!("📋 Posición en cola: {}", position),
        ),
    };

    CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title()))
        .url(track.url())
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_field(track), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

pub fn create_queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.total == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut embed = embed;
    if let Some(current) = &snapshot.current {
        embed = embed.field(
            format!("{} Reproduciendo", repeat_icon(snapshot.repeat)),
            format!("**{}**", current.title()),
            false,
        );
    }

    if !snapshot.upcoming.is_empty() {
        let mut description = String::new();
        for (i, track) in snapshot.upcoming.iter().enumerate() {
            let duration = track
                .duration()
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();
            description.push_str(&format!("**{}**. {}{}\n", i + 1, track.title(), duration));
        }
        embed = embed.field("Próximas canciones", description, false);
    }

    let mut info = format!("**Total:** {} canciones", snapshot.total);
    if snapshot.total > snapshot.upcoming.len() {
        info.push_str(&format!(" • {} más", snapshot.total - snapshot.upcoming.len()));
    }
    info.push_str(&format!(" • **Repetición:** {}", snapshot.repeat));

    embed
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formato corto (`3:05`, `1:02:03`); los milisegundos se descartan.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
