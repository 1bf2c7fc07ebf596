use async_trait::async_trait;
use serenity::{
    all::Permissions,
    cache::Cache,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    error::JoinError,
    input::HttpRequest,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, warn};

use super::{
    queue::StreamOutcome,
    voice::{CompletionNotifier, StreamControl, VoiceDriver},
};
use crate::error::{PlaybackError, PlaybackResult};

/// Driver de voz sobre Songbird.
pub struct SongbirdDriver {
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdDriver {
    pub fn new(manager: Arc<Songbird>, cache: Arc<Cache>, volume: f32) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            manager,
            cache,
            http,
            volume,
        })
    }

    /// Consulta el cache; si falta información se deja decidir al gateway.
    fn can_connect(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let bot_id = self.cache.current_user().id;
        let Some(guild) = self.cache.guild(guild_id) else {
            return true;
        };
        let (Some(channel), Some(member)) = (guild.channels.get(&channel_id), guild.members.get(&bot_id))
        else {
            return true;
        };

        guild
            .user_permissions_in(channel, member)
            .contains(Permissions::CONNECT | Permissions::SPEAK)
    }
}

#[async_trait]
impl VoiceDriver for SongbirdDriver {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<()> {
        if !self.can_connect(guild_id, channel_id) {
            return Err(PlaybackError::Forbidden(channel_id));
        }

        match self.manager.join(guild_id, channel_id).await {
            Ok(_call) => Ok(()),
            Err(e) => {
                error!("Error al conectar al canal de voz {}: {:?}", channel_id, e);
                let _ = self.manager.remove(guild_id).await;
                Err(PlaybackError::Voice(e.to_string()))
            }
        }
    }

    async fn disconnect(&self, guild_id: GuildId) -> PlaybackResult<()> {
        match self.manager.remove(guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(PlaybackError::Voice(e.to_string())),
        }
    }

    async fn play(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        on_complete: CompletionNotifier,
    ) -> PlaybackResult<Box<dyn StreamControl>> {
        let call = self.manager.get(guild_id).ok_or(PlaybackError::NotConnected)?;

        let input = HttpRequest::new(self.http.clone(), stream_url.to_string());
        let handle = call.lock().await.play_input(input.into());

        if let Err(e) = handle.set_volume(self.volume) {
            warn!("⚠️ No se pudo ajustar el volumen: {:?}", e);
        }

        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), on_complete.clone()) {
                let _ = handle.stop();
                return Err(PlaybackError::Voice(format!("no se pudo registrar el evento: {e}")));
            }
        }

        Ok(Box::new(handle))
    }
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(tracks) => match tracks.first().map(|(state, _)| &state.playing) {
                Some(PlayMode::Errored(e)) => {
                    error!("❌ Error en stream {}: {:?}", self.ticket(), e);
                    StreamOutcome::Failed
                }
                Some(PlayMode::Stop) => StreamOutcome::Stopped,
                _ => StreamOutcome::Finished,
            },
            _ => StreamOutcome::Finished,
        };

        if self.notify(outcome) {
            debug!("🎵 Stream {} terminó: {:?}", self.ticket(), outcome);
        }
        None
    }
}

impl StreamControl for TrackHandle {
    fn stop(&self) {
        if let Err(e) = TrackHandle::stop(self) {
            // El track ya terminó; su evento de fin ya fue entregado
            debug!("Stop sobre un track finalizado: {:?}", e);
        }
    }
}
