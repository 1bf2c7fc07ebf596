use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::queue::{StreamOutcome, StreamTicket};
use crate::error::PlaybackResult;

/// Fin de un stream, tal como llega al controlador.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamEnded {
    pub guild_id: GuildId,
    pub ticket: StreamTicket,
    pub outcome: StreamOutcome,
}

/// Callback de finalización de un stream.
///
/// Lo invoca el subsistema de audio desde su propio contexto de ejecución.
/// No toca estado del guild: solo envía un [`StreamEnded`] por el canal del
/// controlador. Los clones comparten el flag, así que solo la primera
/// notificación se entrega.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    guild_id: GuildId,
    ticket: StreamTicket,
    fired: Arc<AtomicBool>,
    sender: flume::Sender<StreamEnded>,
}

impl CompletionNotifier {
    pub fn new(guild_id: GuildId, ticket: StreamTicket, sender: flume::Sender<StreamEnded>) -> Self {
        Self {
            guild_id,
            ticket,
            fired: Arc::new(AtomicBool::new(false)),
            sender,
        }
    }

    pub fn ticket(&self) -> StreamTicket {
        self.ticket
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Entrega el fin del stream. Devuelve `false` si ya se había notificado.
    pub fn notify(&self, outcome: StreamOutcome) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }

        let event = StreamEnded {
            guild_id: self.guild_id,
            ticket: self.ticket,
            outcome,
        };
        if self.sender.send(event).is_err() {
            warn!("⚠️ Controlador detenido, fin de stream {} descartado", self.ticket);
        }
        true
    }
}

/// Control de un stream en curso.
pub trait StreamControl: Send + Sync {
    /// Pide detener el stream; el driver notificará el fin por el callback.
    fn stop(&self);
}

/// Primitivas de voz del backend (Songbird en producción).
#[async_trait]
pub trait VoiceDriver: Send + Sync {
    /// Conecta o mueve el bot a `channel_id`.
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<()>;

    async fn disconnect(&self, guild_id: GuildId) -> PlaybackResult<()>;

    /// Empieza a reproducir `stream_url`. Si devuelve `Ok`, el driver llamará
    /// `on_complete` cuando el stream termine (fin natural, stop o error).
    async fn play(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        on_complete: CompletionNotifier,
    ) -> PlaybackResult<Box<dyn StreamControl>>;
}

struct ActiveStream {
    ticket: StreamTicket,
    control: Box<dyn StreamControl>,
}

/// Conexión de voz de un guild.
struct VoiceSession {
    channel_id: ChannelId,
    stream: Option<ActiveStream>,
}

/// Dueño exclusivo de las sesiones de voz por guild.
pub struct VoiceSessionManager {
    driver: Arc<dyn VoiceDriver>,
    sessions: DashMap<GuildId, VoiceSession>,
    /// Serializa join y registro de la sesión dentro de cada guild
    joins: DashMap<GuildId, Arc<AsyncMutex<()>>>,
}

impl VoiceSessionManager {
    pub fn new(driver: Arc<dyn VoiceDriver>) -> Self {
        Self {
            driver,
            sessions: DashMap::new(),
            joins: DashMap::new(),
        }
    }

    /// Conecta, mueve o no hace nada según el canal actual.
    pub async fn ensure_connected(&self, guild_id: GuildId, requested: ChannelId) -> PlaybackResult<()> {
        let join = self.joins.entry(guild_id).or_default().clone();
        let _join = join.lock().await;

        let current = self.current_channel(guild_id);
        if current == Some(requested) {
            return Ok(());
        }

        self.driver.connect(guild_id, requested).await?;

        match self.sessions.get_mut(&guild_id) {
            Some(mut session) => {
                session.channel_id = requested;
                info!("🔀 Movido al canal {} en guild {}", requested, guild_id);
            }
            None => {
                self.sessions.insert(
                    guild_id,
                    VoiceSession {
                        channel_id: requested,
                        stream: None,
                    },
                );
                info!("🔊 Conectado al canal de voz {} en guild {}", requested, guild_id);
            }
        }
        Ok(())
    }

    /// Arranca un stream. `on_complete` se invoca exactamente una vez, también
    /// si el arranque falla.
    pub async fn start_stream(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        on_complete: CompletionNotifier,
    ) {
        if !self.is_connected(guild_id) {
            warn!("🔇 Sin sesión de voz en guild {}, stream {} descartado", guild_id, on_complete.ticket());
            on_complete.notify(StreamOutcome::Failed);
            return;
        }

        let control = match self.driver.play(guild_id, stream_url, on_complete.clone()).await {
            Ok(control) => control,
            Err(e) => {
                error!("❌ No se pudo iniciar el stream en guild {}: {}", guild_id, e);
                on_complete.notify(StreamOutcome::Failed);
                return;
            }
        };

        // Se comprueba `has_fired` con la entrada bloqueada: `clear_stream`
        // necesita la misma entrada, así que nunca queda un handle huérfano.
        match self.sessions.get_mut(&guild_id) {
            Some(mut session) if !on_complete.has_fired() => {
                let ticket = on_complete.ticket();
                if let Some(previous) = session.stream.replace(ActiveStream { ticket, control }) {
                    warn!("⚠️ Stream {} seguía activo en guild {}, deteniendo", previous.ticket, guild_id);
                    previous.control.stop();
                }
            }
            Some(_) => debug!("Stream {} terminó antes de registrarse", on_complete.ticket()),
            None => {
                // Desconectado mientras arrancaba
                control.stop();
            }
        }
    }

    /// Pide detener el stream activo. Idempotente.
    pub fn stop_stream(&self, guild_id: GuildId) -> bool {
        match self.sessions.get(&guild_id) {
            Some(session) => match &session.stream {
                Some(active) => {
                    debug!("⏹️ Deteniendo stream {} en guild {}", active.ticket, guild_id);
                    active.control.stop();
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Olvida el handle del stream `ticket` una vez notificado su fin.
    pub fn clear_stream(&self, guild_id: GuildId, ticket: StreamTicket) {
        if let Some(mut session) = self.sessions.get_mut(&guild_id) {
            if session.stream.as_ref().is_some_and(|active| active.ticket == ticket) {
                session.stream = None;
            }
        }
    }

    /// Detiene el stream y libera la conexión. Sin sesión, no hace nada.
    pub async fn disconnect(&self, guild_id: GuildId) -> PlaybackResult<bool> {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return Ok(false);
        };

        if let Some(active) = session.stream {
            active.control.stop();
        }
        self.driver.disconnect(guild_id).await?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(true)
    }

    /// El gateway informó que el bot ya no está en voz: solo se limpia el estado local.
    pub fn forget(&self, guild_id: GuildId) {
        if let Some((_, session)) = self.sessions.remove(&guild_id) {
            if let Some(active) = session.stream {
                active.control.stop();
            }
            info!("🔌 Sesión de voz olvidada en guild {}", guild_id);
        }
    }

    /// El bot fue movido de canal desde fuera; se registra el nuevo canal.
    pub fn moved(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        match self.sessions.get_mut(&guild_id) {
            Some(mut session) if session.channel_id != channel_id => {
                info!("🔀 Movido externamente al canal {} en guild {}", channel_id, guild_id);
                session.channel_id = channel_id;
                true
            }
            _ => false,
        }
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn is_streaming(&self, guild_id: GuildId) -> bool {
        self.sessions
            .get(&guild_id)
            .is_some_and(|session| session.stream.is_some())
    }

    pub fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.sessions.get(&guild_id).map(|session| session.channel_id)
    }
}
