use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use super::queue::GuildMusicState;

/// Guard de decisión: mientras exista, nadie más decide qué suena en el guild.
pub type DecisionGuard<'a> = AsyncMutexGuard<'a, ()>;

/// Estado y guard de un guild. Los guilds nunca se bloquean entre sí.
#[derive(Debug)]
pub struct GuildSlot {
    state: Mutex<GuildMusicState>,
    decision: AsyncMutex<()>,
    pending: AtomicBool,
}

impl GuildSlot {
    fn new(max_queue_size: usize) -> Self {
        Self {
            state: Mutex::new(GuildMusicState::new(max_queue_size)),
            decision: AsyncMutex::new(()),
            pending: AtomicBool::new(false),
        }
    }

    /// Acceso exclusivo y síncrono al estado; no puede cruzar un `.await`.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut GuildMusicState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Toma el guard de decisión sin esperar.
    pub fn try_decide(&self) -> Option<DecisionGuard<'_>> {
        self.decision.try_lock().ok()
    }

    /// Espera el guard de decisión (stop/skip deben serializarse con el arranque).
    pub async fn decide(&self) -> DecisionGuard<'_> {
        self.decision.lock().await
    }

    /// Pide una decisión; quien tenga el guard la atenderá.
    pub fn request_decision(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn take_request(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn has_request(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// Registro de estado por guild, creado bajo demanda y vivo todo el proceso.
#[derive(Debug)]
pub struct GuildRegistry {
    guilds: DashMap<GuildId, Arc<GuildSlot>>,
    max_queue_size: usize,
}

impl GuildRegistry {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            guilds: DashMap::new(),
            max_queue_size,
        }
    }

    pub fn slot(&self, guild_id: GuildId) -> Arc<GuildSlot> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(GuildSlot::new(self.max_queue_size)))
            .clone()
    }

    pub fn with_state<R>(&self, guild_id: GuildId, f: impl FnOnce(&mut GuildMusicState) -> R) -> R {
        self.slot(guild_id).with_state(f)
    }
}
