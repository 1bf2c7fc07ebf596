//! Driver de voz en memoria para tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use super::{
    queue::StreamOutcome,
    voice::{CompletionNotifier, StreamControl, VoiceDriver},
};
use crate::error::{PlaybackError, PlaybackResult};

#[derive(Default)]
struct Inner {
    connects: Vec<(GuildId, ChannelId)>,
    disconnects: Vec<GuildId>,
    forbidden: HashSet<ChannelId>,
    fail_next_play: bool,
    stall_next_play: HashMap<GuildId, Duration>,
    started: Vec<(GuildId, String)>,
    active: Vec<(u64, GuildId, CompletionNotifier)>,
    peak_active: HashMap<GuildId, usize>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeDriver {
    inner: Arc<Mutex<Inner>>,
}

impl FakeDriver {
    pub fn forbid(&self, channel_id: ChannelId) {
        self.inner.lock().forbidden.insert(channel_id);
    }

    pub fn fail_next_play(&self) {
        self.inner.lock().fail_next_play = true;
    }

    /// El próximo `play` del guild tarda `delay` antes de arrancar.
    pub fn stall_next_play(&self, guild_id: GuildId, delay: Duration) {
        self.inner.lock().stall_next_play.insert(guild_id, delay);
    }

    pub fn connects(&self) -> Vec<(GuildId, ChannelId)> {
        self.inner.lock().connects.clone()
    }

    pub fn disconnects(&self) -> Vec<GuildId> {
        self.inner.lock().disconnects.clone()
    }

    /// URLs iniciadas en el guild, en orden.
    pub fn started(&self, guild_id: GuildId) -> Vec<String> {
        self.inner
            .lock()
            .started
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, url)| url.clone())
            .collect()
    }

    pub fn active_count(&self, guild_id: GuildId) -> usize {
        self.inner.lock().active.iter().filter(|(_, g, _)| *g == guild_id).count()
    }

    pub fn peak_active(&self, guild_id: GuildId) -> usize {
        self.inner.lock().peak_active.get(&guild_id).copied().unwrap_or(0)
    }

    /// Termina el stream activo del guild desde otro hilo, como haría el driver real.
    pub fn finish_current(&self, guild_id: GuildId) -> bool {
        let notifier = {
            let mut inner = self.inner.lock();
            let index = inner.active.iter().position(|(_, g, _)| *g == guild_id);
            index.map(|i| inner.active.remove(i).2)
        };

        match notifier {
            Some(notifier) => std::thread::spawn(move || notifier.notify(StreamOutcome::Finished))
                .join()
                .unwrap_or(false),
            None => false,
        }
    }
}

struct FakeStream {
    id: u64,
    inner: Arc<Mutex<Inner>>,
}

impl StreamControl for FakeStream {
    fn stop(&self) {
        let notifier = {
            let mut inner = self.inner.lock();
            let index = inner.active.iter().position(|(id, _, _)| *id == self.id);
            index.map(|i| inner.active.remove(i).2)
        };
        if let Some(notifier) = notifier {
            notifier.notify(StreamOutcome::Stopped);
        }
    }
}

#[async_trait]
impl VoiceDriver for FakeDriver {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.forbidden.contains(&channel_id) {
                return Err(PlaybackError::Forbidden(channel_id));
            }
            inner.connects.push((guild_id, channel_id));
        }
        // El join real cede el control antes de que el llamador registre la sesión
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let mut inner = self.inner.lock();
        inner.active.retain(|(_, g, _)| *g != guild_id);
        inner.disconnects.push(guild_id);
        Ok(())
    }

    async fn play(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        on_complete: CompletionNotifier,
    ) -> PlaybackResult<Box<dyn StreamControl>> {
        let stall = self.inner.lock().stall_next_play.remove(&guild_id);
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock();
        if std::mem::take(&mut inner.fail_next_play) {
            return Err(PlaybackError::Voice("fallo simulado".to_string()));
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.started.push((guild_id, stream_url.to_string()));
        inner.active.push((id, guild_id, on_complete));

        let active = inner.active.iter().filter(|(_, g, _)| *g == guild_id).count();
        let peak = inner.peak_active.entry(guild_id).or_insert(0);
        *peak = (*peak).max(active);

        Ok(Box::new(FakeStream {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }
}
