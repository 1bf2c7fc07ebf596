use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    queue::StreamTicket,
    registry::{GuildRegistry, GuildSlot},
    voice::{CompletionNotifier, StreamEnded, VoiceSessionManager},
};
use crate::sources::Track;

/// Máquina de estados de reproducción (`Idle` ⇄ `Playing`) de todos los guilds.
///
/// Toda transición pasa por [`PlaybackController::play_next`]: el enqueue, el
/// fin natural de un track y el skip terminan decidiendo en el mismo sitio.
pub struct PlaybackController {
    registry: Arc<GuildRegistry>,
    voice: Arc<VoiceSessionManager>,
    events: flume::Sender<StreamEnded>,
    next_ticket: AtomicU64,
}

impl PlaybackController {
    /// Crea el controlador y el receptor de fines de stream que debe consumir [`Self::run`].
    pub fn new(
        registry: Arc<GuildRegistry>,
        voice: Arc<VoiceSessionManager>,
    ) -> (Arc<Self>, flume::Receiver<StreamEnded>) {
        let (events, receiver) = flume::unbounded();
        let controller = Arc::new(Self {
            registry,
            voice,
            events,
            next_ticket: AtomicU64::new(1),
        });
        (controller, receiver)
    }

    /// Bucle que recibe los fines de stream del subsistema de audio.
    ///
    /// Cada evento se procesa en su propia task: un arranque lento en un
    /// guild no retrasa las transiciones de los demás.
    pub async fn run(
        self: Arc<Self>,
        events: flume::Receiver<StreamEnded>,
        shutdown: CancellationToken,
    ) {
        info!("🎛️ Controlador de reproducción iniciado");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv_async() => match event {
                    Ok(event) => {
                        let controller = Arc::clone(&self);
                        tokio::spawn(async move { controller.on_stream_end(event).await });
                    }
                    Err(_) => break,
                },
            }
        }

        info!("🛑 Controlador de reproducción detenido");
    }

    /// Decide y arranca lo siguiente si el guild está `Idle`.
    ///
    /// Single-flight: si otra decisión está en curso para el guild, la
    /// petición queda anotada y la atiende quien tiene el guard.
    pub async fn play_next(&self, guild_id: GuildId) {
        let slot = self.registry.slot(guild_id);
        slot.request_decision();
        self.drain_requests(guild_id, &slot).await;
    }

    async fn drain_requests(&self, guild_id: GuildId, slot: &GuildSlot) {
        loop {
            let Some(guard) = slot.try_decide() else {
                return;
            };
            while slot.take_request() {
                self.decide_and_start(guild_id, slot).await;
            }
            drop(guard);

            // Una petición pudo llegar entre el último `take_request` y soltar el guard
            if !slot.has_request() {
                return;
            }
        }
    }

    /// Se ejecuta siempre con el guard de decisión tomado.
    async fn decide_and_start(&self, guild_id: GuildId, slot: &GuildSlot) {
        let next = slot.with_state(|state| {
            if state.is_playing() {
                return None;
            }
            let track = state.next_track()?;
            let ticket = StreamTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
            state.begin(track.clone(), ticket);
            Some((track, ticket))
        });

        let Some((track, ticket)) = next else {
            debug!("💤 Nada que iniciar en guild {}", guild_id);
            return;
        };

        info!("🎵 Reproduciendo en guild {}: {} ({})", guild_id, track.title(), ticket);
        let notifier = CompletionNotifier::new(guild_id, ticket, self.events.clone());
        self.voice.start_stream(guild_id, track.stream_url(), notifier).await;
    }

    async fn on_stream_end(&self, event: StreamEnded) {
        let slot = self.registry.slot(event.guild_id);
        let matched = slot.with_state(|state| state.finish(event.ticket, event.outcome));
        self.voice.clear_stream(event.guild_id, event.ticket);

        if matched {
            debug!("⏭️ Stream {} terminó en guild {} ({:?})", event.ticket, event.guild_id, event.outcome);
        } else {
            debug!("Fin de stream {} obsoleto en guild {}, ignorado", event.ticket, event.guild_id);
        }

        self.play_next(event.guild_id).await;
    }

    /// Detiene el stream actual; el fin del stream decide el siguiente.
    /// Devuelve el track que sonaba, o `None` si el guild estaba `Idle`.
    pub async fn skip(&self, guild_id: GuildId) -> Option<Track> {
        let slot = self.registry.slot(guild_id);
        let guard = slot.decide().await;

        let current = slot.with_state(|state| state.current().cloned());
        if current.is_some() {
            self.voice.stop_stream(guild_id);
        }

        drop(guard);
        self.drain_requests(guild_id, &slot).await;
        current
    }

    /// Vacía cola y track actual y detiene el stream. Idempotente.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        let slot = self.registry.slot(guild_id);
        let guard = slot.decide().await;

        let was_playing = slot.with_state(|state| state.clear()).is_some();
        self.voice.stop_stream(guild_id);

        drop(guard);
        self.drain_requests(guild_id, &slot).await;

        if was_playing {
            info!("⏹️ Reproducción detenida en guild {}", guild_id);
        }
        was_playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{queue::RepeatMode, testing::FakeDriver};
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;

    struct Harness {
        controller: Arc<PlaybackController>,
        events: flume::Receiver<StreamEnded>,
        registry: Arc<GuildRegistry>,
        voice: Arc<VoiceSessionManager>,
        driver: Arc<FakeDriver>,
    }

    impl Harness {
        async fn connected() -> Self {
            let driver = Arc::new(FakeDriver::default());
            let registry = Arc::new(GuildRegistry::new(50));
            let voice = Arc::new(VoiceSessionManager::new(driver.clone()));
            voice.ensure_connected(guild(), ChannelId::new(1)).await.unwrap();
            let (controller, events) = PlaybackController::new(registry.clone(), voice.clone());
            Self { controller, events, registry, voice, driver }
        }

        /// Procesa los fines de stream pendientes, como haría `run`.
        async fn pump(&self) {
            while let Ok(event) = self.events.try_recv() {
                self.controller.on_stream_end(event).await;
            }
        }

        async fn push(&self, names: &[&str]) {
            for name in names {
                self.registry
                    .with_state(guild(), |s| s.push(track(name)))
                    .unwrap();
                self.controller.play_next(guild()).await;
            }
        }

        async fn finish(&self) {
            assert!(self.driver.finish_current(guild()));
            self.pump().await;
        }

        fn current(&self) -> Option<String> {
            self.registry
                .with_state(guild(), |s| s.current().map(|t| t.title().to_string()))
        }

        fn queued(&self) -> Vec<String> {
            self.registry.with_state(guild(), |s| {
                s.peek(usize::MAX).iter().map(|t| t.title().to_string()).collect()
            })
        }

        fn assert_consistent(&self) {
            let playing = self.registry.with_state(guild(), |s| s.current().is_some());
            assert_eq!(playing, self.voice.is_streaming(guild()));
            assert_eq!(playing, self.driver.active_count(guild()) == 1);
        }
    }

    fn guild() -> GuildId {
        GuildId::new(7)
    }

    fn track(name: &str) -> Track {
        Track::new(name, format!("https://example.com/{name}"), format!("https://cdn/{name}"))
    }

    #[tokio::test]
    async fn test_plays_in_fifo_order_then_idles() {
        let h = Harness::connected().await;
        h.push(&["A", "B", "C"]).await;

        assert_eq!(h.current().as_deref(), Some("A"));
        h.assert_consistent();
        h.finish().await;
        assert_eq!(h.current().as_deref(), Some("B"));
        h.finish().await;
        assert_eq!(h.current().as_deref(), Some("C"));
        h.finish().await;

        assert_eq!(h.current(), None);
        h.assert_consistent();
        assert_eq!(h.driver.started(guild()), vec!["https://cdn/A", "https://cdn/B", "https://cdn/C"]);
        assert_eq!(h.driver.peak_active(guild()), 1);
    }

    #[tokio::test]
    async fn test_repeat_one_then_off_falls_through() {
        let h = Harness::connected().await;
        h.push(&["A", "B"]).await;
        h.registry.with_state(guild(), |s| s.set_repeat(RepeatMode::One));

        for _ in 0..3 {
            h.finish().await;
            assert_eq!(h.current().as_deref(), Some("A"));
        }

        h.registry.with_state(guild(), |s| s.set_repeat(RepeatMode::Off));
        assert_eq!(h.current().as_deref(), Some("A"));
        h.finish().await;
        assert_eq!(h.current().as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_repeat_all_cycles_forever() {
        let h = Harness::connected().await;
        h.push(&["A", "B"]).await;
        h.registry.with_state(guild(), |s| s.set_repeat(RepeatMode::All));

        let mut order = vec![h.current().unwrap()];
        for _ in 0..5 {
            h.finish().await;
            order.push(h.current().unwrap());
            // La cola siempre son los tracks que no suenan
            assert_eq!(h.queued().len(), 1);
            assert_ne!(h.queued()[0], *order.last().unwrap());
        }
        assert_eq!(order, vec!["A", "B", "A", "B", "A", "B"]);
    }

    #[tokio::test]
    async fn test_stop_is_not_resurrected_by_racing_completion() {
        let h = Harness::connected().await;
        h.push(&["A", "B"]).await;
        h.registry.with_state(guild(), |s| s.set_repeat(RepeatMode::All));

        assert!(h.controller.stop(guild()).await);
        assert_eq!(h.current(), None);
        assert!(h.queued().is_empty());

        // El stop genera un fin de stream que llega después
        h.pump().await;
        assert_eq!(h.current(), None);
        assert!(h.queued().is_empty());
        h.assert_consistent();

        // Idempotente
        assert!(!h.controller.stop(guild()).await);
        h.controller.play_next(guild()).await;
        assert_eq!(h.current(), None);
    }

    #[tokio::test]
    async fn test_skip_goes_through_completion() {
        let h = Harness::connected().await;
        h.push(&["A", "B"]).await;

        let skipped = h.controller.skip(guild()).await;
        assert_eq!(skipped.as_ref().map(Track::title), Some("A"));
        // Hasta procesar el evento, el estado no cambia por sí mismo
        h.pump().await;
        assert_eq!(h.current().as_deref(), Some("B"));
        h.assert_consistent();
    }

    #[tokio::test]
    async fn test_skip_when_idle_is_noop() {
        let h = Harness::connected().await;
        assert_eq!(h.controller.skip(guild()).await, None);
        h.pump().await;
        assert_eq!(h.current(), None);
        assert!(h.driver.started(guild()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_still_progresses() {
        let h = Harness::connected().await;
        h.driver.fail_next_play();
        h.push(&["broken", "ok"]).await;

        // "broken" falló al arrancar; su fin ya está en el canal
        h.pump().await;
        assert_eq!(h.current().as_deref(), Some("ok"));
        assert_eq!(h.driver.started(guild()), vec!["https://cdn/ok"]);
        h.assert_consistent();
    }

    #[tokio::test]
    async fn test_held_guard_defers_request_to_owner() {
        let h = Harness::connected().await;
        let slot = h.registry.slot(guild());

        let guard = slot.decide().await;
        h.registry.with_state(guild(), |s| s.push(track("A"))).unwrap();
        h.controller.play_next(guild()).await;
        assert_eq!(h.current(), None);
        drop(guard);

        // Quien suelta el guard atiende la petición pendiente
        h.controller.drain_requests(guild(), &slot).await;
        assert_eq!(h.current().as_deref(), Some("A"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_loop_handles_cross_thread_completion() {
        let h = Harness::connected().await;
        let shutdown = CancellationToken::new();
        let events = h.events.clone();
        let task = tokio::spawn(h.controller.clone().run(events, shutdown.clone()));

        h.push(&["A", "B"]).await;
        assert!(h.driver.finish_current(guild()));

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while h.current().as_deref() != Some("B") {
            assert!(tokio::time::Instant::now() < deadline, "el controlador no avanzó");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_repeat_all_drops_failed_stream() {
        let h = Harness::connected().await;
        h.registry.with_state(guild(), |s| s.set_repeat(RepeatMode::All));
        h.driver.fail_next_play();
        h.push(&["dead", "ok"]).await;

        h.pump().await;
        assert_eq!(h.current().as_deref(), Some("ok"));
        assert!(h.queued().is_empty());

        // Solo el track sano rota
        h.finish().await;
        assert_eq!(h.current().as_deref(), Some("ok"));
        assert!(h.queued().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_start_in_one_guild_does_not_delay_others() {
        use std::time::Duration;

        let driver = Arc::new(FakeDriver::default());
        let registry = Arc::new(GuildRegistry::new(50));
        let voice = Arc::new(VoiceSessionManager::new(driver.clone()));
        let (controller, events) = PlaybackController::new(registry.clone(), voice.clone());
        let (slow, fast) = (GuildId::new(1), GuildId::new(2));

        for guild_id in [slow, fast] {
            voice.ensure_connected(guild_id, ChannelId::new(guild_id.get())).await.unwrap();
            for name in ["A", "B"] {
                registry.with_state(guild_id, |s| s.push(track(name))).unwrap();
            }
            controller.play_next(guild_id).await;
        }

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(controller.clone().run(events, shutdown.clone()));

        driver.stall_next_play(slow, Duration::from_secs(2));
        assert!(driver.finish_current(slow));
        assert!(driver.finish_current(fast));

        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while driver.started(fast).len() < 2 {
            assert!(tokio::time::Instant::now() < deadline, "el guild rápido esperó al lento");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(driver.started(fast), vec!["https://cdn/A", "https://cdn/B"]);
        assert_eq!(driver.started(slow), vec!["https://cdn/A"]);

        shutdown.cancel();
        task.await.unwrap();
    }
}
