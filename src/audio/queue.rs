use std::{collections::VecDeque, fmt, str::FromStr};
use tracing::{debug, info};

use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::Track,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "one" | "track" => Ok(RepeatMode::One),
            "all" | "queue" => Ok(RepeatMode::All),
            other => Err(format!("modo de repetición desconocido: {other}")),
        }
    }
}

/// Identifica un stream concreto; las notificaciones de streams viejos se descartan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTicket(pub u64);

impl fmt::Display for StreamTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Por qué terminó un stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Finished,
    Stopped,
    Failed,
}

/// Estado de reproducción de un guild.
///
/// `current` está presente si y solo si hay un stream activo (`stream`).
#[derive(Debug)]
pub struct GuildMusicState {
    queue: VecDeque<Track>,
    current: Option<Track>,
    repeat: RepeatMode,
    stream: Option<StreamTicket>,
    /// Última pista terminada; candidata a repetirse con `RepeatMode::One`
    replay: Option<Track>,
    max_size: usize,
}

impl GuildMusicState {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            repeat: RepeatMode::Off,
            stream: None,
            replay: None,
            max_size,
        }
    }

    /// Agrega un track al final. Devuelve su posición (1 = siguiente).
    pub fn push(&mut self, track: Track) -> PlaybackResult<usize> {
        if self.queue.len() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.queue.push_back(track);
        Ok(self.queue.len())
    }

    /// Cambia el modo de repetición; devuelve el anterior.
    pub fn set_repeat(&mut self, mode: RepeatMode) -> RepeatMode {
        let previous = std::mem::replace(&mut self.repeat, mode);
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::One => info!("🔂 Repetir canción activado"),
            RepeatMode::All => info!("🔁 Repetir cola activado"),
        }
        previous
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.stream.is_some()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Copia de los primeros `n` tracks en cola.
    pub fn peek(&self, n: usize) -> Vec<Track> {
        self.queue.iter().take(n).cloned().collect()
    }

    /// Decide qué suena después. Solo tiene sentido sin stream activo.
    pub fn next_track(&mut self) -> Option<Track> {
        let replay = self.replay.take();

        let next = match self.repeat {
            RepeatMode::One => replay.or_else(|| self.queue.pop_front()),
            RepeatMode::Off | RepeatMode::All => self.queue.pop_front(),
        };

        match &next {
            Some(track) => debug!("➡️ Siguiente en cola: {}", track.title()),
            None => {
                self.current = None;
                debug!("📭 Cola vacía, sin siguiente track");
            }
        }
        next
    }

    /// Marca `track` como actual, asociado al stream `ticket`.
    pub fn begin(&mut self, track: Track, ticket: StreamTicket) {
        self.current = Some(track);
        self.stream = Some(ticket);
    }

    /// Procesa el fin de un stream. Devuelve `false` si el ticket ya no es el activo.
    pub fn finish(&mut self, ticket: StreamTicket, outcome: StreamOutcome) -> bool {
        if self.stream != Some(ticket) {
            return false;
        }

        self.stream = None;
        let Some(finished) = self.current.take() else {
            return true;
        };

        // Un stream que falló no vuelve a la cola ni se repite: con una URL
        // muerta, `All` o `One` lo reintentarían sin fin
        if outcome == StreamOutcome::Failed {
            return true;
        }

        if self.repeat == RepeatMode::All {
            debug!("🔁 Track devuelto al final por repetición de cola: {}", finished.title());
            self.queue.push_back(finished.clone());
        }
        self.replay = Some(finished);
        true
    }

    /// Vacía cola y track actual. Devuelve el ticket que estaba activo, si había.
    pub fn clear(&mut self) -> Option<StreamTicket> {
        let cleared = self.queue.len();
        self.queue.clear();
        self.current = None;
        self.replay = None;
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        self.stream.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(name: &str) -> Track {
        Track::new(name, format!("https://example.com/{name}"), format!("https://cdn/{name}"))
    }

    /// Simula el ciclo completo: decidir, reproducir, terminar.
    fn play_round(state: &mut GuildMusicState, ticket: u64) -> Option<String> {
        let next = state.next_track()?;
        let title = next.title().to_string();
        state.begin(next, StreamTicket(ticket));
        assert!(state.finish(StreamTicket(ticket), StreamOutcome::Finished));
        Some(title)
    }

    #[test]
    fn test_fifo_order_then_idle() {
        let mut state = GuildMusicState::new(10);
        for name in ["A", "B", "C"] {
            state.push(track(name)).unwrap();
        }

        let played: Vec<_> = (1..=4).filter_map(|t| play_round(&mut state, t)).collect();
        assert_eq!(played, vec!["A", "B", "C"]);
        assert!(state.current().is_none());
        assert!(!state.is_playing());
    }

    #[test]
    fn test_repeat_one_replays_until_switched_off() {
        let mut state = GuildMusicState::new(10);
        state.push(track("A")).unwrap();
        state.push(track("B")).unwrap();
        state.set_repeat(RepeatMode::One);

        assert_eq!(play_round(&mut state, 1).as_deref(), Some("A"));
        assert_eq!(play_round(&mut state, 2).as_deref(), Some("A"));
        assert_eq!(play_round(&mut state, 3).as_deref(), Some("A"));

        state.set_repeat(RepeatMode::Off);
        assert_eq!(play_round(&mut state, 4).as_deref(), Some("B"));
        assert_eq!(play_round(&mut state, 5), None);
    }

    #[test]
    fn test_repeat_all_rotates_queue() {
        let mut state = GuildMusicState::new(10);
        state.push(track("A")).unwrap();
        state.push(track("B")).unwrap();
        state.set_repeat(RepeatMode::All);

        let first = state.next_track().unwrap();
        state.begin(first, StreamTicket(1));
        assert_eq!(state.current().map(Track::title), Some("A"));
        assert_eq!(titles(&state.peek(10)), vec!["B"]);

        state.finish(StreamTicket(1), StreamOutcome::Finished);
        assert_eq!(titles(&state.peek(10)), vec!["B", "A"]);

        let played: Vec<_> = (2..=6).filter_map(|t| play_round(&mut state, t)).collect();
        assert_eq!(played, vec!["B", "A", "B", "A", "B"]);
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let mut state = GuildMusicState::new(10);
        state.push(track("A")).unwrap();
        state.set_repeat(RepeatMode::All);
        let next = state.next_track().unwrap();
        state.begin(next, StreamTicket(7));

        assert_eq!(state.clear(), Some(StreamTicket(7)));
        assert!(!state.finish(StreamTicket(7), StreamOutcome::Stopped));
        assert!(state.is_empty());
        assert_eq!(state.next_track(), None);
    }

    #[test]
    fn test_failed_stream_is_not_repeated() {
        let mut state = GuildMusicState::new(10);
        state.push(track("A")).unwrap();
        state.set_repeat(RepeatMode::One);
        let next = state.next_track().unwrap();
        state.begin(next, StreamTicket(1));

        assert!(state.finish(StreamTicket(1), StreamOutcome::Failed));
        assert_eq!(state.next_track(), None);

        state.set_repeat(RepeatMode::All);
        state.push(track("B")).unwrap();
        let next = state.next_track().unwrap();
        state.begin(next, StreamTicket(2));
        state.finish(StreamTicket(2), StreamOutcome::Failed);
        assert!(state.is_empty());
    }

    #[test]
    fn test_queue_limit() {
        let mut state = GuildMusicState::new(2);
        assert_eq!(state.push(track("A")), Ok(1));
        assert_eq!(state.push(track("A")), Ok(2));
        assert_eq!(state.push(track("C")), Err(PlaybackError::QueueFull(2)));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_repeat_mode_parsing() {
        assert_eq!("ALL".parse::<RepeatMode>(), Ok(RepeatMode::All));
        assert_eq!("track".parse::<RepeatMode>(), Ok(RepeatMode::One));
        assert!("shuffle".parse::<RepeatMode>().is_err());
        assert_eq!(RepeatMode::default(), RepeatMode::Off);
    }

    fn titles(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(Track::title).collect()
    }
}
