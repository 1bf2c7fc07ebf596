//! # Audio Module
//!
//! Per-guild playback engine for the jukebox bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Guild State
//! - FIFO queue, current track and repeat mode of one guild
//! - Stream tickets so late completions of old streams are ignored
//!
//! ### [`registry`] - Guild Registry
//! - Lazily created state per guild, never shared across guilds
//! - Decision guard that keeps at most one start in flight per guild
//!
//! ### [`voice`] - Voice Sessions
//! - Owns the voice connection and active stream handle of each guild
//! - [`voice::VoiceDriver`] seam over the Discord voice backend
//!
//! ### [`player`] - Playback Controller
//! - `Idle` / `Playing` state machine, the only place that picks the next track
//! - Receives stream completions over a channel and advances the queue
//!
//! ### [`service`] - Queue Service
//! - Entry points used by the slash commands
//!
//! ### [`discord_voice`] - Songbird Driver
//! - Production [`voice::VoiceDriver`] backed by Songbird
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let service = QueueService::new(registry, voice, controller, resolver);
//! let queued = service
//!     .enqueue(guild_id, Some(channel_id), "never gonna give you up", ResolveMode::Auto)
//!     .await?;
//! service.set_repeat(guild_id, RepeatMode::All);
//! service.skip(guild_id).await;
//! ```

pub mod discord_voice;
pub mod player;
pub mod queue;
pub mod registry;
pub mod service;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
