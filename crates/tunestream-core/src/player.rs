//! Player engine boundary.
//!
//! The engine owns decoding and transport. It exposes its state as a set of
//! independent `watch` sources and accepts fire-and-forget commands.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;
use crate::model::Track;

/// Repeat behavior of the engine queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop at the end of the queue.
    #[default]
    Off,
    /// Wrap around to the first track.
    All,
    /// Repeat the current track.
    One,
}

impl RepeatMode {
    /// The mode after `self` in the Off -> All -> One cycle.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }
}

impl std::fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "Off"),
            Self::All => write!(f, "All"),
            Self::One => write!(f, "One"),
        }
    }
}

/// Receivers for every reactive source the engine publishes.
#[derive(Debug, Clone)]
pub struct PlayerSignals {
    /// Playing (true) or paused.
    pub is_playing: watch::Receiver<bool>,
    /// Waiting on data.
    pub is_buffering: watch::Receiver<bool>,
    /// Duration of the current item in milliseconds.
    pub duration_ms: watch::Receiver<u64>,
    /// Current item.
    pub current_track: watch::Receiver<Option<Track>>,
    /// Queue contents.
    pub queue: watch::Receiver<Vec<Track>>,
    /// Queue cursor.
    pub queue_index: watch::Receiver<Option<usize>>,
    /// Shuffle flag.
    pub shuffle: watch::Receiver<bool>,
    /// Repeat mode.
    pub repeat: watch::Receiver<RepeatMode>,
}

/// Sending halves matching [`PlayerSignals`], for engine implementations.
#[derive(Debug)]
pub struct PlayerSignalSenders {
    /// Playing flag.
    pub is_playing: watch::Sender<bool>,
    /// Buffering flag.
    pub is_buffering: watch::Sender<bool>,
    /// Duration.
    pub duration_ms: watch::Sender<u64>,
    /// Current item.
    pub current_track: watch::Sender<Option<Track>>,
    /// Queue contents.
    pub queue: watch::Sender<Vec<Track>>,
    /// Queue cursor.
    pub queue_index: watch::Sender<Option<usize>>,
    /// Shuffle flag.
    pub shuffle: watch::Sender<bool>,
    /// Repeat mode.
    pub repeat: watch::Sender<RepeatMode>,
}

/// Create a connected pair of signal senders and receivers in their idle state.
#[must_use]
pub fn signal_channels() -> (PlayerSignalSenders, PlayerSignals) {
    let (is_playing_tx, is_playing) = watch::channel(false);
    let (is_buffering_tx, is_buffering) = watch::channel(false);
    let (duration_tx, duration_ms) = watch::channel(0);
    let (current_tx, current_track) = watch::channel(None);
    let (queue_tx, queue) = watch::channel(Vec::new());
    let (index_tx, queue_index) = watch::channel(None);
    let (shuffle_tx, shuffle) = watch::channel(false);
    let (repeat_tx, repeat) = watch::channel(RepeatMode::Off);

    (
        PlayerSignalSenders {
            is_playing: is_playing_tx,
            is_buffering: is_buffering_tx,
            duration_ms: duration_tx,
            current_track: current_tx,
            queue: queue_tx,
            queue_index: index_tx,
            shuffle: shuffle_tx,
            repeat: repeat_tx,
        },
        PlayerSignals {
            is_playing,
            is_buffering,
            duration_ms,
            current_track,
            queue,
            queue_index,
            shuffle,
            repeat,
        },
    )
}

/// Commands and state accessors of the external player.
///
/// Commands are dispatched synchronously; their effects show up later on the
/// [`PlayerSignals`].
#[cfg_attr(test, mockall::automock)]
pub trait PlayerEngine: Send + Sync {
    /// Subscribe to the engine's reactive sources.
    fn signals(&self) -> PlayerSignals;

    /// Current playback position in milliseconds.
    fn position_ms(&self) -> u64;

    /// Start `track` from `stream_url`, replacing the queue with `queue`
    /// (or a single-item queue when `None`).
    fn play_track(&self, track: Track, stream_url: String, queue: Option<Vec<Track>>) -> Result<()>;

    /// Resume playback.
    fn play(&self);

    /// Pause playback.
    fn pause(&self);

    /// Stop playback and clear the cursor.
    fn stop(&self);

    /// Seek within the current item.
    fn seek_to(&self, position_ms: u64);

    /// Move the cursor to `index` and start it.
    fn skip_to(&self, index: usize);

    /// Append tracks at the end of the queue.
    fn append_to_queue(&self, tracks: Vec<Track>);

    /// Insert a track right after the cursor.
    fn insert_next(&self, track: Track);

    /// Remove the queue item at `index`.
    fn remove_from_queue(&self, index: usize);

    /// Set the shuffle flag.
    fn set_shuffle(&self, enabled: bool);

    /// Set the repeat mode.
    fn set_repeat_mode(&self, mode: RepeatMode);
}
