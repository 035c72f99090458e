//! Notifications published by the streaming controller.

use serde::{Deserialize, Serialize};

use crate::config::PlaybackState;

/// Capacity of the controller's broadcast channel. Slow subscribers miss the
/// oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    /// The producer reached the end of the source.
    FullyDownloaded,
    /// Playback ended. `error` is set when streaming failed; a stop requested
    /// by the caller or the natural end of the stream carries `None`.
    Stopped { error: Option<String> },
}
