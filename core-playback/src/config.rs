//! # Streaming Configuration
//!
//! Configuration types for the streaming controller, plus the playback state
//! and statistics it reports.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// How the seek index is built when a stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// Scan every frame header before playback starts.
    Eager,
    /// Probe the header region only; index frames as they are decoded.
    Progressive,
}

/// Streaming controller configuration.
///
/// Controls buffer sizes, watermarks, backpressure and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Capacity of the decoded sample store, as audio duration.
    ///
    /// Default: 20 seconds.
    #[serde(default = "default_buffer_duration")]
    pub buffer_duration: Duration,

    /// Buffered audio required before `Buffering` moves to `Playing`.
    ///
    /// Default: 4 seconds.
    #[serde(default = "default_high_watermark")]
    pub high_watermark: Duration,

    /// Buffered audio below which `Playing` falls back to `Buffering` while
    /// the source is still downloading.
    ///
    /// Default: 0.5 seconds.
    #[serde(default = "default_low_watermark")]
    pub low_watermark: Duration,

    /// The producer sleeps when free space in the store drops below this much
    /// audio.
    ///
    /// Default: 250 ms.
    #[serde(default = "default_backpressure_threshold")]
    pub backpressure_threshold: Duration,

    /// How long the producer sleeps while the store is nearly full.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_backpressure_sleep")]
    pub backpressure_sleep: Duration,

    /// Drop decoded audio that does not fit instead of failing.
    ///
    /// Default: false.
    #[serde(default)]
    pub discard_on_overflow: bool,

    /// Pad short reads from the store with silence.
    ///
    /// Default: true.
    #[serde(default = "default_read_fully")]
    pub read_fully: bool,

    /// Frames decoded and discarded before the target frame after a seek, to
    /// rebuild decoder state (bit reservoir).
    ///
    /// Default: 3.
    #[serde(default = "default_warm_up_frames")]
    pub warm_up_frames: usize,

    /// Read-ahead cache size for HTTP sources, in bytes.
    ///
    /// Default: 4 KiB.
    #[serde(default = "default_http_read_ahead_bytes")]
    pub http_read_ahead_bytes: usize,

    /// Timeout for HTTP requests that do not stream a body (length probes).
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout: Duration,

    /// Interval between playback clock ticks.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_clock_interval")]
    pub clock_interval: Duration,

    /// Start a clock task on `play()`. Hosts that drive `tick()` themselves
    /// disable this.
    ///
    /// Default: true.
    #[serde(default = "default_auto_clock")]
    pub auto_clock: bool,

    /// Upper bound on waiting for the producer task during `stop()`.
    ///
    /// Default: 2 seconds.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: Duration,

    /// Overrides the per-source index mode (eager for files and memory,
    /// progressive for HTTP).
    #[serde(default)]
    pub index_mode: Option<IndexMode>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_duration: default_buffer_duration(),
            high_watermark: default_high_watermark(),
            low_watermark: default_low_watermark(),
            backpressure_threshold: default_backpressure_threshold(),
            backpressure_sleep: default_backpressure_sleep(),
            discard_on_overflow: false,
            read_fully: default_read_fully(),
            warm_up_frames: default_warm_up_frames(),
            http_read_ahead_bytes: default_http_read_ahead_bytes(),
            http_timeout: default_http_timeout(),
            clock_interval: default_clock_interval(),
            auto_clock: default_auto_clock(),
            stop_timeout: default_stop_timeout(),
            index_mode: None,
        }
    }
}

impl StreamingConfig {
    /// Configuration for network streams: a deep buffer that rides out jitter.
    pub fn network_streaming() -> Self {
        Self::default()
    }

    /// Configuration for local files, where reads never stall.
    ///
    /// - Smaller buffer (5s)
    /// - Playback starts after 1s of audio
    pub fn local_playback() -> Self {
        Self {
            buffer_duration: Duration::from_secs(5),
            high_watermark: Duration::from_secs(1),
            low_watermark: Duration::from_millis(250),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_duration.is_zero() {
            return Err("buffer_duration must be > 0".to_string());
        }

        if self.low_watermark > self.high_watermark {
            return Err("low_watermark cannot exceed high_watermark".to_string());
        }

        if self.high_watermark + self.backpressure_threshold > self.buffer_duration {
            return Err(
                "high_watermark plus backpressure_threshold cannot exceed buffer_duration"
                    .to_string(),
            );
        }

        if self.backpressure_threshold >= self.buffer_duration {
            return Err("backpressure_threshold must be below buffer_duration".to_string());
        }

        if self.http_read_ahead_bytes == 0 {
            return Err("http_read_ahead_bytes must be > 0".to_string());
        }

        if self.clock_interval.is_zero() {
            return Err("clock_interval must be > 0".to_string());
        }

        Ok(())
    }

    /// Bytes of PCM covered by `duration` at the given byte rate.
    pub fn bytes_for(duration: Duration, bytes_per_second: usize) -> usize {
        (duration.as_secs_f64() * bytes_per_second as f64) as usize
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_buffer_duration() -> Duration {
    Duration::from_secs(20)
}

fn default_high_watermark() -> Duration {
    Duration::from_secs(4)
}

fn default_low_watermark() -> Duration {
    Duration::from_millis(500)
}

fn default_backpressure_threshold() -> Duration {
    Duration::from_millis(250)
}

fn default_backpressure_sleep() -> Duration {
    Duration::from_millis(100)
}

fn default_read_fully() -> bool {
    true
}

fn default_warm_up_frames() -> usize {
    3
}

fn default_http_read_ahead_bytes() -> usize {
    4096
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_clock_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_auto_clock() -> bool {
    true
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(2)
}

// ============================================================================
// Playback State
// ============================================================================

/// Current state of the streaming controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing is open, or playback ended.
    Stopped,
    /// Producer running, sink paused until enough audio is buffered.
    Buffering,
    /// Sink is pulling audio.
    Playing,
    /// Paused by the user. The producer keeps filling the buffer.
    Paused,
}

impl PlaybackState {
    /// Returns `true` while a stream is open.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Stopped)
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Buffering => 1,
            Self::Playing => 2,
            Self::Paused => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Buffering,
            2 => Self::Playing,
            3 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// `PlaybackState` readable and writable from any thread without a lock.
#[derive(Debug)]
pub struct AtomicPlaybackState(AtomicU8);

impl AtomicPlaybackState {
    pub fn new(state: PlaybackState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub fn load(&self) -> PlaybackState {
        PlaybackState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store `state` and return the previous value.
    pub fn swap(&self, state: PlaybackState) -> PlaybackState {
        PlaybackState::from_u8(self.0.swap(state.to_u8(), Ordering::AcqRel))
    }

    /// Move from `current` to `new` only if the state is still `current`.
    pub fn transition(&self, current: PlaybackState, new: PlaybackState) -> bool {
        self.0
            .compare_exchange(
                current.to_u8(),
                new.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for AtomicPlaybackState {
    fn default() -> Self {
        Self::new(PlaybackState::Stopped)
    }
}

/// Statistics about streaming performance.
#[derive(Debug, Clone, Default)]
pub struct StreamingStats {
    /// Total decoded PCM bytes appended to the sample store.
    pub total_bytes_decoded: u64,
    /// Number of decode reads performed by the producer.
    pub decode_calls: u64,
    /// Average time per decode read in milliseconds.
    pub avg_decode_time_ms: f64,
    /// Number of sink reads that had to be padded with silence.
    pub underrun_count: u64,
    /// Number of seeks performed.
    pub seek_count: u64,
}

impl StreamingStats {
    /// Fold one decode read into the running averages.
    pub fn record_decode(&mut self, bytes: usize, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        self.decode_calls += 1;
        self.total_bytes_decoded += bytes as u64;
        self.avg_decode_time_ms +=
            (elapsed_ms - self.avg_decode_time_ms) / self.decode_calls as f64;
    }
}
