//! # Playback Error Types
//!
//! Error types for the MP3 streaming pipeline. End of stream is never an
//! error: readers return `Ok(0)` and frame parsers `Ok(None)`.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// Failed to open or read the byte source.
    #[error("Failed to open audio source: {0}")]
    SourceError(String),

    /// Network transfer failed. Distinct from end of stream.
    #[error("Network error: {0}")]
    Network(String),

    /// The operation was aborted by stop or dispose.
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Format Errors
    // ========================================================================
    /// No valid MPEG audio frame was found where the data should start.
    #[error("Invalid MP3 file - no MP3 frames detected")]
    NoFramesDetected,

    /// A frame disagrees with the stream format established by the first frames.
    #[error("Format changed at offset {offset}: {detail}")]
    FormatChanged { offset: u64, detail: String },

    /// Header is readable but describes something this pipeline cannot play.
    #[error("Unsupported or invalid audio format: {0}")]
    InvalidFormat(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// The frame decompressor failed.
    #[error("Decoder error: {0}")]
    DecoderError(String),

    // ========================================================================
    // Buffering Errors
    // ========================================================================
    /// The sample store is full and discarding is disabled.
    #[error("Buffer full: {dropped} bytes could not be queued")]
    BufferOverflow { dropped: usize },

    // ========================================================================
    // Playback Control Errors
    // ========================================================================
    /// Seeking is not supported for this audio source.
    #[error("Seeking not supported")]
    SeekNotSupported,

    /// Attempted operation when no track is loaded.
    #[error("No track loaded")]
    NoTrackLoaded,

    /// Audio sink rejected a control call.
    #[error("Audio sink error: {0}")]
    SinkError(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration or capability failure reported by the runtime.
    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlaybackError::Network(_))
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        matches!(self, PlaybackError::Network(_))
    }

    /// Returns `true` if this error is related to the MPEG stream layout.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::NoFramesDetected
                | PlaybackError::FormatChanged { .. }
                | PlaybackError::InvalidFormat(_)
        )
    }

    /// Returns `true` for aborts caused by stop/dispose, which callers swallow.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PlaybackError::Cancelled)
    }
}

impl From<BridgeError> for PlaybackError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Cancelled => PlaybackError::Cancelled,
            other => PlaybackError::Network(other.to_string()),
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
