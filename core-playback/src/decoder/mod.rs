//! # Frame Decompression
//!
//! Turns one compressed MP3 frame into PCM bytes. The pipeline only depends on
//! the [`FrameDecompressor`] trait; the bundled implementation uses the
//! Symphonia MPEG audio decoder.
//!
//! | Implementation | Feature Flag | Output |
//! |----------------|--------------|--------|
//! | `SymphoniaFrameDecompressor` | `decoder-mp3` | 16-bit interleaved PCM |
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use core_playback::decoder::symphonia_factory;
//!
//! let factory = symphonia_factory();
//! let mut decompressor = factory(&format)?;
//! let mut pcm = vec![0u8; 1152 * 4 * 2];
//! let written = decompressor.decompress_frame(&frame, &mut pcm)?;
//! ```

#[cfg(feature = "decoder-mp3")]
mod symphonia;

#[cfg(feature = "decoder-mp3")]
pub use self::symphonia::SymphoniaFrameDecompressor;

use std::sync::Arc;

use bridge_traits::playback::PcmFormat;

use crate::error::Result;
use crate::frame::{Mp3Format, Mp3Frame};

/// Stateful per-stream MP3 frame decoder.
///
/// Decoders carry state between frames (the Layer III bit reservoir), so
/// frames must be fed in file order. After a reposition, call [`reset`] and
/// feed a few frames before the target; their output is discarded.
///
/// [`reset`]: FrameDecompressor::reset
pub trait FrameDecompressor: Send {
    /// Layout of the bytes `decompress_frame` writes.
    fn output_format(&self) -> PcmFormat;

    /// Decode `frame` into `output`, returning the number of bytes written.
    ///
    /// May return 0 (decoder still priming) or up to two frames' worth when
    /// delayed output is flushed. `output` must hold at least two decoded
    /// frames.
    fn decompress_frame(&mut self, frame: &Mp3Frame, output: &mut [u8]) -> Result<usize>;

    /// Drop all inter-frame state.
    fn reset(&mut self);
}

/// Builds a decompressor for a stream once its format is known.
pub type DecompressorFactory =
    Arc<dyn Fn(&Mp3Format) -> Result<Box<dyn FrameDecompressor>> + Send + Sync>;

/// Factory for [`SymphoniaFrameDecompressor`].
#[cfg(feature = "decoder-mp3")]
pub fn symphonia_factory() -> DecompressorFactory {
    Arc::new(|format: &Mp3Format| {
        let decompressor = SymphoniaFrameDecompressor::new(format)?;
        Ok(Box::new(decompressor) as Box<dyn FrameDecompressor>)
    })
}
