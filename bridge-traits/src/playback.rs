//! Playback bridge traits and supporting audio types.
//!
//! The core hands decoded PCM to the host through a pull contract: the host's
//! audio engine owns the output device and calls [`SampleProvider::read`] from
//! its render callback, while the core decides when the engine should run
//! through [`AudioSink`].

use std::sync::Arc;

use crate::error::Result;

/// Interleaved little-endian PCM layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Bits per sample per channel.
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// 16-bit PCM, the layout MP3 decompressors emit.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, 16)
    }

    /// Bytes per sample frame (one sample for every channel).
    pub fn block_align(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    pub fn average_bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.block_align()
    }
}

/// Pull source of PCM bytes consumed by an audio engine.
pub trait SampleProvider: Send + Sync {
    fn format(&self) -> PcmFormat;

    /// Fill `buffer` and return the number of bytes written.
    ///
    /// Providers used for real-time output return `buffer.len()` and pad
    /// missing audio with silence.
    fn read(&self, buffer: &mut [u8]) -> usize;
}

/// Coarse state of a host audio engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Uninitialized,
    Playing,
    Paused,
    Stopped,
}

/// Host audio output driven by the streaming controller.
///
/// Calls are synchronous and must not block on audio I/O; they are issued from
/// the playback clock and from controller operations.
#[cfg_attr(test, mockall::automock)]
pub trait AudioSink: Send + Sync {
    /// Attach the provider the engine pulls from. Replaces any previous one.
    fn init(&self, provider: Arc<dyn SampleProvider>) -> Result<()>;

    fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    /// Stop output and release the provider.
    fn stop(&self) -> Result<()>;

    fn state(&self) -> SinkState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_stereo_derived_sizes() {
        let format = PcmFormat::pcm16(44_100, 2);
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.average_bytes_per_second(), 176_400);
    }

    #[test]
    fn pcm16_mono_derived_sizes() {
        let format = PcmFormat::pcm16(22_050, 1);
        assert_eq!(format.block_align(), 2);
        assert_eq!(format.average_bytes_per_second(), 44_100);
    }

    #[test]
    fn mocked_sink_records_calls() {
        let mut sink = MockAudioSink::new();
        sink.expect_pause().times(1).returning(|| Ok(()));
        sink.expect_state().returning(|| SinkState::Paused);

        sink.pause().unwrap();
        assert_eq!(sink.state(), SinkState::Paused);
    }
}
