//! # Buffered Sample Store
//!
//! Pull-based PCM provider that sits between the producer task and the host
//! audio engine. Wraps a [`CircularBuffer`] sized in audio time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bridge_traits::playback::{PcmFormat, SampleProvider};
use tracing::trace;

use crate::error::{PlaybackError, Result};
use crate::ring_buffer::CircularBuffer;

/// Decoded PCM queue with underrun and overflow policies.
pub struct BufferedSampleStore {
    format: PcmFormat,
    buffer: CircularBuffer,
    read_fully: bool,
    discard_on_overflow: bool,
    underruns: AtomicU64,
}

impl BufferedSampleStore {
    /// Create a store holding `buffer_duration` of audio in `format`.
    ///
    /// Defaults: read-fully on, overflow discard off.
    pub fn new(format: PcmFormat, buffer_duration: Duration) -> Self {
        let capacity = (buffer_duration.as_secs_f64() * format.average_bytes_per_second() as f64)
            as usize;
        // Whole sample frames only.
        let block_align = format.block_align().max(1);
        let capacity = (capacity / block_align).max(1) * block_align;

        Self {
            format,
            buffer: CircularBuffer::new(capacity),
            read_fully: true,
            discard_on_overflow: false,
            underruns: AtomicU64::new(0),
        }
    }

    /// Zero-fill reads that find less audio than requested.
    pub fn with_read_fully(mut self, read_fully: bool) -> Self {
        self.read_fully = read_fully;
        self
    }

    /// Silently drop audio that does not fit instead of reporting overflow.
    pub fn with_discard_on_overflow(mut self, discard: bool) -> Self {
        self.discard_on_overflow = discard;
        self
    }

    pub fn pcm_format(&self) -> PcmFormat {
        self.format
    }

    /// Queue decoded PCM bytes.
    ///
    /// Returns the number of bytes queued. When the data does not fit, the
    /// bytes that fit are kept and the rest is either dropped (discard on) or
    /// reported as [`PlaybackError::BufferOverflow`].
    pub fn add_samples(&self, data: &[u8]) -> Result<usize> {
        let written = self.buffer.write(data);
        if written < data.len() {
            let dropped = data.len() - written;
            if !self.discard_on_overflow {
                return Err(PlaybackError::BufferOverflow { dropped });
            }
            trace!(dropped, "Sample store full, discarding audio");
        }
        Ok(written)
    }

    /// Pull PCM bytes for playback.
    ///
    /// In read-fully mode the result is always `output.len()`; the tail past
    /// the buffered audio is silence.
    pub fn read(&self, output: &mut [u8]) -> usize {
        let read = self.buffer.read(output);
        if read < output.len() {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            if self.read_fully {
                output[read..].fill(0);
                return output.len();
            }
        }
        read
    }

    /// Drop all buffered audio.
    pub fn clear_buffer(&self) {
        self.buffer.reset();
    }

    /// Discard up to `count` bytes of queued audio.
    pub fn skip(&self, count: usize) -> usize {
        self.buffer.advance(count)
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.count()
    }

    pub fn buffer_length(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn buffered_duration(&self) -> Duration {
        let bytes_per_second = self.format.average_bytes_per_second();
        if bytes_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.buffered_bytes() as f64 / bytes_per_second as f64)
    }

    pub fn buffer_duration(&self) -> Duration {
        let bytes_per_second = self.format.average_bytes_per_second();
        if bytes_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.buffer_length() as f64 / bytes_per_second as f64)
    }

    /// `true` when fewer than `threshold_bytes` of free space remain.
    pub fn is_nearly_full(&self, threshold_bytes: usize) -> bool {
        self.buffer.free_space() < threshold_bytes
    }

    /// Number of reads that found less audio than requested.
    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl SampleProvider for BufferedSampleStore {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn read(&self, buffer: &mut [u8]) -> usize {
        BufferedSampleStore::read(self, buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(seconds: u64) -> BufferedSampleStore {
        // 1 kHz mono 16-bit: 2000 bytes per second keeps the numbers small.
        BufferedSampleStore::new(PcmFormat::pcm16(1000, 1), Duration::from_secs(seconds))
    }

    #[test]
    fn test_capacity_from_duration() {
        let store = store(5);
        assert_eq!(store.buffer_length(), 10_000);
        assert_eq!(store.buffer_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_read_fully_zero_fills() {
        let store = store(1);
        store.add_samples(&[7; 100]).unwrap();

        let mut output = vec![0xAAu8; 300];
        assert_eq!(store.read(&mut output), 300);
        assert!(output[..100].iter().all(|&b| b == 7));
        assert!(output[100..].iter().all(|&b| b == 0));
        assert_eq!(store.underrun_count(), 1);
    }

    #[test]
    fn test_read_partial_when_read_fully_disabled() {
        let store = store(1).with_read_fully(false);
        store.add_samples(&[7; 100]).unwrap();

        let mut output = vec![0u8; 300];
        assert_eq!(store.read(&mut output), 100);
    }

    #[test]
    fn test_overflow_reports_error_and_keeps_what_fits() {
        let store = store(1);
        assert_eq!(store.add_samples(&[1; 1500]).unwrap(), 1500);

        let err = store.add_samples(&[2; 800]).unwrap_err();
        assert!(matches!(err, PlaybackError::BufferOverflow { dropped: 300 }));
        assert_eq!(store.buffered_bytes(), 2000);
    }

    #[test]
    fn test_overflow_discards_when_enabled() {
        let store = store(1).with_discard_on_overflow(true);
        store.add_samples(&[1; 1500]).unwrap();
        assert_eq!(store.add_samples(&[2; 800]).unwrap(), 500);
        assert_eq!(store.buffered_bytes(), 2000);
    }

    #[test]
    fn test_buffered_duration_and_clear() {
        let store = store(2);
        store.add_samples(&[0; 1000]).unwrap();
        assert_eq!(store.buffered_duration(), Duration::from_millis(500));

        store.clear_buffer();
        assert_eq!(store.buffered_bytes(), 0);
        assert_eq!(store.buffered_duration(), Duration::ZERO);
    }

    #[test]
    fn test_nearly_full() {
        let store = store(1);
        store.add_samples(&[0; 1600]).unwrap();
        assert!(!store.is_nearly_full(400));
        store.add_samples(&[0; 1]).unwrap();
        assert!(store.is_nearly_full(400));
    }

    #[test]
    fn test_skip_discards_queued_audio() {
        let store = store(1);
        store.add_samples(&[1, 2, 3, 4]).unwrap();
        assert_eq!(store.skip(2), 2);

        let mut output = [0u8; 2];
        store.read(&mut output);
        assert_eq!(output, [3, 4]);
    }
}
