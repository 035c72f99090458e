//! # Circular Byte Buffer
//!
//! Fixed-capacity ring buffer for passing decoded PCM bytes between the
//! producer task (decoder) and the audio sink (consumer).
//!
//! ## Design
//!
//! - **Locking**: every operation runs under one `parking_lot::Mutex`
//! - **Capacity**: fixed at creation, never grows
//! - **Full buffer**: writes are truncated; unread data is never overwritten
//!
//! ## Usage
//!
//! ```rust
//! use core_playback::ring_buffer::CircularBuffer;
//!
//! // One second of 16-bit stereo audio at 44.1kHz
//! let buffer = CircularBuffer::new(176_400);
//!
//! // Producer
//! let written = buffer.write(&[1, 2, 3, 4]);
//! assert_eq!(written, 4);
//!
//! // Consumer
//! let mut output = vec![0u8; 1024];
//! let read = buffer.read(&mut output);
//! assert_eq!(read, 4);
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone)]
pub struct CircularBuffer {
    inner: Arc<Mutex<RingState>>,
}

struct RingState {
    buffer: Vec<u8>,
    write_pos: usize,
    read_pos: usize,
    count: usize,
}

impl RingState {
    fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

impl CircularBuffer {
    /// Create a new ring buffer holding `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RingState {
                buffer: vec![0; capacity],
                write_pos: 0,
                read_pos: 0,
                count: 0,
            })),
        }
    }

    /// Write bytes to the ring buffer.
    ///
    /// Returns the number of bytes actually written, which is less than
    /// `data.len()` when the buffer does not have enough free space.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut state = self.inner.lock();
        let capacity = state.capacity();
        let to_write = data.len().min(capacity - state.count);
        if to_write == 0 {
            return 0;
        }

        // Up to the physical end, then wrap.
        let first = to_write.min(capacity - state.write_pos);
        let write_pos = state.write_pos;
        state.buffer[write_pos..write_pos + first].copy_from_slice(&data[..first]);
        let rest = to_write - first;
        state.buffer[..rest].copy_from_slice(&data[first..to_write]);

        state.write_pos = (write_pos + to_write) % capacity;
        state.count += to_write;
        to_write
    }

    /// Read bytes from the ring buffer.
    ///
    /// Fills `output` with as many bytes as available, up to `output.len()`.
    /// Returns the number of bytes actually read.
    pub fn read(&self, output: &mut [u8]) -> usize {
        let mut state = self.inner.lock();
        let capacity = state.capacity();
        let to_read = output.len().min(state.count);
        if to_read == 0 {
            return 0;
        }

        let first = to_read.min(capacity - state.read_pos);
        let read_pos = state.read_pos;
        output[..first].copy_from_slice(&state.buffer[read_pos..read_pos + first]);
        let rest = to_read - first;
        output[first..to_read].copy_from_slice(&state.buffer[..rest]);

        state.read_pos = (read_pos + to_read) % capacity;
        state.count -= to_read;
        to_read
    }

    /// Discard up to `count` bytes without copying them.
    ///
    /// Returns the number of bytes discarded.
    pub fn advance(&self, count: usize) -> usize {
        let mut state = self.inner.lock();
        let capacity = state.capacity();
        let skipped = count.min(state.count);
        if skipped > 0 {
            state.read_pos = (state.read_pos + skipped) % capacity;
            state.count -= skipped;
        }
        skipped
    }

    /// Discard all buffered bytes.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        state.write_pos = 0;
        state.read_pos = 0;
        state.count = 0;
    }

    /// Returns the number of bytes currently available to read.
    pub fn count(&self) -> usize {
        self.inner.lock().count
    }

    /// Returns the number of bytes that can be written before the buffer is full.
    pub fn free_space(&self) -> usize {
        let state = self.inner.lock();
        state.capacity() - state.count
    }

    /// Returns the total capacity of the buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Returns the buffer fill percentage (0.0 to 1.0).
    pub fn fill_level(&self) -> f32 {
        let state = self.inner.lock();
        if state.capacity() == 0 {
            return 0.0;
        }
        state.count as f32 / state.capacity() as f32
    }

    /// Returns `true` if the buffer has no bytes available.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns `true` if no more bytes can be written.
    pub fn is_full(&self) -> bool {
        self.free_space() == 0
    }
}
