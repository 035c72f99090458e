//! # Seekable Decoded Stream
//!
//! Random-access view over the decoded PCM of an MP3 source. Positions are in
//! decoded bytes; the seek index maps them back to compressed frames.
//!
//! ## Reposition protocol
//!
//! MP3 frames depend on the bit reservoir of the frames before them, so a seek
//! cannot start decoding at the target frame. After a reposition the next
//! [`read`](SeekableDecodedStream::read):
//!
//! 1. resets the decompressor
//! 2. rewinds up to `warm_up_frames` frames before the target frame
//! 3. decodes and discards those frames (and any frame that yields nothing)
//! 4. skips the intra-frame offset inside the target frame's output
//!
//! Decoders that hold the first frame back and return two frames at once are
//! handled by keeping only the second half of that first output.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::playback::PcmFormat;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::{IndexMode, StreamingConfig};
use crate::decoder::{DecompressorFactory, FrameDecompressor};
use crate::error::{PlaybackError, Result};
use crate::frame::{Mp3Format, Mp3Frame};
use crate::scanner::{FrameScanner, StreamInfo};
use crate::seek_index::SeekIndex;
use crate::source::FrameSource;

/// Largest Layer III frame, in samples per channel.
const MAX_SAMPLES_PER_FRAME: usize = 1152;

/// Stream handle shared by the producer task and seek calls. The mutex is the
/// stream-level lock that serializes reads with repositions.
pub type SharedDecodedStream = Arc<Mutex<SeekableDecodedStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedStreamOptions {
    pub warm_up_frames: usize,
    pub index_mode: IndexMode,
}

impl DecodedStreamOptions {
    pub fn from_config(config: &StreamingConfig, default_mode: IndexMode) -> Self {
        Self {
            warm_up_frames: config.warm_up_frames,
            index_mode: config.index_mode.unwrap_or(default_mode),
        }
    }
}

impl Default for DecodedStreamOptions {
    fn default() -> Self {
        Self {
            warm_up_frames: 3,
            index_mode: IndexMode::Eager,
        }
    }
}

pub struct SeekableDecodedStream {
    source: Box<dyn FrameSource>,
    scanner: FrameScanner,
    info: StreamInfo,
    index: SeekIndex,
    index_complete: bool,
    decompressor: Box<dyn FrameDecompressor>,
    pcm_format: PcmFormat,
    bytes_per_sample: usize,
    decoded_frame_bytes: usize,
    decode_buffer: Vec<u8>,
    leftover_start: usize,
    leftover_len: usize,
    /// Index of the next frame to read.
    toc_index: usize,
    /// Decoded byte position.
    position: u64,
    /// Bytes of the target frame's output to skip after a reposition.
    buffer_offset: usize,
    repositioned: bool,
    warm_up_frames: usize,
}

impl SeekableDecodedStream {
    /// Probe `source`, build the decompressor and, in eager mode, index every
    /// frame.
    ///
    /// # Errors
    ///
    /// - `NoFramesDetected` / `FormatChanged` from the scan
    /// - anything the decompressor factory or the source reports
    #[instrument(skip(source, factory), fields(source = %source.describe()))]
    pub async fn open(
        mut source: Box<dyn FrameSource>,
        factory: &DecompressorFactory,
        options: DecodedStreamOptions,
    ) -> Result<Self> {
        let (scanner, info) = FrameScanner::probe(source.as_mut()).await?;

        let decompressor = factory(&info.format)?;
        let pcm_format = decompressor.output_format();
        let bytes_per_sample = pcm_format.block_align();
        if bytes_per_sample == 0 {
            return Err(PlaybackError::DecoderError(
                "decompressor reported an empty sample layout".to_string(),
            ));
        }
        let decoded_frame_bytes = info.format.samples_per_frame as usize * bytes_per_sample;

        let mut stream = Self {
            source,
            scanner,
            info,
            index: SeekIndex::new(),
            index_complete: false,
            decompressor,
            pcm_format,
            bytes_per_sample,
            decoded_frame_bytes,
            decode_buffer: vec![0; 2 * MAX_SAMPLES_PER_FRAME * bytes_per_sample],
            leftover_start: 0,
            leftover_len: 0,
            toc_index: 0,
            position: 0,
            buffer_offset: 0,
            repositioned: false,
            warm_up_frames: options.warm_up_frames,
        };

        if options.index_mode == IndexMode::Eager {
            stream.complete_index().await?;
            stream.source.seek(stream.info.data_start).await?;
        }

        info!(
            sample_rate = stream.info.format.sample_rate,
            channels = stream.info.format.channels,
            index_mode = ?options.index_mode,
            frames_indexed = stream.index.len(),
            "Opened decoded stream"
        );
        Ok(stream)
    }

    pub fn into_shared(self) -> SharedDecodedStream {
        Arc::new(Mutex::new(self))
    }

    /// Read decoded PCM at the current position. Returns 0 at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = buf.len();
        let mut bytes_read = 0;

        if self.leftover_len > 0 {
            let n = self.leftover_len.min(count);
            let start = self.leftover_start;
            buf[..n].copy_from_slice(&self.decode_buffer[start..start + n]);
            self.leftover_len -= n;
            self.leftover_start = if self.leftover_len == 0 { 0 } else { start + n };
            bytes_read += n;
        }

        let target = self.toc_index;
        if self.repositioned {
            self.decompressor.reset();
            self.toc_index = target.saturating_sub(self.warm_up_frames);
            let restart = match self.index.get(self.toc_index) {
                Some(entry) => entry.file_position,
                None => self.frontier(),
            };
            self.source.seek(restart).await?;
            self.repositioned = false;
        }

        while bytes_read < count {
            let Some(frame) = self.read_next_frame().await? else {
                break;
            };
            let mut decompressed = self
                .decompressor
                .decompress_frame(&frame, &mut self.decode_buffer)?;

            if self.toc_index <= target || decompressed == 0 {
                // warm-up
                continue;
            }

            if self.toc_index == target + 1 && decompressed == 2 * self.decoded_frame_bytes {
                // Delayed decoder flushed the previous frame with this one.
                self.decode_buffer
                    .copy_within(self.decoded_frame_bytes..decompressed, 0);
                decompressed = self.decoded_frame_bytes;
            }

            if self.buffer_offset >= decompressed {
                self.buffer_offset -= decompressed;
                continue;
            }

            let available = decompressed - self.buffer_offset;
            let n = available.min(count - bytes_read);
            let start = self.buffer_offset;
            buf[bytes_read..bytes_read + n].copy_from_slice(&self.decode_buffer[start..start + n]);
            if n < available {
                self.leftover_start = start + n;
                self.leftover_len = available - n;
            }
            self.buffer_offset = 0;
            bytes_read += n;
        }

        self.position += bytes_read as u64;
        Ok(bytes_read)
    }

    /// Read the next compressed frame, indexing it if it lies past the
    /// indexed region. Bypasses decoding; mixing this with [`read`] skips
    /// audio.
    ///
    /// [`read`]: SeekableDecodedStream::read
    pub async fn read_next_frame(&mut self) -> Result<Option<Mp3Frame>> {
        if self.toc_index < self.index.len() {
            let frame = self.scanner.next_frame(self.source.as_mut()).await?;
            if frame.is_some() {
                self.toc_index += 1;
            }
            return Ok(frame);
        }

        if self.index_complete {
            return Ok(None);
        }

        let frontier = self.frontier();
        if self.source.position() != frontier {
            self.source.seek(frontier).await?;
        }
        match self
            .scanner
            .next_indexed_frame(self.source.as_mut(), &mut self.index)
            .await?
        {
            Some(frame) => {
                self.toc_index += 1;
                Ok(Some(frame))
            }
            None => {
                self.mark_index_complete();
                Ok(None)
            }
        }
    }

    /// Move to decoded byte `position`, clamped to the stream and aligned down
    /// to a whole sample frame. Takes effect on the next read.
    pub async fn set_position(&mut self, position: u64) -> Result<()> {
        let mut target = self.align(position.min(self.length()));
        let mut sample = target / self.bytes_per_sample as u64;

        if !self.index_complete && self.index.find_frame(sample).is_none() {
            self.extend_index_to(sample).await?;
            if self.index_complete {
                target = self.align(target.min(self.length()));
                sample = target / self.bytes_per_sample as u64;
            }
        }

        self.leftover_start = 0;
        self.leftover_len = 0;
        self.buffer_offset = 0;
        self.repositioned = true;

        match self.index.find_frame(sample) {
            Some(i) => {
                let entry = self.index.entries()[i];
                self.toc_index = i;
                self.source.seek(entry.file_position).await?;
                self.buffer_offset =
                    ((sample - entry.sample_position) * self.bytes_per_sample as u64) as usize;
            }
            None => {
                self.toc_index = self.index.len();
                let end = self.frontier();
                self.source.seek(end).await?;
            }
        }

        self.position = target;
        debug!(
            position = target,
            frame = self.toc_index,
            offset = self.buffer_offset,
            "Repositioned decoded stream"
        );
        Ok(())
    }

    /// Index every remaining frame.
    pub async fn complete_index(&mut self) -> Result<()> {
        self.extend_index_to(u64::MAX).await
    }

    /// Decoded byte position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Decoded length in bytes. An estimate until the index is complete.
    pub fn length(&self) -> u64 {
        self.total_samples() * self.bytes_per_sample as u64
    }

    pub fn is_length_exact(&self) -> bool {
        self.index_complete
    }

    pub fn total_time(&self) -> Duration {
        self.samples_to_time(self.total_samples())
    }

    pub fn current_time(&self) -> Duration {
        self.samples_to_time(self.position / self.bytes_per_sample as u64)
    }

    /// Layout of the PCM `read` returns.
    pub fn output_format(&self) -> PcmFormat {
        self.pcm_format
    }

    pub fn mp3_format(&self) -> &Mp3Format {
        &self.info.format
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn index(&self) -> &SeekIndex {
        &self.index
    }

    /// Bytes of PCM one compressed frame decodes to.
    pub fn decoded_frame_bytes(&self) -> usize {
        self.decoded_frame_bytes
    }

    /// Mean bit rate over the data region, once the index is complete.
    pub fn average_bitrate(&self) -> Option<f64> {
        if !self.index_complete {
            return None;
        }
        self.info.average_bitrate(self.total_time())
    }

    fn total_samples(&self) -> u64 {
        let indexed = self.index.total_samples();
        if self.index_complete {
            return indexed;
        }

        let samples_per_frame = self.info.format.samples_per_frame as u64;
        let from_xing = self
            .info
            .xing
            .as_ref()
            .and_then(|xing| xing.frames)
            .map(|frames| frames as u64 * samples_per_frame);
        let from_length = self.info.data_length().map(|length| {
            let frame_bytes = self
                .index
                .mean_frame_bytes()
                .unwrap_or(self.info.format.frame_length as f64)
                .max(1.0);
            (length as f64 / frame_bytes) as u64 * samples_per_frame
        });

        indexed.max(from_xing.or(from_length).unwrap_or(0))
    }

    fn samples_to_time(&self, samples: u64) -> Duration {
        let rate = self.pcm_format.sample_rate.max(1) as f64;
        Duration::from_secs_f64(samples as f64 / rate)
    }

    fn align(&self, position: u64) -> u64 {
        position - position % self.bytes_per_sample as u64
    }

    /// File position just past the indexed region.
    fn frontier(&self) -> u64 {
        self.index.end_position().unwrap_or(self.info.data_start)
    }

    async fn extend_index_to(&mut self, sample: u64) -> Result<()> {
        if self.index_complete {
            return Ok(());
        }
        self.source.seek(self.frontier()).await?;
        while self.index.total_samples() <= sample {
            let next = self
                .scanner
                .next_indexed_frame(self.source.as_mut(), &mut self.index)
                .await?;
            if next.is_none() {
                self.mark_index_complete();
                break;
            }
        }
        Ok(())
    }

    fn mark_index_complete(&mut self) {
        if !self.index_complete {
            self.index_complete = true;
            info!(
                frames = self.index.len(),
                duration_secs = self.total_time().as_secs_f64(),
                "Seek index complete"
            );
        }
    }
}
