//! Symphonia-backed frame decompressor.

use bridge_traits::playback::PcmFormat;
use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_MP3};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use tracing::{debug, error, warn};

use super::FrameDecompressor;
use crate::error::{PlaybackError, Result};
use crate::frame::{Mp3Format, Mp3Frame};

const MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Decodes single MP3 frames with Symphonia's MPEG audio decoder.
///
/// Each frame is handed to the decoder as one packet; the frame header inside
/// the packet tells the decoder everything it needs. Output is 16-bit
/// little-endian interleaved PCM.
pub struct SymphoniaFrameDecompressor {
    decoder: Box<dyn Decoder>,
    format: PcmFormat,
    sample_buf: Option<SampleBuffer<i16>>,
    timestamp: u64,
    consecutive_errors: usize,
}

impl SymphoniaFrameDecompressor {
    pub fn new(format: &Mp3Format) -> Result<Self> {
        let channels = if format.channels == 1 {
            Channels::FRONT_LEFT
        } else {
            Channels::FRONT_LEFT | Channels::FRONT_RIGHT
        };

        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_MP3)
            .with_sample_rate(format.sample_rate)
            .with_channels(channels)
            .with_max_frames_per_packet(format.samples_per_frame as u64);

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create decoder: {}", e);
                PlaybackError::DecoderError(format!("Failed to create MP3 decoder: {}", e))
            })?;

        debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Created Symphonia MP3 decompressor"
        );

        Ok(Self {
            decoder,
            format: PcmFormat::pcm16(format.sample_rate, format.channels),
            sample_buf: None,
            timestamp: 0,
            consecutive_errors: 0,
        })
    }

    fn skip_frame(&mut self, frame: &Mp3Frame, reason: &dyn std::fmt::Display) -> Result<usize> {
        self.consecutive_errors += 1;
        warn!(
            "Skipping undecodable frame at offset {} (attempt {}/{}): {}",
            frame.file_offset, self.consecutive_errors, MAX_CONSECUTIVE_ERRORS, reason
        );

        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            error!("Too many consecutive decode errors, stream may be corrupted");
            return Err(PlaybackError::DecoderError(format!(
                "Decoder failure after {} failed frames: {}",
                MAX_CONSECUTIVE_ERRORS, reason
            )));
        }
        Ok(0)
    }
}

impl FrameDecompressor for SymphoniaFrameDecompressor {
    fn output_format(&self) -> PcmFormat {
        self.format
    }

    fn decompress_frame(&mut self, frame: &Mp3Frame, output: &mut [u8]) -> Result<usize> {
        let duration = frame.sample_count() as u64;
        let packet = Packet::new_from_slice(0, self.timestamp, duration, &frame.data);
        self.timestamp += duration;

        let decoded = match self.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => return self.skip_frame(frame, &err),
            Err(SymphoniaError::IoError(err)) => return self.skip_frame(frame, &err),
            Err(e) => {
                error!("Fatal decode error: {}", e);
                return Err(PlaybackError::DecoderError(format!(
                    "Failed to decode frame: {}",
                    e
                )));
            }
        };
        self.consecutive_errors = 0;

        if decoded.frames() == 0 {
            return Ok(0);
        }

        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;
        let required = capacity as usize * spec.channels.count();
        if self
            .sample_buf
            .as_ref()
            .is_some_and(|buf| buf.capacity() < required)
        {
            self.sample_buf = None;
        }
        let sample_buf = self
            .sample_buf
            .get_or_insert_with(|| SampleBuffer::<i16>::new(capacity, spec));
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();
        let needed = samples.len() * 2;
        if output.len() < needed {
            return Err(PlaybackError::Internal(format!(
                "decode buffer too small: {} < {}",
                output.len(),
                needed
            )));
        }

        for (chunk, sample) in output.chunks_exact_mut(2).zip(samples) {
            chunk.copy_from_slice(&sample.to_le_bytes());
        }
        Ok(needed)
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.consecutive_errors = 0;
    }
}
