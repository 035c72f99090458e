//! # MPEG Audio Frames
//!
//! Byte-level layout of an MP3 stream: Layer III frame headers, the optional
//! Xing/Info summary frame, and the ID3 tag spans around the audio data.

pub mod header;
pub mod id3;
pub mod xing;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use header::{ChannelMode, FrameHeader, MpegVersion, HEADER_LEN};
pub use xing::{XingHeader, XingKind};

/// One complete compressed frame as read from the source.
#[derive(Debug, Clone)]
pub struct Mp3Frame {
    pub header: FrameHeader,
    /// Byte offset of the header in the source.
    pub file_offset: u64,
    /// Header and payload, `header.frame_length` bytes.
    pub data: Bytes,
}

impl Mp3Frame {
    pub fn sample_count(&self) -> u32 {
        self.header.samples_per_frame
    }

    pub fn xing(&self) -> Option<XingHeader> {
        XingHeader::parse(&self.header, &self.data)
    }
}

/// Compressed stream format, fixed by the first audio frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mp3Format {
    pub version: MpegVersion,
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_mode: ChannelMode,
    /// Nominal bit rate of the first frame, in kbps.
    pub bitrate_kbps: u32,
    pub frame_length: usize,
    pub samples_per_frame: u32,
}

impl From<&FrameHeader> for Mp3Format {
    fn from(header: &FrameHeader) -> Self {
        Self {
            version: header.version,
            sample_rate: header.sample_rate,
            channels: header.channels(),
            channel_mode: header.channel_mode,
            bitrate_kbps: header.bitrate_kbps,
            frame_length: header.frame_length,
            samples_per_frame: header.samples_per_frame,
        }
    }
}
