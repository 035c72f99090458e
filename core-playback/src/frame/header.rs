//! MPEG audio frame header (Layer III).

use serde::{Deserialize, Serialize};

/// Bytes in a frame header.
pub const HEADER_LEN: usize = 4;

const MPEG1_BITRATES: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const MPEG2_BITRATES: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const MPEG1_SAMPLE_RATES: [u32; 3] = [44_100, 48_000, 32_000];
const MPEG2_SAMPLE_RATES: [u32; 3] = [22_050, 24_000, 16_000];
const MPEG25_SAMPLE_RATES: [u32; 3] = [11_025, 12_000, 8_000];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    pub fn channel_count(&self) -> u16 {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

/// Parsed fields of a 4-byte Layer III frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    /// A 16-bit CRC follows the header.
    pub crc_protected: bool,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: ChannelMode,
    pub mode_extension: u8,
    pub copyright: bool,
    pub original: bool,
    pub emphasis: u8,
    /// Whole frame in bytes, header included.
    pub frame_length: usize,
    /// PCM samples per channel this frame decodes to.
    pub samples_per_frame: u32,
}

impl FrameHeader {
    /// Parse a header, returning `None` for anything that is not a playable
    /// Layer III frame (bad sync, reserved values, free format, other layers).
    pub fn parse(bytes: [u8; HEADER_LEN]) -> Option<Self> {
        if bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (bytes[1] >> 3) & 0x03 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return None,
        };

        // Layer III only.
        if (bytes[1] >> 1) & 0x03 != 0b01 {
            return None;
        }
        let crc_protected = bytes[1] & 0x01 == 0;

        let bitrate_index = (bytes[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 0x0F {
            return None;
        }
        let bitrate_kbps = match version {
            MpegVersion::Mpeg1 => MPEG1_BITRATES[bitrate_index],
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => MPEG2_BITRATES[bitrate_index],
        };

        let sample_rate_index = ((bytes[2] >> 2) & 0x03) as usize;
        if sample_rate_index == 3 {
            return None;
        }
        let sample_rate = match version {
            MpegVersion::Mpeg1 => MPEG1_SAMPLE_RATES[sample_rate_index],
            MpegVersion::Mpeg2 => MPEG2_SAMPLE_RATES[sample_rate_index],
            MpegVersion::Mpeg25 => MPEG25_SAMPLE_RATES[sample_rate_index],
        };

        let padding = (bytes[2] >> 1) & 0x01 == 1;

        let channel_mode = match bytes[3] >> 6 {
            0b00 => ChannelMode::Stereo,
            0b01 => ChannelMode::JointStereo,
            0b10 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        };

        let emphasis = bytes[3] & 0x03;
        if emphasis == 0b10 {
            return None;
        }

        let (coefficient, samples_per_frame) = match version {
            MpegVersion::Mpeg1 => (144, 1152),
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => (72, 576),
        };
        let frame_length =
            (coefficient * bitrate_kbps * 1000 / sample_rate) as usize + padding as usize;

        Some(Self {
            version,
            crc_protected,
            bitrate_kbps,
            sample_rate,
            padding,
            channel_mode,
            mode_extension: (bytes[3] >> 4) & 0x03,
            copyright: (bytes[3] >> 3) & 0x01 == 1,
            original: (bytes[3] >> 2) & 0x01 == 1,
            emphasis,
            frame_length,
            samples_per_frame,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channel_mode.channel_count()
    }

    /// Length of the Layer III side information block after the header/CRC.
    pub fn side_info_len(&self) -> usize {
        match (self.version, self.channel_mode) {
            (MpegVersion::Mpeg1, ChannelMode::Mono) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, ChannelMode::Mono) => 9,
            _ => 17,
        }
    }
}
