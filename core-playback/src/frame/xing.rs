//! Xing / Info VBR summary carried in the first frame of many encodes.

use super::header::FrameHeader;

const FLAG_FRAMES: u32 = 0x0001;
const FLAG_BYTES: u32 = 0x0002;
const FLAG_TOC: u32 = 0x0004;
const FLAG_VBR_SCALE: u32 = 0x0008;

const TOC_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XingKind {
    /// `Xing`, written for VBR streams.
    Vbr,
    /// `Info`, written by LAME for CBR streams.
    Cbr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XingHeader {
    pub kind: XingKind,
    /// Audio frames in the stream, excluding the Xing frame.
    pub frames: Option<u32>,
    /// Bytes of audio data.
    pub bytes: Option<u32>,
    /// 100 byte-position samples at each percent of duration.
    pub toc: Option<Vec<u8>>,
    pub quality: Option<u32>,
}

impl XingHeader {
    /// Look for a Xing/Info block inside `frame`, the complete frame bytes.
    pub fn parse(header: &FrameHeader, frame: &[u8]) -> Option<Self> {
        let offset = 4 + if header.crc_protected { 2 } else { 0 } + header.side_info_len();
        let mut cursor = frame.get(offset..)?;

        let kind = match cursor.get(..4)? {
            b"Xing" => XingKind::Vbr,
            b"Info" => XingKind::Cbr,
            _ => return None,
        };
        cursor = &cursor[4..];
        let flags = take_u32(&mut cursor)?;

        let frames = if flags & FLAG_FRAMES != 0 {
            Some(take_u32(&mut cursor)?)
        } else {
            None
        };
        let bytes = if flags & FLAG_BYTES != 0 {
            Some(take_u32(&mut cursor)?)
        } else {
            None
        };
        let toc = if flags & FLAG_TOC != 0 {
            let toc = cursor.get(..TOC_LEN)?.to_vec();
            cursor = &cursor[TOC_LEN..];
            Some(toc)
        } else {
            None
        };
        let quality = if flags & FLAG_VBR_SCALE != 0 {
            Some(take_u32(&mut cursor)?)
        } else {
            None
        };

        Some(Self {
            kind,
            frames,
            bytes,
            toc,
            quality,
        })
    }
}

fn take_u32(cursor: &mut &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = cursor.get(..4)?.try_into().ok()?;
    *cursor = &cursor[4..];
    Some(u32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_frame_with(tag: &[u8; 4], flags: u32, fields: &[u8]) -> (FrameHeader, Vec<u8>) {
        let header_bytes = [0xFF, 0xFB, 0x90, 0x00];
        let header = FrameHeader::parse(header_bytes).unwrap();
        let mut frame = vec![0u8; header.frame_length];
        frame[..4].copy_from_slice(&header_bytes);
        let at = 4 + 32;
        frame[at..at + 4].copy_from_slice(tag);
        frame[at + 4..at + 8].copy_from_slice(&flags.to_be_bytes());
        frame[at + 8..at + 8 + fields.len()].copy_from_slice(fields);
        (header, frame)
    }

    #[test]
    fn parses_frames_and_bytes() {
        let mut fields = Vec::new();
        fields.extend_from_slice(&1234u32.to_be_bytes());
        fields.extend_from_slice(&567_890u32.to_be_bytes());
        let (header, frame) = stereo_frame_with(b"Xing", 0x3, &fields);

        let xing = XingHeader::parse(&header, &frame).unwrap();
        assert_eq!(xing.kind, XingKind::Vbr);
        assert_eq!(xing.frames, Some(1234));
        assert_eq!(xing.bytes, Some(567_890));
        assert!(xing.toc.is_none());
    }

    #[test]
    fn parses_info_with_toc_and_quality() {
        let mut fields: Vec<u8> = (0..100).collect();
        fields.extend_from_slice(&78u32.to_be_bytes());
        let (header, frame) = stereo_frame_with(b"Info", 0xC, &fields);

        let xing = XingHeader::parse(&header, &frame).unwrap();
        assert_eq!(xing.kind, XingKind::Cbr);
        assert_eq!(xing.toc.as_ref().map(Vec::len), Some(100));
        assert_eq!(xing.quality, Some(78));
    }

    #[test]
    fn plain_audio_frame_has_no_xing() {
        let header = FrameHeader::parse([0xFF, 0xFB, 0x90, 0x00]).unwrap();
        let frame = vec![0u8; header.frame_length];
        assert!(XingHeader::parse(&header, &frame).is_none());
    }
}
