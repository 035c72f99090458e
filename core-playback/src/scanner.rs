//! # Frame Scanner
//!
//! Walks an MP3 byte stream frame by frame: skips the leading ID3v2 tag,
//! establishes the stream format from the first audio frames, excludes a
//! trailing ID3v1 tag, and records a [`SeekIndexEntry`](crate::seek_index::SeekIndexEntry)
//! for every frame it reads.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::error::{PlaybackError, Result};
use crate::frame::id3::{id3v2_tag_length, is_id3v1, ID3V1_TAG_LEN, ID3V2_HEADER_LEN};
use crate::frame::{FrameHeader, Mp3Format, Mp3Frame, XingHeader, HEADER_LEN};
use crate::seek_index::SeekIndex;
use crate::source::FrameSource;

/// Bytes the scanner slides over looking for a frame header before giving up.
pub const RESYNC_LIMIT: usize = 64 * 1024;

/// Larger ID3v2 tags are skipped but not kept in [`StreamInfo::id3v2`].
pub const MAX_RETAINED_ID3V2: u64 = 1024 * 1024;

/// What the header region of a stream says about it.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub format: Mp3Format,
    /// Offset of the first audio frame the index covers.
    pub data_start: u64,
    /// End of audio data (source length minus any ID3v1 tag), when known.
    pub data_end: Option<u64>,
    pub source_length: Option<u64>,
    pub xing: Option<XingHeader>,
    /// Raw ID3v2 tag, header included. `None` for tags above
    /// [`MAX_RETAINED_ID3V2`].
    pub id3v2: Option<Bytes>,
    /// Raw 128-byte ID3v1 tag.
    pub id3v1: Option<Bytes>,
}

impl StreamInfo {
    pub fn data_length(&self) -> Option<u64> {
        self.data_end.map(|end| end.saturating_sub(self.data_start))
    }

    /// Mean bit rate over the whole data region, in bits per second.
    pub fn average_bitrate(&self, duration: Duration) -> Option<f64> {
        let seconds = duration.as_secs_f64();
        let length = self.data_length()?;
        (seconds > 0.0).then(|| length as f64 * 8.0 / seconds)
    }
}

/// Reads frames from a source and keeps them consistent with the stream format.
#[derive(Debug, Clone)]
pub struct FrameScanner {
    format: Mp3Format,
    data_end: Option<u64>,
    resync_limit: usize,
}

impl FrameScanner {
    /// Inspect the header region and position `source` at the data start.
    ///
    /// # Errors
    ///
    /// - `NoFramesDetected` if no frame header is found after the ID3v2 tag
    #[instrument(skip(source), fields(source = %source.describe()))]
    pub async fn probe(source: &mut dyn FrameSource) -> Result<(Self, StreamInfo)> {
        source.seek(0).await?;
        let (id3v2, mut data_start) = read_id3v2(source).await?;
        source.seek(data_start).await?;

        let source_length = source.length().await?;

        let mut first = read_frame(source, source_length, RESYNC_LIMIT)
            .await?
            .ok_or(PlaybackError::NoFramesDetected)?;
        data_start = first.file_offset;

        let xing = first.xing();
        if xing.is_some() {
            data_start = first.file_offset + first.header.frame_length as u64;
            debug!(data_start, "Skipping Xing/Info frame");
        }

        if let Some(second) = read_frame(source, source_length, RESYNC_LIMIT).await? {
            if second.header.sample_rate != first.header.sample_rate
                || second.header.channel_mode != first.header.channel_mode
            {
                warn!(
                    first_offset = first.file_offset,
                    second_offset = second.file_offset,
                    "First frame disagrees with the second, treating it as a stray header"
                );
                data_start = second.file_offset;
                first = second;
            }
        }

        let (id3v1, data_end) = match source_length {
            Some(length) if length >= data_start + ID3V1_TAG_LEN => {
                source.seek(length - ID3V1_TAG_LEN).await?;
                let mut tag = vec![0u8; ID3V1_TAG_LEN as usize];
                let n = source.read_full(&mut tag).await?;
                if n == tag.len() && is_id3v1(&tag) {
                    (Some(Bytes::from(tag)), Some(length - ID3V1_TAG_LEN))
                } else {
                    (None, Some(length))
                }
            }
            other => (None, other),
        };

        source.seek(data_start).await?;

        let format = Mp3Format::from(&first.header);
        debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            bitrate_kbps = format.bitrate_kbps,
            data_start,
            data_end = ?data_end,
            "Probed MP3 stream"
        );

        let scanner = Self {
            format,
            data_end,
            resync_limit: RESYNC_LIMIT,
        };
        let info = StreamInfo {
            format,
            data_start,
            data_end,
            source_length,
            xing,
            id3v2,
            id3v1,
        };
        Ok((scanner, info))
    }

    /// Probe, then index every frame. Leaves `source` at the data start.
    #[instrument(skip(source), fields(source = %source.describe()))]
    pub async fn scan(source: &mut dyn FrameSource) -> Result<(Self, StreamInfo, SeekIndex)> {
        let (scanner, info) = Self::probe(source).await?;
        let mut index = SeekIndex::new();
        while scanner.next_indexed_frame(source, &mut index).await?.is_some() {}
        source.seek(info.data_start).await?;

        info!(
            frames = index.len(),
            samples = index.total_samples(),
            "Built seek index"
        );
        Ok((scanner, info, index))
    }

    pub fn format(&self) -> &Mp3Format {
        &self.format
    }

    pub fn data_end(&self) -> Option<u64> {
        self.data_end
    }

    /// Read the next frame without indexing it. `None` at end of data.
    pub async fn next_frame(&self, source: &mut dyn FrameSource) -> Result<Option<Mp3Frame>> {
        read_frame(source, self.data_end, self.resync_limit).await
    }

    /// Read the next frame, check it against the stream format and append it
    /// to `index`.
    ///
    /// # Errors
    ///
    /// - `FormatChanged` if the frame's sample rate or channel count differs
    pub async fn next_indexed_frame(
        &self,
        source: &mut dyn FrameSource,
        index: &mut SeekIndex,
    ) -> Result<Option<Mp3Frame>> {
        let position_before = source.position();
        let Some(frame) = self.next_frame(source).await? else {
            return Ok(None);
        };
        self.validate(&frame)?;

        let byte_count = source.position() - position_before;
        index.push(position_before, frame.sample_count(), byte_count as u32);
        Ok(Some(frame))
    }

    fn validate(&self, frame: &Mp3Frame) -> Result<()> {
        let header = &frame.header;
        if header.sample_rate != self.format.sample_rate {
            return Err(PlaybackError::FormatChanged {
                offset: frame.file_offset,
                detail: format!(
                    "sample rate {} -> {}",
                    self.format.sample_rate, header.sample_rate
                ),
            });
        }
        if header.channels() != self.format.channels {
            return Err(PlaybackError::FormatChanged {
                offset: frame.file_offset,
                detail: format!(
                    "channel count {} -> {}",
                    self.format.channels,
                    header.channels()
                ),
            });
        }
        Ok(())
    }
}

async fn read_id3v2(source: &mut dyn FrameSource) -> Result<(Option<Bytes>, u64)> {
    let mut header = [0u8; ID3V2_HEADER_LEN];
    if source.read_full(&mut header).await? < ID3V2_HEADER_LEN {
        return Ok((None, 0));
    }
    let Some(length) = id3v2_tag_length(&header) else {
        return Ok((None, 0));
    };

    if length > MAX_RETAINED_ID3V2 {
        debug!(length, "Skipping oversized ID3v2 tag without reading it");
        return Ok((None, length));
    }

    let mut tag = vec![0u8; length as usize];
    tag[..ID3V2_HEADER_LEN].copy_from_slice(&header);
    let n = source.read_full(&mut tag[ID3V2_HEADER_LEN..]).await?;
    tag.truncate(ID3V2_HEADER_LEN + n);
    debug!(length, "Skipping ID3v2 tag");
    Ok((Some(Bytes::from(tag)), length))
}

fn exceeds(end: Option<u64>, position: u64, len: usize) -> bool {
    end.is_some_and(|end| position + len as u64 > end)
}

/// Read the frame at the current position, sliding forward one byte at a time
/// over anything that is not a valid header. A frame cut short by `data_end`
/// or by the end of the source ends the stream.
async fn read_frame(
    source: &mut dyn FrameSource,
    data_end: Option<u64>,
    resync_limit: usize,
) -> Result<Option<Mp3Frame>> {
    let mut offset = source.position();
    if exceeds(data_end, offset, HEADER_LEN) {
        return Ok(None);
    }

    let mut header_bytes = [0u8; HEADER_LEN];
    if source.read_full(&mut header_bytes).await? < HEADER_LEN {
        return Ok(None);
    }

    let mut skipped = 0;
    loop {
        if let Some(header) = FrameHeader::parse(header_bytes) {
            if exceeds(data_end, offset, header.frame_length) {
                return Ok(None);
            }

            let mut data = vec![0u8; header.frame_length];
            data[..HEADER_LEN].copy_from_slice(&header_bytes);
            let payload = source.read_full(&mut data[HEADER_LEN..]).await?;
            if payload < header.frame_length - HEADER_LEN {
                debug!(offset, "Truncated final frame");
                return Ok(None);
            }

            return Ok(Some(Mp3Frame {
                header,
                file_offset: offset,
                data: Bytes::from(data),
            }));
        }

        if skipped >= resync_limit || exceeds(data_end, offset + 1, HEADER_LEN) {
            return Ok(None);
        }

        let mut next = [0u8; 1];
        if source.read_full(&mut next).await? == 0 {
            return Ok(None);
        }
        header_bytes.copy_within(1.., 0);
        header_bytes[HEADER_LEN - 1] = next[0];
        offset += 1;
        skipped += 1;
    }
}
