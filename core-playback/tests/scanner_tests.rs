mod common;

use common::*;
use core_playback::frame::{ChannelMode, XingKind};
use core_playback::scanner::MAX_RETAINED_ID3V2;
use core_playback::{FrameScanner, MemorySource, PlaybackError};

async fn scan(fixture: &Fixture) -> core_playback::Result<(FrameScanner, core_playback::StreamInfo, core_playback::SeekIndex)> {
    let mut source = MemorySource::new(fixture.bytes());
    FrameScanner::scan(&mut source).await
}

#[tokio::test]
async fn test_scan_constant_bitrate_stream() {
    let fixture = stereo_fixture(10);
    let (_, info, index) = scan(&fixture).await.unwrap();

    assert_eq!(info.format.sample_rate, 44_100);
    assert_eq!(info.format.channels, 2);
    assert_eq!(info.format.bitrate_kbps, 128);
    assert_eq!(info.format.frame_length, FRAME_LEN);
    assert_eq!(info.data_start, 0);
    assert_eq!(info.data_end, Some(fixture.bytes.len() as u64));

    assert_eq!(index.len(), 10);
    assert_eq!(index.total_samples(), 10 * SAMPLES_PER_FRAME as u64);
    for (entry, offset) in index.entries().iter().zip(&fixture.frame_offsets) {
        assert_eq!(entry.file_position, *offset);
        assert_eq!(entry.byte_count as usize, FRAME_LEN);
    }
    for pair in index.entries().windows(2) {
        assert_eq!(pair[0].end_sample(), pair[1].sample_position);
    }
}

#[tokio::test]
async fn test_id3_tags_are_excluded() {
    let fixture = FixtureBuilder::new()
        .id3v2(100)
        .frames(5, STEREO)
        .id3v1()
        .build();
    let (_, info, index) = scan(&fixture).await.unwrap();

    assert_eq!(info.data_start, 110);
    assert_eq!(info.data_end, Some(fixture.data_end));
    assert_eq!(info.id3v2.as_ref().map(|tag| tag.len()), Some(110));
    assert!(info.id3v1.as_ref().is_some_and(|tag| tag.starts_with(b"TAG")));
    assert_eq!(index.len(), 5);
    assert_eq!(index.end_position(), Some(fixture.data_end));
}

#[tokio::test]
async fn test_xing_frame_is_skipped() {
    let fixture = FixtureBuilder::new().xing(6).frames(6, STEREO).build();
    let (_, info, index) = scan(&fixture).await.unwrap();

    let xing = info.xing.expect("xing header");
    assert_eq!(xing.kind, XingKind::Vbr);
    assert_eq!(xing.frames, Some(6));
    assert_eq!(info.data_start, FRAME_LEN as u64);
    assert_eq!(index.len(), 6);
    assert_eq!(index.entries()[0].file_position, fixture.frame_offsets[0]);
}

#[tokio::test]
async fn test_second_frame_channel_mode_rebases_data_start() {
    let fixture = FixtureBuilder::new()
        .stray_frame(JOINT_STEREO)
        .frames(8, STEREO)
        .build();
    let (scanner, info, index) = scan(&fixture).await.unwrap();

    assert_eq!(info.data_start, fixture.frame_offsets[0]);
    assert_eq!(info.data_start, FRAME_LEN as u64);
    assert_eq!(info.format.channel_mode, ChannelMode::Stereo);
    assert_eq!(scanner.format().channel_mode, ChannelMode::Stereo);
    assert_eq!(index.len(), 8);
    assert_eq!(index.entries()[0].file_position, fixture.frame_offsets[0]);
}

#[tokio::test]
async fn test_stray_mono_header_is_discarded() {
    let fixture = FixtureBuilder::new().stray_frame(MONO).frames(4, STEREO).build();
    let (_, info, index) = scan(&fixture).await.unwrap();

    assert_eq!(info.format.channels, 2);
    assert_eq!(info.data_start, FRAME_LEN as u64);
    assert_eq!(index.len(), 4);
}

#[tokio::test]
async fn test_channel_count_change_is_format_error() {
    let fixture = FixtureBuilder::new()
        .frames(3, STEREO)
        .frames(2, MONO)
        .build();

    let result = scan(&fixture).await;
    match result {
        Err(PlaybackError::FormatChanged { offset, .. }) => {
            assert_eq!(offset, fixture.frame_offsets[3]);
        }
        other => panic!("expected FormatChanged, got {:?}", other.map(|(_, _, i)| i.len())),
    }
}

#[tokio::test]
async fn test_stereo_modes_may_alternate() {
    let fixture = FixtureBuilder::new()
        .frames(3, STEREO)
        .frames(3, JOINT_STEREO)
        .frames(1, DUAL_CHANNEL)
        .build();
    let (_, _, index) = scan(&fixture).await.unwrap();
    assert_eq!(index.len(), 7);
}

#[tokio::test]
async fn test_oversized_id3v2_tag_is_skipped_unread() {
    // Header claims the largest syncsafe size, far beyond the data.
    let mut bytes = b"ID3\x03\x00\x00\x7f\x7f\x7f\x7f".to_vec();
    bytes.extend_from_slice(&stereo_fixture(3).bytes);
    let mut source = MemorySource::new(bytes.into());

    let result = FrameScanner::probe(&mut source).await;
    assert!(matches!(result, Err(PlaybackError::NoFramesDetected)));
}

#[tokio::test]
async fn test_id3v2_tag_above_retention_limit_is_dropped() {
    let body = MAX_RETAINED_ID3V2 as usize;
    let fixture = FixtureBuilder::new().id3v2(body).frames(3, STEREO).build();
    let (_, info, index) = scan(&fixture).await.unwrap();

    assert_eq!(info.data_start, body as u64 + 10);
    assert!(info.id3v2.is_none());
    assert_eq!(index.len(), 3);
}

#[tokio::test]
async fn test_no_frames_detected() {
    let fixture = FixtureBuilder::new().junk(4096).build();
    let result = scan(&fixture).await;
    assert!(matches!(result, Err(PlaybackError::NoFramesDetected)));
}

#[tokio::test]
async fn test_resync_over_junk_between_frames() {
    let fixture = FixtureBuilder::new()
        .frames(3, STEREO)
        .junk(10)
        .frames(3, STEREO)
        .build();
    let (_, _, index) = scan(&fixture).await.unwrap();

    assert_eq!(index.len(), 6);
    let after_junk = index.entries()[3];
    assert_eq!(after_junk.file_position, fixture.frame_offsets[2] + FRAME_LEN as u64);
    assert_eq!(after_junk.byte_count as usize, FRAME_LEN + 10);
    assert_eq!(index.total_samples(), 6 * SAMPLES_PER_FRAME as u64);
}

#[tokio::test]
async fn test_truncated_final_frame_ends_scan() {
    let mut fixture = stereo_fixture(5);
    fixture.bytes.truncate(fixture.bytes.len() - 100);
    let (_, _, index) = scan(&fixture).await.unwrap();
    assert_eq!(index.len(), 4);
}

#[tokio::test]
async fn test_probe_leaves_source_at_data_start() {
    let fixture = FixtureBuilder::new().id3v2(40).frames(3, STEREO).id3v1().build();
    let mut source = MemorySource::new(fixture.bytes());

    let (scanner, info) = FrameScanner::probe(&mut source).await.unwrap();
    assert_eq!(core_playback::FrameSource::position(&source), info.data_start);

    let frame = scanner.next_frame(&mut source).await.unwrap().unwrap();
    assert_eq!(frame.file_offset, fixture.frame_offsets[0]);
}
