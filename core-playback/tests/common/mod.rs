//! Fixtures shared by the playback integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStream};
use bridge_traits::playback::{AudioSink, PcmFormat, SampleProvider, SinkState};
use bytes::Bytes;
use core_playback::decoder::{DecompressorFactory, FrameDecompressor};
use core_playback::frame::{Mp3Format, Mp3Frame};
use parking_lot::Mutex;
use tokio::sync::watch;

/// MPEG-1 Layer III, 128 kbps, 44.1 kHz, no padding.
pub const FRAME_LEN: usize = 417;
pub const SAMPLES_PER_FRAME: usize = 1152;

pub const STEREO: u8 = 0x00;
pub const JOINT_STEREO: u8 = 0x40;
pub const DUAL_CHANNEL: u8 = 0x80;
pub const MONO: u8 = 0xC0;

/// Byte offset of the Xing tag in an MPEG-1 stereo frame.
const XING_OFFSET: usize = 4 + 32;

pub fn header(mode: u8) -> [u8; 4] {
    [0xFF, 0xFB, 0x90, mode]
}

/// A synthetic MP3 byte stream. Audio frames carry their index (counting
/// audio frames only) as a little-endian `u32` right after the header.
pub struct Fixture {
    pub bytes: Vec<u8>,
    /// File offsets of the audio frames, in order.
    pub frame_offsets: Vec<u64>,
    pub data_start: u64,
    pub data_end: u64,
}

impl Fixture {
    pub fn frame_count(&self) -> usize {
        self.frame_offsets.len()
    }

    pub fn bytes(&self) -> Bytes {
        Bytes::from(self.bytes.clone())
    }
}

#[derive(Default)]
pub struct FixtureBuilder {
    bytes: Vec<u8>,
    frame_offsets: Vec<u64>,
    data_start: Option<u64>,
    id3v1: bool,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leading ID3v2.3 tag with a zero-filled body.
    pub fn id3v2(mut self, body_len: usize) -> Self {
        let size = body_len as u32;
        self.bytes.extend_from_slice(b"ID3");
        self.bytes.extend_from_slice(&[3, 0, 0]);
        for shift in [21, 14, 7, 0] {
            self.bytes.push(((size >> shift) & 0x7F) as u8);
        }
        self.bytes.resize(self.bytes.len() + body_len, 0);
        self
    }

    /// Xing summary frame announcing `frames` audio frames.
    pub fn xing(mut self, frames: u32) -> Self {
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..4].copy_from_slice(&header(STEREO));
        frame[XING_OFFSET..XING_OFFSET + 4].copy_from_slice(b"Xing");
        frame[XING_OFFSET + 4..XING_OFFSET + 8].copy_from_slice(&1u32.to_be_bytes());
        frame[XING_OFFSET + 8..XING_OFFSET + 12].copy_from_slice(&frames.to_be_bytes());
        self.bytes.extend_from_slice(&frame);
        self
    }

    /// A lone frame that is not part of the audio (stray header).
    pub fn stray_frame(mut self, mode: u8) -> Self {
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..4].copy_from_slice(&header(mode));
        frame[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        self.bytes.extend_from_slice(&frame);
        self
    }

    pub fn junk(mut self, len: usize) -> Self {
        self.bytes.resize(self.bytes.len() + len, 0);
        self
    }

    pub fn frames(mut self, count: usize, mode: u8) -> Self {
        for _ in 0..count {
            let index = self.frame_offsets.len() as u32;
            let offset = self.bytes.len() as u64;
            if self.data_start.is_none() {
                self.data_start = Some(offset);
            }
            self.frame_offsets.push(offset);

            let mut frame = vec![0u8; FRAME_LEN];
            frame[..4].copy_from_slice(&header(mode));
            frame[4..8].copy_from_slice(&index.to_le_bytes());
            self.bytes.extend_from_slice(&frame);
        }
        self
    }

    pub fn id3v1(mut self) -> Self {
        self.id3v1 = true;
        self
    }

    pub fn build(mut self) -> Fixture {
        let data_end = self.bytes.len() as u64;
        if self.id3v1 {
            let mut tag = vec![0u8; 128];
            tag[..3].copy_from_slice(b"TAG");
            tag[3..13].copy_from_slice(b"Test Title");
            self.bytes.extend_from_slice(&tag);
        }
        Fixture {
            data_start: self.data_start.unwrap_or(data_end),
            bytes: self.bytes,
            frame_offsets: self.frame_offsets,
            data_end,
        }
    }
}

/// `count` plain stereo frames.
pub fn stereo_fixture(count: usize) -> Fixture {
    FixtureBuilder::new().frames(count, STEREO).build()
}

// ----------------------------------------------------------------------------
// Decompressors
// ----------------------------------------------------------------------------

fn frame_tag(frame: &Mp3Frame) -> u16 {
    let mut index = [0u8; 4];
    index.copy_from_slice(&frame.data[4..8]);
    u32::from_le_bytes(index) as u16
}

/// Writes, for every sample, the frame index and (stereo) the sample index
/// within the frame as little-endian `u16`s.
fn render(frame: &Mp3Frame, format: &PcmFormat, output: &mut [u8]) -> usize {
    let block = format.block_align();
    let tag = frame_tag(frame).to_le_bytes();
    let samples = frame.sample_count() as usize;
    for sample in 0..samples {
        let at = sample * block;
        output[at..at + 2].copy_from_slice(&tag);
        if format.channels == 2 {
            output[at + 2..at + 4].copy_from_slice(&(sample as u16).to_le_bytes());
        }
    }
    samples * block
}

/// Decodes every frame to a recognizable PCM pattern immediately.
pub struct PatternDecompressor {
    format: PcmFormat,
    resets: Arc<AtomicUsize>,
}

impl PatternDecompressor {
    pub fn new(format: &Mp3Format, resets: Arc<AtomicUsize>) -> Self {
        Self {
            format: PcmFormat::pcm16(format.sample_rate, format.channels),
            resets,
        }
    }
}

impl FrameDecompressor for PatternDecompressor {
    fn output_format(&self) -> PcmFormat {
        self.format
    }

    fn decompress_frame(&mut self, frame: &Mp3Frame, output: &mut [u8]) -> core_playback::Result<usize> {
        Ok(render(frame, &self.format, output))
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// After construction or reset, returns nothing for the first frame and both
/// frames' output on the second.
pub struct DelayedDecompressor {
    format: PcmFormat,
    pending: Option<Vec<u8>>,
    primed: bool,
}

impl DelayedDecompressor {
    pub fn new(format: &Mp3Format) -> Self {
        Self {
            format: PcmFormat::pcm16(format.sample_rate, format.channels),
            pending: None,
            primed: false,
        }
    }
}

impl FrameDecompressor for DelayedDecompressor {
    fn output_format(&self) -> PcmFormat {
        self.format
    }

    fn decompress_frame(&mut self, frame: &Mp3Frame, output: &mut [u8]) -> core_playback::Result<usize> {
        if self.primed {
            return Ok(render(frame, &self.format, output));
        }
        match self.pending.take() {
            None => {
                let mut held = vec![0u8; output.len()];
                let n = render(frame, &self.format, &mut held);
                held.truncate(n);
                self.pending = Some(held);
                Ok(0)
            }
            Some(held) => {
                output[..held.len()].copy_from_slice(&held);
                let n = render(frame, &self.format, &mut output[held.len()..]);
                self.primed = true;
                Ok(held.len() + n)
            }
        }
    }

    fn reset(&mut self) {
        self.pending = None;
        self.primed = false;
    }
}

pub fn pattern_factory() -> DecompressorFactory {
    counting_pattern_factory(Arc::new(AtomicUsize::new(0)))
}

pub fn counting_pattern_factory(resets: Arc<AtomicUsize>) -> DecompressorFactory {
    Arc::new(move |format: &Mp3Format| {
        Ok(Box::new(PatternDecompressor::new(format, resets.clone())) as Box<dyn FrameDecompressor>)
    })
}

pub fn delayed_factory() -> DecompressorFactory {
    Arc::new(|format: &Mp3Format| {
        Ok(Box::new(DelayedDecompressor::new(format)) as Box<dyn FrameDecompressor>)
    })
}

/// `(frame index, sample index)` of the stereo sample at the start of `bytes`.
pub fn stereo_sample(bytes: &[u8]) -> (u16, u16) {
    (
        u16::from_le_bytes([bytes[0], bytes[1]]),
        u16::from_le_bytes([bytes[2], bytes[3]]),
    )
}

// ----------------------------------------------------------------------------
// HTTP
// ----------------------------------------------------------------------------

/// In-memory range server. Serves at most `max_chunk` bytes per response, so
/// every read past that needs a new request.
pub struct MockHttpServer {
    data: Bytes,
    max_chunk: usize,
    requests: AtomicUsize,
    stall: Mutex<Option<(u64, u64)>>,
    failing: Mutex<Option<(u64, u64)>>,
    hide_length: AtomicBool,
    release: watch::Sender<bool>,
}

impl MockHttpServer {
    pub fn new(data: Bytes, max_chunk: usize) -> Arc<Self> {
        let (release, _) = watch::channel(false);
        Arc::new(Self {
            data,
            max_chunk,
            requests: AtomicUsize::new(0),
            stall: Mutex::new(None),
            failing: Mutex::new(None),
            hide_length: AtomicBool::new(false),
            release,
        })
    }

    /// Requests starting inside `start..end` fail with a transport error.
    /// Responses that begin before `start` stop at it.
    pub fn fail_range(&self, start: u64, end: u64) {
        *self.failing.lock() = Some((start, end));
    }

    /// Answer like a server that does not know the resource length: HEAD
    /// carries no `Content-Length` and ranges end in `/*`.
    pub fn hide_length(&self) {
        self.hide_length.store(true, Ordering::SeqCst);
    }

    /// Requests starting inside `start..end` hang until [`release`] is
    /// called. Responses that begin before `start` stop at it.
    ///
    /// [`release`]: MockHttpServer::release
    pub fn stall_range(&self, start: u64, end: u64) {
        self.release.send_replace(false);
        *self.stall.lock() = Some((start, end));
    }

    pub fn release(&self) {
        *self.stall.lock() = None;
        self.release.send_replace(true);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn parse_range(request: &HttpRequest) -> Option<(u64, Option<u64>)> {
        let value = request
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("range"))
            .map(|(_, value)| value.as_str())?;
        let bounds = value.strip_prefix("bytes=")?;
        let (start, end) = bounds.split_once('-')?;
        let start = start.parse().ok()?;
        let end = if end.is_empty() {
            None
        } else {
            Some(end.parse().ok()?)
        };
        Some((start, end))
    }

    /// Wait out a stall covering `start`, then return the slice to serve.
    async fn serve(&self, start: u64, end: Option<u64>) -> BridgeResult<(u64, u64)> {
        let total = self.data.len() as u64;
        if start >= total {
            return Err(BridgeError::RangeNotSatisfiable);
        }

        let failing = *self.failing.lock();
        let mut last = end.map_or(total - 1, |end| end.min(total - 1));
        if let Some((fail_start, fail_end)) = failing {
            if start >= fail_start && start < fail_end {
                return Err(BridgeError::OperationFailed(
                    "Connection reset by peer".to_string(),
                ));
            } else if start < fail_start {
                last = last.min(fail_start - 1);
            }
        }

        let stall = *self.stall.lock();
        if let Some((stall_start, stall_end)) = stall {
            if start >= stall_start && start < stall_end {
                let mut released = self.release.subscribe();
                while !*released.borrow_and_update() {
                    if released.changed().await.is_err() {
                        return Err(BridgeError::Cancelled);
                    }
                }
            } else if start < stall_start {
                last = last.min(stall_start - 1);
            }
        }

        last = last.min(start.saturating_add(self.max_chunk.max(1) as u64 - 1));
        Ok((start, last))
    }

    fn partial_headers(&self, start: u64, last: u64) -> HashMap<String, String> {
        let total = if self.hide_length.load(Ordering::SeqCst) {
            "*".to_string()
        } else {
            self.data.len().to_string()
        };
        let mut headers = HashMap::new();
        headers.insert(
            "Content-Range".to_string(),
            format!("bytes {}-{}/{}", start, last, total),
        );
        headers.insert("Content-Length".to_string(), (last - start + 1).to_string());
        headers
    }
}

#[async_trait]
impl HttpClient for MockHttpServer {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if request.method == HttpMethod::Head {
            let mut headers = HashMap::new();
            if !self.hide_length.load(Ordering::SeqCst) {
                headers.insert("Content-Length".to_string(), self.data.len().to_string());
            }
            return Ok(HttpResponse {
                status: 200,
                headers,
                body: Bytes::new(),
            });
        }

        let (start, end) = Self::parse_range(&request).unwrap_or((0, None));
        let (start, last) = self.serve(start, end).await?;
        Ok(HttpResponse {
            status: 206,
            headers: self.partial_headers(start, last),
            body: self.data.slice(start as usize..=last as usize),
        })
    }

    async fn open_stream(&self, request: HttpRequest) -> BridgeResult<HttpStream> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let (start, end) = Self::parse_range(&request).unwrap_or((0, None));
        let (start, last) = self.serve(start, end).await?;
        let body = self.data.slice(start as usize..=last as usize).to_vec();
        Ok(HttpStream {
            status: 206,
            headers: self.partial_headers(start, last),
            body: Box::new(Cursor::new(body)),
        })
    }
}

// ----------------------------------------------------------------------------
// Sinks
// ----------------------------------------------------------------------------

/// Sink that records calls and lets the test pull audio by hand.
#[derive(Default)]
pub struct RecordingSink {
    provider: Mutex<Option<Arc<dyn SampleProvider>>>,
    calls: Mutex<Vec<&'static str>>,
    state: Mutex<Option<SinkState>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Pull `len` bytes the way an audio engine would.
    pub fn pull(&self, len: usize) -> Option<Vec<u8>> {
        let provider = self.provider.lock().clone()?;
        let mut buf = vec![0u8; len];
        let n = provider.read(&mut buf);
        buf.truncate(n);
        Some(buf)
    }

    fn record(&self, call: &'static str, state: SinkState) {
        self.calls.lock().push(call);
        *self.state.lock() = Some(state);
    }
}

impl AudioSink for RecordingSink {
    fn init(&self, provider: Arc<dyn SampleProvider>) -> BridgeResult<()> {
        *self.provider.lock() = Some(provider);
        self.record("init", SinkState::Paused);
        Ok(())
    }

    fn play(&self) -> BridgeResult<()> {
        self.record("play", SinkState::Playing);
        Ok(())
    }

    fn pause(&self) -> BridgeResult<()> {
        self.record("pause", SinkState::Paused);
        Ok(())
    }

    fn stop(&self) -> BridgeResult<()> {
        *self.provider.lock() = None;
        self.record("stop", SinkState::Stopped);
        Ok(())
    }

    fn state(&self) -> SinkState {
        self.state.lock().unwrap_or(SinkState::Uninitialized)
    }
}

mockall::mock! {
    pub Sink {}

    impl AudioSink for Sink {
        fn init(&self, provider: Arc<dyn SampleProvider>) -> BridgeResult<()>;
        fn play(&self) -> BridgeResult<()>;
        fn pause(&self) -> BridgeResult<()>;
        fn stop(&self) -> BridgeResult<()>;
        fn state(&self) -> SinkState;
    }
}
