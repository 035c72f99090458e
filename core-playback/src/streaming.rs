//! # Streaming Controller
//!
//! Buffering state machine for one MP3 stream at a time.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Producer task (tokio)            │
//! │                                         │
//! │  1. Read compressed frames (FrameSource)│
//! │  2. Decode (SeekableDecodedStream)      │
//! │  3. Append to BufferedSampleStore       │
//! └────────────┬────────────────────────────┘
//!              │ PCM bytes
//!              ▼
//! ┌─────────────────────────────────────────┐
//! │      BufferedSampleStore (shared)       │
//! └──────┬─────────────────────────┬────────┘
//!        │ fill level              │ PCM bytes
//!        ▼                         ▼
//! ┌───────────────┐       ┌─────────────────┐
//! │ tick() / clock│       │   AudioSink     │
//! └───────────────┘       └─────────────────┘
//! ```
//!
//! ## States
//!
//! | From | Trigger | To |
//! |------|---------|----|
//! | `Stopped` | `play()` | `Buffering` |
//! | `Buffering` | tick, buffered ≥ high watermark | `Playing` |
//! | `Playing` | tick, buffered < low watermark, still downloading | `Buffering` |
//! | `Buffering`/`Playing` | tick, fully downloaded and buffer empty | `Stopped` |
//! | any active | `pause()` | `Paused` |
//! | `Paused` | `play()` | `Buffering` |
//! | any | `stop()` | `Stopped` |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use core_playback::{MediaLocation, StreamingConfig, StreamingController};
//! use core_playback::decoder::symphonia_factory;
//! # async fn run(sink: Arc<dyn bridge_traits::playback::AudioSink>) -> core_playback::Result<()> {
//! let controller = StreamingController::new(
//!     StreamingConfig::local_playback(),
//!     sink,
//!     symphonia_factory(),
//! );
//! controller.open(MediaLocation::local("song.mp3")).await?;
//! controller.play().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bridge_traits::http::HttpClient;
use bridge_traits::playback::{AudioSink, PcmFormat, SampleProvider};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::PlaybackClock;
use crate::config::{AtomicPlaybackState, PlaybackState, StreamingConfig, StreamingStats};
use crate::decoded_stream::{DecodedStreamOptions, SeekableDecodedStream, SharedDecodedStream};
use crate::decoder::DecompressorFactory;
use crate::error::{PlaybackError, Result};
use crate::events::{PlaybackEvent, EVENT_CHANNEL_CAPACITY};
use crate::sample_store::BufferedSampleStore;
use crate::scanner::StreamInfo;
use crate::source::{open_source, MediaLocation, SourceOptions};

// ============================================================================
// Shared State
// ============================================================================

/// State read and written by the controller, the producer task and the clock.
struct SharedState {
    state: AtomicPlaybackState,
    fully_downloaded: AtomicBool,
    /// Bumped on every seek so a producer idling at end of data resumes.
    seek_generation: AtomicU64,
    /// Set under the stream lock by a producer that exited at end of data.
    producer_exited: AtomicBool,
    /// Decoded byte position of the producer.
    decoded_position: AtomicU64,
    /// Decoded length in bytes, refreshed as the index grows.
    decoded_length: AtomicU64,
    stats: Mutex<StreamingStats>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl SharedState {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: AtomicPlaybackState::default(),
            fully_downloaded: AtomicBool::new(false),
            seek_generation: AtomicU64::new(0),
            producer_exited: AtomicBool::new(false),
            decoded_position: AtomicU64::new(0),
            decoded_length: AtomicU64::new(0),
            stats: Mutex::new(StreamingStats::default()),
            events,
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Store `to` unconditionally; returns the previous state.
    fn set_state(&self, to: PlaybackState) -> PlaybackState {
        let from = self.state.swap(to);
        if from != to {
            info!(?from, ?to, "Playback state changed");
            self.emit(PlaybackEvent::StateChanged { from, to });
        }
        from
    }

    /// Move `from` -> `to` if no other transition got there first.
    fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        let moved = self.state.transition(from, to);
        if moved {
            info!(?from, ?to, "Playback state changed");
            self.emit(PlaybackEvent::StateChanged { from, to });
        }
        moved
    }

    fn record_stream(&self, stream: &SeekableDecodedStream) {
        self.decoded_position
            .store(stream.position(), Ordering::Release);
        self.decoded_length.store(stream.length(), Ordering::Release);
    }
}

// ============================================================================
// Session
// ============================================================================

/// Everything that lives from `play()` on a stopped controller until `stop()`.
struct Session {
    stream: SharedDecodedStream,
    store: Arc<BufferedSampleStore>,
    format: PcmFormat,
    info: StreamInfo,
    decoded_frame_bytes: usize,
    cancel: CancellationToken,
    producer: Option<JoinHandle<()>>,
    clock: Option<PlaybackClock>,
}

impl Session {
    fn bytes_to_time(&self, bytes: u64) -> Duration {
        let bytes_per_second = self.format.average_bytes_per_second();
        if bytes_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / bytes_per_second as f64)
    }
}

// ============================================================================
// StreamingController
// ============================================================================

struct ControllerInner {
    config: StreamingConfig,
    sink: Arc<dyn AudioSink>,
    http_client: Option<Arc<dyn HttpClient>>,
    decompressor_factory: DecompressorFactory,
    shared: Arc<SharedState>,
    location: Mutex<Option<MediaLocation>>,
    session: Mutex<Option<Session>>,
    /// Session detached by `tick` at end of stream, waiting to be released.
    retired: Mutex<Option<Session>>,
    /// Serializes teardowns so `stop()` returns only after the sink is stopped.
    teardown_lock: tokio::sync::Mutex<()>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let sessions = [self.session.get_mut().take(), self.retired.get_mut().take()];
        for session in sessions.into_iter().flatten() {
            session.cancel.cancel();
            if let Some(clock) = &session.clock {
                clock.stop();
            }
        }
    }
}

/// Drives one stream from a [`MediaLocation`] into an [`AudioSink`].
///
/// Cheap to clone; clones share the same stream.
#[derive(Clone)]
pub struct StreamingController {
    inner: Arc<ControllerInner>,
}

impl StreamingController {
    pub fn new(
        config: StreamingConfig,
        sink: Arc<dyn AudioSink>,
        decompressor_factory: DecompressorFactory,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                sink,
                http_client: None,
                decompressor_factory,
                shared: Arc::new(SharedState::new()),
                location: Mutex::new(None),
                session: Mutex::new(None),
                retired: Mutex::new(None),
                teardown_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Same as [`new`](Self::new), with an HTTP client for remote locations.
    pub fn with_http_client(
        config: StreamingConfig,
        sink: Arc<dyn AudioSink>,
        decompressor_factory: DecompressorFactory,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                sink,
                http_client: Some(http_client),
                decompressor_factory,
                shared: Arc::new(SharedState::new()),
                location: Mutex::new(None),
                session: Mutex::new(None),
                retired: Mutex::new(None),
                teardown_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.inner.config
    }

    /// Select the stream the next `play()` starts. Stops any current stream.
    pub async fn open(&self, location: MediaLocation) -> Result<()> {
        self.inner
            .config
            .validate()
            .map_err(core_runtime::Error::Config)?;

        self.stop().await;
        info!(remote = location.is_remote(), "Opened media location");
        *self.inner.location.lock() = Some(location);
        Ok(())
    }

    /// Start or resume playback.
    ///
    /// From `Stopped` this opens the source and scans it; probe and format
    /// errors are returned here. From `Paused` playback resumes through
    /// `Buffering`.
    pub async fn play(&self) -> Result<()> {
        match self.state() {
            PlaybackState::Buffering | PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                self.inner
                    .shared
                    .transition(PlaybackState::Paused, PlaybackState::Buffering);
                Ok(())
            }
            PlaybackState::Stopped => self.start_session().await,
        }
    }

    /// Pause the sink. The producer keeps filling the buffer.
    pub fn pause(&self) {
        let shared = &self.inner.shared;
        loop {
            let current = shared.state.load();
            if !matches!(current, PlaybackState::Buffering | PlaybackState::Playing) {
                return;
            }
            if shared.transition(current, PlaybackState::Paused) {
                break;
            }
        }
        if let Err(e) = self.inner.sink.pause() {
            warn!(error = %e, "Sink failed to pause");
        }
    }

    /// Stop playback and release the source and decoder.
    ///
    /// Waits at most `stop_timeout` for the producer to exit, then aborts it.
    pub async fn stop(&self) {
        let previous = self.inner.shared.set_state(PlaybackState::Stopped);
        self.teardown().await;
        if previous != PlaybackState::Stopped {
            self.inner.shared.emit(PlaybackEvent::Stopped { error: None });
        }
    }

    /// Evaluate buffer level and drive the state machine. Called by the
    /// playback clock; hosts running without `auto_clock` call it themselves.
    pub fn tick(&self) -> PlaybackState {
        let shared = &self.inner.shared;
        let state = shared.state.load();
        let Some(store) = self.sample_store() else {
            return state;
        };

        let buffered_bytes = store.buffered_bytes();
        let buffered = store.buffered_duration();
        let fully_downloaded = self.is_fully_downloaded();
        shared.stats.lock().underrun_count = store.underrun_count();

        match state {
            PlaybackState::Buffering | PlaybackState::Playing
                if fully_downloaded && buffered_bytes == 0 =>
            {
                if shared.transition(state, PlaybackState::Stopped) {
                    info!("End of stream");
                    shared.emit(PlaybackEvent::Stopped { error: None });
                    self.retire_session();
                }
            }
            PlaybackState::Buffering
                if buffered >= self.inner.config.high_watermark
                    || (fully_downloaded && buffered_bytes > 0) =>
            {
                if shared.transition(PlaybackState::Buffering, PlaybackState::Playing) {
                    debug!(buffered_ms = buffered.as_millis() as u64, "Buffer filled");
                    if let Err(e) = self.inner.sink.play() {
                        warn!(error = %e, "Sink failed to start");
                    }
                }
            }
            PlaybackState::Playing
                if buffered < self.inner.config.low_watermark && !fully_downloaded =>
            {
                if shared.transition(PlaybackState::Playing, PlaybackState::Buffering) {
                    debug!(buffered_ms = buffered.as_millis() as u64, "Buffer low, rebuffering");
                    if let Err(e) = self.inner.sink.pause() {
                        warn!(error = %e, "Sink failed to pause");
                    }
                }
            }
            _ => {}
        }

        shared.state.load()
    }

    /// Jump to `position`, clamped to the stream. Buffered audio is dropped.
    ///
    /// # Errors
    ///
    /// - `NoTrackLoaded` when nothing is playing
    /// - source errors raised while repositioning
    #[instrument(skip(self))]
    pub async fn seek(&self, position: Duration) -> Result<()> {
        let (stream, store, format) = {
            let session = self.inner.session.lock();
            let session = session.as_ref().ok_or(PlaybackError::NoTrackLoaded)?;
            (session.stream.clone(), session.store.clone(), session.format)
        };
        let shared = &self.inner.shared;

        let target = (position.as_secs_f64() * format.average_bytes_per_second() as f64) as u64;
        let resume = {
            let mut stream = stream.lock().await;
            stream.set_position(target).await?;
            store.clear_buffer();
            shared.record_stream(&stream);
            shared.fully_downloaded.store(false, Ordering::Release);
            shared.seek_generation.fetch_add(1, Ordering::AcqRel);
            shared.producer_exited.swap(false, Ordering::AcqRel)
        };
        shared.stats.lock().seek_count += 1;

        if resume {
            self.restart_producer();
        }
        debug!(position_ms = position.as_millis() as u64, "Seek complete");
        Ok(())
    }

    /// Seek relative to the current position.
    pub async fn skip(&self, seconds: i64) -> Result<()> {
        let current = self.position().as_secs_f64();
        let target = (current + seconds as f64).max(0.0);
        let target = match self.duration() {
            Some(duration) => target.min(duration.as_secs_f64()),
            None => target,
        };
        self.seek(Duration::from_secs_f64(target)).await
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.shared.state.load()
    }

    /// Playback position: what the producer decoded minus what is still
    /// buffered.
    pub fn position(&self) -> Duration {
        let session = self.inner.session.lock();
        let Some(session) = session.as_ref() else {
            return Duration::ZERO;
        };
        let decoded = self.inner.shared.decoded_position.load(Ordering::Acquire);
        let played = decoded.saturating_sub(session.store.buffered_bytes() as u64);
        session.bytes_to_time(played)
    }

    /// Total duration. An estimate until the seek index is complete.
    pub fn duration(&self) -> Option<Duration> {
        let session = self.inner.session.lock();
        let session = session.as_ref()?;
        let length = self.inner.shared.decoded_length.load(Ordering::Acquire);
        Some(session.bytes_to_time(length))
    }

    pub fn buffered_duration(&self) -> Duration {
        self.sample_store()
            .map(|store| store.buffered_duration())
            .unwrap_or_default()
    }

    /// Fraction of the stream played, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        match self.duration() {
            Some(duration) if !duration.is_zero() => {
                (self.position().as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    pub fn is_fully_downloaded(&self) -> bool {
        self.inner.shared.fully_downloaded.load(Ordering::Acquire)
    }

    /// What the probe learnt about the current stream.
    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.inner.session.lock().as_ref().map(|s| s.info.clone())
    }

    pub fn stats(&self) -> StreamingStats {
        let mut stats = self.inner.shared.stats.lock().clone();
        if let Some(store) = self.sample_store() {
            stats.underrun_count = store.underrun_count();
        }
        stats
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.shared.events.subscribe()
    }

    /// The store the sink pulls from, while a stream is open.
    pub fn sample_store(&self) -> Option<Arc<BufferedSampleStore>> {
        self.inner.session.lock().as_ref().map(|s| s.store.clone())
    }

    // ------------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------------

    #[instrument(skip(self))]
    async fn start_session(&self) -> Result<()> {
        let inner = &self.inner;
        let location = inner
            .location
            .lock()
            .clone()
            .ok_or(PlaybackError::NoTrackLoaded)?;

        // A finished stream may still hold its session.
        self.teardown().await;

        let cancel = CancellationToken::new();
        let options = SourceOptions::from_config(&inner.config, inner.http_client.clone(), cancel.clone());
        let source = open_source(&location, &options).await?;
        let stream = SeekableDecodedStream::open(
            source,
            &inner.decompressor_factory,
            DecodedStreamOptions::from_config(&inner.config, location.default_index_mode()),
        )
        .await?;

        let format = stream.output_format();
        let info = stream.info().clone();
        let decoded_frame_bytes = stream.decoded_frame_bytes();

        let store = Arc::new(
            BufferedSampleStore::new(format, inner.config.buffer_duration)
                .with_read_fully(inner.config.read_fully)
                .with_discard_on_overflow(inner.config.discard_on_overflow),
        );
        store.clear_buffer();

        inner
            .sink
            .init(store.clone() as Arc<dyn SampleProvider>)
            .and_then(|_| inner.sink.pause())
            .map_err(|e| PlaybackError::SinkError(e.to_string()))?;

        let shared = &inner.shared;
        shared.record_stream(&stream);
        shared.fully_downloaded.store(false, Ordering::Release);
        shared.producer_exited.store(false, Ordering::Release);
        *shared.stats.lock() = StreamingStats::default();

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            buffer_ms = store.buffer_duration().as_millis() as u64,
            "Starting stream"
        );

        let mut session = Session {
            stream: stream.into_shared(),
            store,
            format,
            info,
            decoded_frame_bytes,
            cancel,
            producer: None,
            clock: None,
        };
        shared.set_state(PlaybackState::Buffering);
        session.producer = Some(self.spawn_producer(&session));
        if inner.config.auto_clock {
            session.clock = Some(self.start_clock());
        }
        *inner.session.lock() = Some(session);
        Ok(())
    }

    fn spawn_producer(&self, session: &Session) -> JoinHandle<()> {
        let config = &self.inner.config;
        let bytes_per_second = session.format.average_bytes_per_second();
        let threshold = StreamingConfig::bytes_for(config.backpressure_threshold, bytes_per_second)
            .max(session.decoded_frame_bytes);

        let producer = Producer {
            stream: session.stream.clone(),
            store: session.store.clone(),
            shared: self.inner.shared.clone(),
            sink: self.inner.sink.clone(),
            cancel: session.cancel.clone(),
            chunk_bytes: session.decoded_frame_bytes,
            threshold_bytes: threshold,
            backpressure_sleep: config.backpressure_sleep,
        };
        tokio::spawn(producer.run())
    }

    /// Restart production after a seek once the producer has exited at end
    /// of data.
    fn restart_producer(&self) {
        let mut guard = self.inner.session.lock();
        let Some(session) = guard.as_mut() else {
            return;
        };
        if session.cancel.is_cancelled() || !self.state().is_active() {
            return;
        }
        debug!("Restarting producer after seek");
        session.producer = Some(self.spawn_producer(session));
    }

    fn start_clock(&self) -> PlaybackClock {
        let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);
        PlaybackClock::start(self.inner.config.clock_interval, move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            StreamingController { inner }.tick().is_active()
        })
    }

    /// Detach the finished session from a synchronous context (end of stream
    /// seen by `tick`) and release it in the background. Only the detached
    /// session is released, so a `play()` issued meanwhile keeps its own.
    fn retire_session(&self) {
        let Some(session) = self.inner.session.lock().take() else {
            return;
        };
        session.cancel.cancel();
        *self.inner.retired.lock() = Some(session);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let controller = self.clone();
            handle.spawn(async move {
                let _serial = controller.inner.teardown_lock.lock().await;
                controller.release_retired().await;
            });
        }
    }

    /// Release the retired session and then the current one.
    async fn teardown(&self) {
        let _serial = self.inner.teardown_lock.lock().await;
        self.release_retired().await;
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            self.release(session).await;
        }
    }

    /// Callers hold `teardown_lock`.
    async fn release_retired(&self) {
        let retired = self.inner.retired.lock().take();
        if let Some(session) = retired {
            self.release(session).await;
        }
    }

    async fn release(&self, mut session: Session) {
        session.cancel.cancel();
        if let Some(clock) = session.clock.take() {
            clock.stop();
        }

        if let Some(mut producer) = session.producer.take() {
            match tokio::time::timeout(self.inner.config.stop_timeout, &mut producer).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => error!(error = %e, "Producer task panicked"),
                Err(_) => {
                    warn!(
                        timeout_ms = self.inner.config.stop_timeout.as_millis() as u64,
                        "Producer did not stop in time, aborting"
                    );
                    producer.abort();
                }
            }
        }

        if let Err(e) = self.inner.sink.stop() {
            warn!(error = %e, "Sink failed to stop");
        }
        session.store.clear_buffer();

        let shared = &self.inner.shared;
        shared.decoded_position.store(0, Ordering::Release);
        shared.fully_downloaded.store(false, Ordering::Release);
        debug!("Stream released");
    }
}

// ============================================================================
// Producer
// ============================================================================

struct Producer {
    stream: SharedDecodedStream,
    store: Arc<BufferedSampleStore>,
    shared: Arc<SharedState>,
    sink: Arc<dyn AudioSink>,
    cancel: CancellationToken,
    chunk_bytes: usize,
    threshold_bytes: usize,
    backpressure_sleep: Duration,
}

impl Producer {
    #[instrument(name = "producer", skip(self))]
    async fn run(self) {
        match self.produce().await {
            Ok(()) => debug!("Producer finished"),
            Err(e) if e.is_cancellation() => debug!("Producer cancelled"),
            Err(e) => self.fail(e),
        }
    }

    async fn produce(&self) -> Result<()> {
        let mut chunk = vec![0u8; self.chunk_bytes];

        loop {
            if self.cancel.is_cancelled() || self.shared.state.load() == PlaybackState::Stopped {
                return Ok(());
            }

            if self.store.is_nearly_full(self.threshold_bytes) {
                self.sleep(self.backpressure_sleep).await?;
                continue;
            }

            let mut stream = self.cancellable(self.stream.lock()).await?;
            let started = Instant::now();
            let read = self.cancellable(stream.read(&mut chunk)).await??;
            if read > 0 {
                self.store.add_samples(&chunk[..read])?;
            }
            self.shared.record_stream(&stream);
            self.shared.stats.lock().record_decode(read, started.elapsed());

            if read > 0 {
                continue;
            }

            // End of data. Marked under the stream lock so a concurrent seek
            // cannot be overwritten.
            self.shared.fully_downloaded.store(true, Ordering::Release);
            let generation = self.shared.seek_generation.load(Ordering::Acquire);
            drop(stream);

            info!("Source fully read");
            self.shared.emit(PlaybackEvent::FullyDownloaded);
            if self.wait_for_drain(generation).await? {
                return Ok(());
            }
        }
    }

    /// Idle at end of data until the buffer empties (`true`) or a seek asks
    /// for more audio (`false`).
    async fn wait_for_drain(&self, generation: u64) -> Result<bool> {
        loop {
            if self.shared.seek_generation.load(Ordering::Acquire) != generation {
                debug!("Seek after end of data, resuming");
                return Ok(false);
            }
            if self.store.buffered_bytes() == 0 || self.shared.state.load() == PlaybackState::Stopped {
                // Decided under the stream lock, where seeks bump the generation.
                let _stream = self.cancellable(self.stream.lock()).await?;
                if self.shared.seek_generation.load(Ordering::Acquire) != generation {
                    continue;
                }
                self.shared.producer_exited.store(true, Ordering::Release);
                return Ok(true);
            }
            self.sleep(self.backpressure_sleep).await?;
        }
    }

    fn fail(&self, e: PlaybackError) {
        error!(error = %e, "Streaming failed");
        self.shared.set_state(PlaybackState::Stopped);
        if let Err(e) = self.sink.stop() {
            warn!(error = %e, "Sink failed to stop");
        }
        self.store.clear_buffer();
        self.cancel.cancel();
        self.shared.emit(PlaybackEvent::Stopped {
            error: Some(e.to_string()),
        });
    }

    async fn sleep(&self, duration: Duration) -> Result<()> {
        self.cancellable(tokio::time::sleep(duration)).await
    }

    async fn cancellable<F: Future>(&self, future: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PlaybackError::Cancelled),
            output = future => Ok(output),
        }
    }
}
