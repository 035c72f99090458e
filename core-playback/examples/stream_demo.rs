//! # Streaming Demo
//!
//! Streams an MP3 from a local path or an HTTP URL into a sink that discards
//! audio at real-time speed, printing controller events as they happen.
//!
//! Run with: `cargo run --example stream_demo --package core-playback -- <path-or-url>`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use bridge_desktop::ReqwestHttpClient;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::playback::{AudioSink, SampleProvider, SinkState};
use core_playback::decoder::symphonia_factory;
use core_playback::{MediaLocation, PlaybackEvent, StreamingConfig, StreamingController};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use parking_lot::Mutex;

const PUMP_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================================
// Null Sink
// ============================================================================

/// Pulls PCM at the stream's byte rate and throws it away.
#[derive(Default)]
struct NullSink {
    provider: Mutex<Option<Arc<dyn SampleProvider>>>,
    state: Mutex<Option<SinkState>>,
    playing: AtomicBool,
    consumed: AtomicU64,
}

impl NullSink {
    fn spawn_pump(self: &Arc<Self>) {
        let sink = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PUMP_INTERVAL);
            let mut buf = Vec::new();
            loop {
                interval.tick().await;
                if !sink.playing.load(Ordering::Acquire) {
                    continue;
                }
                let Some(provider) = sink.provider.lock().clone() else {
                    continue;
                };
                let format = provider.format();
                let bytes = format.average_bytes_per_second() as u128 * PUMP_INTERVAL.as_millis()
                    / 1000;
                let align = format.block_align().max(1);
                buf.resize(bytes as usize / align * align, 0);
                let read = provider.read(&mut buf);
                sink.consumed.fetch_add(read as u64, Ordering::Relaxed);
            }
        });
    }
}

impl AudioSink for NullSink {
    fn init(&self, provider: Arc<dyn SampleProvider>) -> BridgeResult<()> {
        *self.provider.lock() = Some(provider);
        *self.state.lock() = Some(SinkState::Paused);
        Ok(())
    }

    fn play(&self) -> BridgeResult<()> {
        self.playing.store(true, Ordering::Release);
        *self.state.lock() = Some(SinkState::Playing);
        Ok(())
    }

    fn pause(&self) -> BridgeResult<()> {
        self.playing.store(false, Ordering::Release);
        *self.state.lock() = Some(SinkState::Paused);
        Ok(())
    }

    fn stop(&self) -> BridgeResult<()> {
        self.playing.store(false, Ordering::Release);
        *self.provider.lock() = None;
        *self.state.lock() = Some(SinkState::Stopped);
        Ok(())
    }

    fn state(&self) -> SinkState {
        self.state.lock().unwrap_or(SinkState::Uninitialized)
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))
        .context("failed to initialize logging")?;

    let Some(target) = std::env::args().nth(1) else {
        bail!("usage: stream_demo <path-or-url>");
    };

    let (location, config) = if target.starts_with("http://") || target.starts_with("https://") {
        (MediaLocation::remote(target), StreamingConfig::network_streaming())
    } else {
        (MediaLocation::local(target), StreamingConfig::local_playback())
    };

    let sink = Arc::new(NullSink::default());
    sink.spawn_pump();

    let controller = StreamingController::with_http_client(
        config,
        sink.clone(),
        symphonia_factory(),
        Arc::new(ReqwestHttpClient::new()),
    );
    let mut events = controller.subscribe();

    controller.open(location).await?;
    controller.play().await?;

    if let Some(info) = controller.stream_info() {
        println!(
            "{} Hz, {} channel(s), {} kbps",
            info.format.sample_rate, info.format.channels, info.format.bitrate_kbps
        );
    }

    let mut progress = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(PlaybackEvent::Stopped { error: Some(error) }) => bail!("playback failed: {error}"),
                Ok(PlaybackEvent::Stopped { error: None }) => break,
                Ok(event) => println!("event: {}", serde_json::to_string(&event)?),
                Err(e) => bail!("event stream closed: {e}"),
            },
            _ = progress.tick() => {
                println!(
                    "{:>6.1}s / {:>6.1}s  buffered {:>5} ms",
                    controller.position().as_secs_f64(),
                    controller.duration().unwrap_or_default().as_secs_f64(),
                    controller.buffered_duration().as_millis(),
                );
            }
            _ = tokio::signal::ctrl_c() => {
                controller.stop().await;
                break;
            }
        }
    }

    let stats = controller.stats();
    println!(
        "done: {} bytes played, {} underruns, {} seeks",
        sink.consumed.load(Ordering::Relaxed),
        stats.underrun_count,
        stats.seek_count
    );
    Ok(())
}
