//! Fixed-interval driver for [`StreamingController::tick`](crate::StreamingController::tick).

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Background task calling a tick callback at a fixed interval until stopped,
/// dropped, or the callback returns `false`.
#[derive(Debug)]
pub struct PlaybackClock {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PlaybackClock {
    /// Spawn the clock on the current tokio runtime. The first tick fires
    /// immediately.
    pub fn start<F>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !on_tick() {
                            break;
                        }
                    }
                }
            }
            debug!("Playback clock stopped");
        });

        Self { cancel, handle }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for PlaybackClock {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
