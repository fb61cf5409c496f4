//! Recurring, non-reentrant archival timer

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Fires `on_tick` every interval on the blocking pool, one run at a time.
///
/// A tick that arrives while the previous run is still going is skipped.
pub struct ArchiveScheduler {
    shutdown_tx: broadcast::Sender<()>,
    stopped: AtomicBool,
    running: Arc<AtomicBool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    in_flight: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Clears the running flag even if the job panics
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ArchiveScheduler {
    /// Start ticking; the first tick fires one full `interval` from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(interval: Duration, on_tick: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let running = Arc::new(AtomicBool::new(false));
        let in_flight: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));
        let on_tick = Arc::new(on_tick);

        let ticker = {
            let running = Arc::clone(&running);
            let in_flight = Arc::clone(&in_flight);
            tokio::spawn(async move {
                let mut ticks = interval_at(Instant::now() + interval, interval);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                        _ = ticks.tick() => {
                            if running
                                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                                .is_err()
                            {
                                debug!("Archival run still in progress, skipping tick");
                                continue;
                            }

                            let job = Arc::clone(&on_tick);
                            let guard = RunGuard(Arc::clone(&running));
                            let handle = tokio::task::spawn_blocking(move || {
                                let _guard = guard;
                                job();
                            });
                            *in_flight.lock() = Some(handle);
                        }
                    }
                }
                debug!("Archive scheduler loop exited");
            })
        };

        info!("Archive scheduler started (interval {:?})", interval);
        Self {
            shutdown_tx,
            stopped: AtomicBool::new(false),
            running,
            ticker: Mutex::new(Some(ticker)),
            in_flight,
        }
    }

    /// Prevent future ticks. An in-flight run is left to finish.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        info!("Archive scheduler stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether a run is executing right now
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait for the in-flight run, if any. After [`stop`](Self::stop) this
    /// also waits for the timer loop to exit, so no run can start afterwards.
    pub async fn drain(&self) {
        if self.is_stopped() {
            let ticker = self.ticker.lock().take();
            if let Some(ticker) = ticker {
                if let Err(e) = ticker.await {
                    error!("Archive scheduler loop failed: {}", e);
                }
            }
        }

        let handle = self.in_flight.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Archival run panicked: {}", e);
            }
        }
    }
}

impl Drop for ArchiveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
