//! Main daemon orchestration

use anyhow::Result;
use logvault_archive::{ArchiveOutcome, ArchiveReport, ArchiveScheduler, Archiver};
use logvault_core::{ConfigModel, ROTATION_TICK_SECS};
use logvault_logs::{LogWriter, LoggingHandle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Main daemon struct
pub struct Daemon {
    config: ConfigModel,
    logging: LoggingHandle,
    archiver: Archiver,
    shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
    /// Prepare directories and install the logging pipeline
    pub fn new(config: ConfigModel, config_path: PathBuf) -> Result<Self> {
        config.ensure_directories()?;
        let logging = logvault_logs::init(&config)?;

        info!(
            "LogVault daemon starting with config {}",
            config_path.display()
        );
        info!(config = ?config, "Effective configuration");

        let archiver = Archiver::new(&config);
        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(Self {
            config,
            logging,
            archiver,
            shutdown_tx,
        })
    }

    /// Run until SIGINT or SIGTERM, then stop the timers and flush the sink
    pub async fn run(self) -> Result<()> {
        let scheduler = {
            let archiver = self.archiver.clone();
            ArchiveScheduler::start(self.config.archive.interval(), move || {
                log_report(&archiver.run_once());
            })
        };

        if !self.config.rotation.is_enabled() {
            warn!("No rotation thresholds configured, the active file is never rotated");
        }
        if let Some(max_age) = self.config.rotation.max_age() {
            debug!("Age-based rotation every {:?}", max_age);
            self.spawn_rotation_tick();
        }

        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

        info!("Daemon running, waiting for signals...");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
            }
        }

        let _ = self.shutdown_tx.send(());
        scheduler.stop();
        scheduler.drain().await;

        info!("Daemon shutdown complete");
        self.logging.shutdown()?;
        Ok(())
    }

    /// Periodically close the active file once it outlives `max-age-seconds`
    fn spawn_rotation_tick(&self) {
        let writer: LogWriter = self.logging.writer().clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(ROTATION_TICK_SECS));

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                    _ = interval.tick() => {
                        // Log only after the writer lock is released
                        match writer.rotate_if_due() {
                            Ok(Some(rotated)) => info!("Rotated log file to {}", rotated.display()),
                            Ok(None) => {}
                            Err(e) => warn!("Rotation check failed: {}", e),
                        }
                    }
                }
            }
        });
    }
}

fn log_report(report: &ArchiveReport) {
    match &report.outcome {
        ArchiveOutcome::Archived { bundle } => info!(
            archived = report.archived.len(),
            reconciled = report.reconciled.len(),
            pruned = report.pruned.len(),
            "Archival run committed {}",
            bundle.display()
        ),
        ArchiveOutcome::NoOp => debug!(
            reconciled = report.reconciled.len(),
            held_back = report.held_back,
            in_grace = report.in_grace,
            pruned = report.pruned.len(),
            "Archival run found nothing to archive"
        ),
        ArchiveOutcome::Failed(e) => error!("Archival run failed, will retry next tick: {}", e),
    }

    if !report.errors.is_empty() {
        warn!("Archival run finished with {} errors", report.errors.len());
    }
}
