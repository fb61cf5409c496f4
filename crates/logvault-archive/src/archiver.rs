//! One archival run: reconcile, select, bundle, verify, commit, clean up, prune

use chrono::{DateTime, Duration, Utc};
use logvault_core::{BundleName, ConfigModel, RotatedName};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::bundle::{self, SourceFile};
use crate::error::{ArchiveError, Result};
use crate::retention;

/// What a run achieved
#[derive(Debug)]
pub enum ArchiveOutcome {
    /// Nothing was eligible; no bundle was written
    NoOp,
    /// A bundle was committed
    Archived { bundle: PathBuf },
    /// The run aborted before committing; sources are untouched
    Failed(ArchiveError),
}

/// Summary of one archival run
#[derive(Debug)]
pub struct ArchiveReport {
    pub started_at: DateTime<Utc>,
    pub outcome: ArchiveOutcome,
    /// Sources written into the new bundle and deleted
    pub archived: Vec<PathBuf>,
    /// Sources found intact in the newest existing bundle and deleted
    pub reconciled: Vec<PathBuf>,
    /// Rotated files kept plain by `backup-count`
    pub held_back: usize,
    /// Rotated files still inside their grace period
    pub in_grace: usize,
    pub pruned: Vec<PathBuf>,
    /// Non-fatal failures (source deletion, pruning, stale temp cleanup)
    pub errors: Vec<ArchiveError>,
}

impl ArchiveReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            outcome: ArchiveOutcome::NoOp,
            archived: Vec::new(),
            reconciled: Vec::new(),
            held_back: 0,
            in_grace: 0,
            pruned: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ArchiveOutcome::Failed(_))
    }

    pub fn bundle(&self) -> Option<&Path> {
        match &self.outcome {
            ArchiveOutcome::Archived { bundle } => Some(bundle),
            _ => None,
        }
    }
}

/// Moves rotated files out of the log directory into bundles
#[derive(Debug, Clone)]
pub struct Archiver {
    log_directory: PathBuf,
    active_file_name: String,
    destination: PathBuf,
    grace: Duration,
    backup_count: usize,
    retention_count: Option<usize>,
    compress_level: u32,
}

impl Archiver {
    pub fn new(config: &ConfigModel) -> Self {
        let grace_seconds = i64::try_from(config.archive.grace_seconds).unwrap_or(i64::MAX);
        Self {
            log_directory: config.log_directory.clone(),
            active_file_name: config.active_file_name.clone(),
            destination: config.archive.destination_directory.clone(),
            grace: Duration::try_seconds(grace_seconds).unwrap_or(Duration::MAX),
            backup_count: config.rotation.backup_count,
            retention_count: config.archive.retention_count,
            compress_level: config.archive.compress_level,
        }
    }

    /// Run once against the wall clock
    pub fn run_once(&self) -> ArchiveReport {
        self.run_once_at(Utc::now())
    }

    /// Run once as if the current time were `now`
    pub fn run_once_at(&self, now: DateTime<Utc>) -> ArchiveReport {
        let mut report = ArchiveReport::new(now);

        match self.archive(now, &mut report) {
            Ok(outcome) => report.outcome = outcome,
            Err(e) => {
                warn!("Archival run aborted: {}", e);
                report.outcome = ArchiveOutcome::Failed(e);
                return report;
            }
        }

        if let Some(keep) = self.retention_count {
            let (pruned, errors) = retention::prune_bundles(&self.destination, keep);
            report.pruned = pruned;
            report.errors.extend(errors);
        }

        for e in &report.errors {
            warn!("Archival run: {}", e);
        }
        report
    }

    fn archive(&self, now: DateTime<Utc>, report: &mut ArchiveReport) -> Result<ArchiveOutcome> {
        fs::create_dir_all(&self.destination).map_err(|e| ArchiveError::io(&self.destination, e))?;
        self.remove_stale_temp_bundles(report)?;

        let eligible = self.select(now, report)?;
        let mut sources = eligible
            .iter()
            .map(|path| SourceFile::inspect(path))
            .collect::<Result<Vec<_>>>()?;

        sources = self.reconcile(sources, report)?;
        if sources.is_empty() {
            debug!(
                "Nothing to archive ({} held back, {} in grace)",
                report.held_back, report.in_grace
            );
            return Ok(ArchiveOutcome::NoOp);
        }

        let name = BundleName::new(now);
        let final_path = self.destination.join(name.file_name());
        let temp_path = self.destination.join(name.temp_file_name());

        if let Err(e) = self.commit(&sources, &temp_path, &final_path) {
            bundle::cleanup_partial_bundle(&temp_path);
            return Err(e);
        }
        info!(
            "Archived {} rotated files into {}",
            sources.len(),
            final_path.display()
        );

        for source in sources {
            match fs::remove_file(&source.path) {
                Ok(()) => report.archived.push(source.path),
                Err(e) => report.errors.push(ArchiveError::io(&source.path, e)),
            }
        }

        Ok(ArchiveOutcome::Archived { bundle: final_path })
    }

    /// Write, verify and atomically publish the bundle
    fn commit(&self, sources: &[SourceFile], temp_path: &Path, final_path: &Path) -> Result<()> {
        if fs::symlink_metadata(final_path).is_ok() {
            return Err(ArchiveError::BundleExists(final_path.to_path_buf()));
        }

        bundle::write_bundle(sources, temp_path, self.compress_level)?;
        bundle::verify_bundle(temp_path, sources)?;

        if fs::symlink_metadata(final_path).is_ok() {
            return Err(ArchiveError::BundleExists(final_path.to_path_buf()));
        }
        fs::rename(temp_path, final_path).map_err(|e| ArchiveError::io(final_path, e))?;
        bundle::fsync_dir(&self.destination)
    }

    fn remove_stale_temp_bundles(&self, report: &mut ArchiveReport) -> Result<()> {
        let entries = fs::read_dir(&self.destination).map_err(|e| ArchiveError::io(&self.destination, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(&self.destination, e))?;
            if BundleName::is_temp_file_name(&entry.file_name().to_string_lossy()) {
                let path = entry.path();
                match fs::remove_file(&path) {
                    Ok(()) => info!("Removed stale temporary bundle {}", path.display()),
                    Err(e) => report.errors.push(ArchiveError::io(&path, e)),
                }
            }
        }
        Ok(())
    }

    /// Rotated files past their grace period, oldest first, minus the newest
    /// `backup_count` rotated files
    fn select(&self, now: DateTime<Utc>, report: &mut ArchiveReport) -> Result<Vec<PathBuf>> {
        let mut rotated = Vec::new();
        let entries =
            fs::read_dir(&self.log_directory).map_err(|e| ArchiveError::io(&self.log_directory, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(&self.log_directory, e))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name == self.active_file_name.as_str() {
                continue;
            }
            let Some(name) = RotatedName::parse(&self.active_file_name, &file_name) else {
                continue;
            };
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                rotated.push((name, entry.path()));
            }
        }
        rotated.sort();

        let held = self.backup_count.min(rotated.len());
        rotated.truncate(rotated.len() - held);
        report.held_back = held;

        let mut eligible = Vec::new();
        for (name, path) in rotated {
            let eligible_from = name.closed_no_later_than().checked_add_signed(self.grace);
            if eligible_from.is_some_and(|t| t <= now) {
                eligible.push(path);
            } else {
                report.in_grace += 1;
            }
        }
        Ok(eligible)
    }

    /// Delete sources already held intact by the newest bundle and return the rest
    fn reconcile(
        &self,
        sources: Vec<SourceFile>,
        report: &mut ArchiveReport,
    ) -> Result<Vec<SourceFile>> {
        if sources.is_empty() {
            return Ok(sources);
        }
        let Some((_, newest)) = retention::list_bundles(&self.destination)?.pop() else {
            return Ok(sources);
        };

        let members = match bundle::read_members(&newest) {
            Ok(members) => members,
            Err(e) => {
                report.errors.push(e);
                return Ok(sources);
            }
        };

        let mut remaining = Vec::with_capacity(sources.len());
        for source in sources {
            if members.iter().any(|m| source.matches(m)) {
                fs::remove_file(&source.path).map_err(|e| ArchiveError::io(&source.path, e))?;
                info!(
                    "{} already archived in {}, removed",
                    source.name,
                    newest.display()
                );
                report.reconciled.push(source.path);
            } else {
                remaining.push(source);
            }
        }
        Ok(remaining)
    }
}
