//! Bundle listing and count-based retention

use logvault_core::BundleName;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ArchiveError, Result};

/// Committed bundles in `dir`, oldest first
pub fn list_bundles(dir: &Path) -> Result<Vec<(BundleName, PathBuf)>> {
    let mut bundles = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ArchiveError::io(dir, e))? {
        let entry = entry.map_err(|e| ArchiveError::io(dir, e))?;
        let file_name = entry.file_name();
        if let Some(name) = BundleName::parse(&file_name.to_string_lossy()) {
            bundles.push((name, entry.path()));
        }
    }
    bundles.sort();
    Ok(bundles)
}

/// Delete the oldest bundles so that at most `keep` remain.
///
/// Returns the deleted paths and one error per bundle that could not be
/// removed.
pub fn prune_bundles(dir: &Path, keep: usize) -> (Vec<PathBuf>, Vec<ArchiveError>) {
    let bundles = match list_bundles(dir) {
        Ok(bundles) => bundles,
        Err(e) => return (Vec::new(), vec![e]),
    };

    if bundles.len() <= keep {
        debug!("{} bundles, retention limit {}", bundles.len(), keep);
        return (Vec::new(), Vec::new());
    }

    let excess = bundles.len() - keep;
    let mut pruned = Vec::new();
    let mut errors = Vec::new();
    for (_, path) in bundles.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Pruned bundle {}", path.display());
                pruned.push(path);
            }
            Err(e) => errors.push(ArchiveError::io(&path, e)),
        }
    }
    (pruned, errors)
}
