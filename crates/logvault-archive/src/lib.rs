//! LogVault Archive - Bundling, verification and retention of rotated log files

mod archiver;
pub mod bundle;
mod error;
mod retention;
mod scheduler;

pub use archiver::{ArchiveOutcome, ArchiveReport, Archiver};
pub use error::{ArchiveError, Result};
pub use retention::{list_bundles, prune_bundles};
pub use scheduler::ArchiveScheduler;
