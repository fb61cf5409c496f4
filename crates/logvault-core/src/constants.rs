//! Constants and default values for LogVault

use std::path::PathBuf;

/// Application directory name under the user config dir
pub const APP_DIR: &str = "logvault";

/// Default config file names to search for (in priority order)
pub const CONFIG_FILES: &[&str] = &[
    // YAML formats
    "logvault.yaml",
    "logvault.yml",
    "config.yaml",
    "config.yml",
    // TOML formats
    "logvault.toml",
    // JSON formats
    "logvault.json",
];

/// Default log level directive
pub const DEFAULT_LEVEL: &str = "info";

/// Default gzip level for archive bundles
pub const DEFAULT_COMPRESS_LEVEL: u32 = 6;

/// Highest accepted gzip level
pub const MAX_COMPRESS_LEVEL: u32 = 9;

/// Default number of rotated files kept plain in the log directory
pub const DEFAULT_BACKUP_COUNT: usize = 0;

/// Timestamp format embedded in rotated file names (UTC)
pub const ROTATED_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Timestamp format used for bundle names (UTC, millisecond precision)
pub const BUNDLE_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

/// File extension of committed archive bundles
pub const BUNDLE_EXTENSION: &str = "archive";

/// Suffix appended to bundles that are still being written
pub const TEMP_SUFFIX: &str = "tmp";

/// Upper bound on sequence suffixes tried for one rotation
pub const MAX_ROTATION_ATTEMPTS: u32 = 1000;

/// Period of the age-based rotation check in seconds
pub const ROTATION_TICK_SECS: u64 = 1;

/// Name of the file used to probe directory writability
pub const WRITE_PROBE_FILE: &str = ".logvault-probe";

/// Get the per-user config directory for LogVault
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}
