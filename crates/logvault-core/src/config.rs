//! Configuration file parsing for LogVault
//!
//! The configuration is read once at startup and is immutable afterwards.
//! Supported file formats:
//! - YAML (.yaml, .yml)
//! - TOML (.toml)
//! - JSON (.json)
//!
//! Parsing produces a [`RawConfig`] (every key optional, unknown keys
//! ignored); [`ConfigModel::load`] turns it into a validated model.

use serde::Deserialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{ConfigError, Result};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "toml" => Some(ConfigFormat::Toml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Rotation section as written in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawRotation {
    /// Rotate once the active file would exceed this many bytes
    pub max_size_bytes: Option<u64>,
    /// Rotate once the active file has been open this long
    pub max_age_seconds: Option<u64>,
    /// Rotated files kept plain in the log directory before archival
    pub backup_count: Option<usize>,
}

/// Archive section as written in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawArchive {
    pub interval_seconds: Option<u64>,
    pub grace_seconds: Option<u64>,
    pub destination_directory: Option<String>,
    /// Bundles to keep; 0 or absent keeps every bundle
    pub retention_count: Option<usize>,
    /// gzip level, 0-9
    pub compress_level: Option<u32>,
}

/// Parsed but unvalidated configuration mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfig {
    pub log_directory: Option<String>,
    pub active_file_name: Option<String>,
    pub level: Option<String>,
    pub console: Option<bool>,
    pub rotation: Option<RawRotation>,
    pub archive: Option<RawArchive>,
}

impl RawConfig {
    /// Load config from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;

        let content = fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Yaml => Self::from_yaml(content),
            ConfigFormat::Toml => Self::from_toml(content),
            ConfigFormat::Json => Self::from_json(content),
        }
    }

    /// Parse YAML config content. An empty document is an empty mapping.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        Self::from_mapping(value)
    }

    /// Parse TOML config content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: RawConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Parse JSON config content
    pub fn from_json(content: &str) -> Result<Self> {
        let config: RawConfig = serde_json::from_str(content)?;
        Ok(config)
    }

    /// Interpret an already-parsed YAML mapping
    pub fn from_mapping(value: serde_yaml::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: RawConfig = serde_yaml::from_value(value)?;
        Ok(config)
    }
}

/// Rotation thresholds. With neither threshold set the active file never rotates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationSettings {
    pub max_size_bytes: Option<u64>,
    pub max_age_seconds: Option<u64>,
    pub backup_count: usize,
}

impl RotationSettings {
    pub fn never() -> Self {
        Self {
            max_size_bytes: None,
            max_age_seconds: None,
            backup_count: DEFAULT_BACKUP_COUNT,
        }
    }

    /// Whether any rotation threshold is configured
    pub fn is_enabled(&self) -> bool {
        self.max_size_bytes.is_some() || self.max_age_seconds.is_some()
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_seconds.map(Duration::from_secs)
    }
}

/// Archival schedule and destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub interval_seconds: u64,
    pub grace_seconds: u64,
    pub destination_directory: PathBuf,
    pub retention_count: Option<usize>,
    pub compress_level: u32,
}

impl ArchiveSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_seconds)
    }
}

/// Validated, immutable configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigModel {
    pub log_directory: PathBuf,
    pub active_file_name: String,
    /// Filter directive for the logging pipeline (`trace` .. `error`, `off`)
    pub level: String,
    /// Mirror records to stdout
    pub console: bool,
    pub rotation: RotationSettings,
    pub archive: ArchiveSettings,
}

impl ConfigModel {
    /// Validate a raw mapping, apply defaults and resolve relative paths
    /// against `base_dir`.
    pub fn load(raw: RawConfig, base_dir: &Path) -> Result<Self> {
        let log_directory = resolve_path(
            base_dir,
            &require(raw.log_directory, "log-directory")?,
        );
        check_directory(&log_directory, "log-directory")?;

        let active_file_name = require(raw.active_file_name, "active-file-name")?;
        validate_file_name(&active_file_name)?;

        let level = normalize_level(raw.level.as_deref().unwrap_or(DEFAULT_LEVEL))?;

        let rotation = match raw.rotation {
            Some(r) => {
                if r.max_size_bytes == Some(0) {
                    return Err(ConfigError::invalid(
                        "rotation.max-size-bytes",
                        "must be greater than 0",
                    ));
                }
                if r.max_age_seconds == Some(0) {
                    return Err(ConfigError::invalid(
                        "rotation.max-age-seconds",
                        "must be greater than 0",
                    ));
                }
                RotationSettings {
                    max_size_bytes: r.max_size_bytes,
                    max_age_seconds: r.max_age_seconds,
                    backup_count: r.backup_count.unwrap_or(DEFAULT_BACKUP_COUNT),
                }
            }
            None => RotationSettings::never(),
        };

        let archive = raw.archive.ok_or_else(|| ConfigError::missing("archive"))?;
        let interval_seconds = require(archive.interval_seconds, "archive.interval-seconds")?;
        if interval_seconds == 0 {
            return Err(ConfigError::invalid(
                "archive.interval-seconds",
                "must be greater than 0",
            ));
        }

        let destination_directory = resolve_path(
            base_dir,
            &require(
                archive.destination_directory,
                "archive.destination-directory",
            )?,
        );
        check_directory(&destination_directory, "archive.destination-directory")?;

        let compress_level = archive.compress_level.unwrap_or(DEFAULT_COMPRESS_LEVEL);
        if compress_level > MAX_COMPRESS_LEVEL {
            return Err(ConfigError::invalid(
                "archive.compress-level",
                format!("must be between 0 and {}", MAX_COMPRESS_LEVEL),
            ));
        }

        let archive = ArchiveSettings {
            interval_seconds,
            // A file must sit out at least one full interval before it can be bundled
            grace_seconds: archive.grace_seconds.unwrap_or(interval_seconds),
            destination_directory,
            retention_count: archive.retention_count.filter(|&n| n > 0),
            compress_level,
        };

        Ok(Self {
            log_directory,
            active_file_name,
            level,
            console: raw.console.unwrap_or(false),
            rotation,
            archive,
        })
    }

    /// Validate an already-parsed YAML mapping
    pub fn from_mapping(value: serde_yaml::Value, base_dir: &Path) -> Result<Self> {
        Self::load(RawConfig::from_mapping(value)?, base_dir)
    }

    /// Load and validate a config file; relative paths resolve against its directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = RawConfig::load(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::load(raw, base_dir)
    }

    /// Find the first known config file in `dir` and load it
    pub fn find_and_load(dir: &Path) -> Result<(Self, PathBuf)> {
        for name in CONFIG_FILES {
            let path = dir.join(name);
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok((config, path));
            }
        }
        Err(ConfigError::NoConfigFile(dir.to_path_buf()))
    }

    /// Path of the active log file
    pub fn active_path(&self) -> PathBuf {
        self.log_directory.join(&self.active_file_name)
    }

    /// Create the log and destination directories and prove they accept writes
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.log_directory, &self.archive.destination_directory] {
            fs::create_dir_all(dir)?;
            probe_writable(dir)?;
        }
        Ok(())
    }
}

fn require<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| ConfigError::missing(key))
}

fn resolve_path(base_dir: &Path, value: &str) -> PathBuf {
    let p = Path::new(value);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

/// An existing path must be a writable directory; a missing one is created at startup
fn check_directory(path: &Path, key: &str) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if !meta.is_dir() => Err(ConfigError::invalid(
            key,
            format!("{} is not a directory", path.display()),
        )),
        Ok(meta) if meta.permissions().readonly() => {
            Err(ConfigError::NotWritable(path.to_path_buf()))
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn probe_writable(dir: &Path) -> Result<()> {
    let probe = dir.join(WRITE_PROBE_FILE);
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&probe)
        .map_err(|_| ConfigError::NotWritable(dir.to_path_buf()))?;
    fs::remove_file(&probe)?;
    Ok(())
}

fn validate_file_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if bad {
        return Err(ConfigError::invalid(
            "active-file-name",
            format!("'{}' is not a plain file name", name),
        ));
    }
    Ok(())
}

/// Accept the usual level names, including the aliases older configs use
fn normalize_level(level: &str) -> Result<String> {
    let normalized = match level.trim().to_lowercase().as_str() {
        "trace" | "notset" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        "off" => "off",
        _ => {
            return Err(ConfigError::invalid(
                "level",
                format!("unknown log level '{}'", level),
            ))
        }
    };
    Ok(normalized.to_string())
}
