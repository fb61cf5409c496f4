//! On-disk naming of rotated log files and archive bundles
//!
//! Rotated files live next to the active file as
//! `<active>.<YYYYmmdd-HHMMSS>.<seq>`, where the stamp is the UTC close time.
//! Bundles live in the destination directory as `<YYYYmmdd-HHMMSS-mmm>.archive`
//! and are written as `.<stamp>.archive.tmp` until verified. Both name
//! schemes sort lexicographically in chronological order.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::*;

static ROTATED_SUFFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\.(\d{8}-\d{6})\.(\d{1,9})$").expect("Invalid rotated suffix regex")
});

static BUNDLE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{8}-\d{6}-\d{3})\.archive$").expect("Invalid bundle name regex")
});

static TEMP_BUNDLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\.\d{8}-\d{6}-\d{3}\.archive\.tmp$").expect("Invalid temp bundle regex")
});

/// Identity of a rotated log file, ordered by close time then sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RotatedName {
    pub closed_at: DateTime<Utc>,
    pub sequence: u32,
}

impl RotatedName {
    /// Build a name for a file closed at `closed_at`, truncated to whole seconds
    pub fn new(closed_at: DateTime<Utc>, sequence: u32) -> Self {
        let closed_at = Utc
            .timestamp_opt(closed_at.timestamp(), 0)
            .single()
            .unwrap_or(closed_at);
        Self {
            closed_at,
            sequence,
        }
    }

    /// File name for this rotation of `active`
    pub fn file_name(&self, active: &str) -> String {
        format!(
            "{}.{}.{}",
            active,
            self.closed_at.format(ROTATED_STAMP_FORMAT),
            self.sequence
        )
    }

    /// Parse a directory entry name; `None` unless it is a rotation of `active`
    pub fn parse(active: &str, file_name: &str) -> Option<Self> {
        let suffix = file_name.strip_prefix(active)?;
        let caps = ROTATED_SUFFIX_REGEX.captures(suffix)?;
        let naive = NaiveDateTime::parse_from_str(&caps[1], ROTATED_STAMP_FORMAT).ok()?;
        let sequence = caps[2].parse().ok()?;
        Some(Self {
            closed_at: Utc.from_utc_datetime(&naive),
            sequence,
        })
    }

    /// Latest instant at which the file could have been closed.
    ///
    /// Stamps have second resolution, so the real close happened somewhere in
    /// `[closed_at, closed_at + 1s)`.
    pub fn closed_no_later_than(&self) -> DateTime<Utc> {
        self.closed_at + Duration::seconds(1)
    }
}

/// Identity of an archive bundle, ordered by creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleName {
    pub created_at: DateTime<Utc>,
}

impl BundleName {
    /// Build a bundle name for a run started at `created_at` (millisecond precision)
    pub fn new(created_at: DateTime<Utc>) -> Self {
        let created_at = Utc
            .timestamp_millis_opt(created_at.timestamp_millis())
            .single()
            .unwrap_or(created_at);
        Self { created_at }
    }

    fn stamp(&self) -> String {
        self.created_at.format(BUNDLE_STAMP_FORMAT).to_string()
    }

    /// Final file name of the committed bundle
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stamp(), BUNDLE_EXTENSION)
    }

    /// Hidden file name used while the bundle is written and verified
    pub fn temp_file_name(&self) -> String {
        format!(".{}.{}.{}", self.stamp(), BUNDLE_EXTENSION, TEMP_SUFFIX)
    }

    /// Parse a committed bundle file name
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = BUNDLE_NAME_REGEX.captures(file_name)?;
        let naive = NaiveDateTime::parse_from_str(&caps[1], BUNDLE_STAMP_FORMAT).ok()?;
        Some(Self {
            created_at: Utc.from_utc_datetime(&naive),
        })
    }

    /// Whether `file_name` is a leftover in-progress bundle
    pub fn is_temp_file_name(file_name: &str) -> bool {
        TEMP_BUNDLE_REGEX.is_match(file_name)
    }
}
