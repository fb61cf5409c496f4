//! Rotation policy for the active log file

use logvault_core::RotationSettings;
use std::time::Duration;

/// Why the active file is being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTrigger {
    Size,
    Age,
}

/// Decides when the active log file must be closed.
///
/// An empty file is never rotated, and with no thresholds the policy never
/// fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    max_size_bytes: Option<u64>,
    max_age: Option<Duration>,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::never()
    }
}

impl From<&RotationSettings> for RotationPolicy {
    fn from(settings: &RotationSettings) -> Self {
        Self::new(settings.max_size_bytes, settings.max_age())
    }
}

impl RotationPolicy {
    pub fn new(max_size_bytes: Option<u64>, max_age: Option<Duration>) -> Self {
        Self {
            max_size_bytes,
            max_age,
        }
    }

    pub fn never() -> Self {
        Self::new(None, None)
    }

    /// Check before appending `incoming` bytes to a file holding `current_size`
    /// bytes that has been open for `age`.
    ///
    /// Size wins over age. Rotating before the append keeps every rotated
    /// file at or under the size limit unless a single record exceeds it.
    pub fn check_append(
        &self,
        current_size: u64,
        incoming: u64,
        age: Duration,
    ) -> Option<RotationTrigger> {
        if current_size == 0 {
            return None;
        }
        if let Some(max) = self.max_size_bytes {
            if current_size.saturating_add(incoming) > max {
                return Some(RotationTrigger::Size);
            }
        }
        self.check_age(current_size, age)
    }

    /// Periodic check with no pending record
    pub fn check_age(&self, current_size: u64, age: Duration) -> Option<RotationTrigger> {
        if current_size == 0 {
            return None;
        }
        match self.max_age {
            Some(max) if age >= max => Some(RotationTrigger::Age),
            _ => None,
        }
    }
}
