//! When to flush short-term memory into long-term memory

use serde::{Deserialize, Serialize};

pub const DEFAULT_SIZE_THRESHOLD: usize = 5;
pub const DEFAULT_TIME_THRESHOLD_MINUTES: i64 = 10;

/// Consolidate once the buffer holds `size_threshold` inputs or the epoch is
/// `time_threshold_minutes` old, whichever comes first.
///
/// The decision reads nothing but its two arguments, so replaying the same
/// inputs against the same elapsed times always reaches the same decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationPolicy {
    pub size_threshold: usize,
    pub time_threshold_minutes: i64,
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            time_threshold_minutes: DEFAULT_TIME_THRESHOLD_MINUTES,
        }
    }
}

impl ConsolidationPolicy {
    pub fn new(size_threshold: usize, time_threshold_minutes: i64) -> Self {
        Self {
            size_threshold,
            time_threshold_minutes,
        }
    }

    pub fn should_consolidate(&self, buffer_len: usize, epoch_elapsed_minutes: i64) -> bool {
        buffer_len >= self.size_threshold || epoch_elapsed_minutes >= self.time_threshold_minutes
    }
}
