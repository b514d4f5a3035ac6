//! Worker status values and selection ranking.
//!
//! Pure ordering and capacity rules used by the registry when picking a
//! worker for a new submission.

use std::cmp::Ordering;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub const STATUS_HEALTHY: &str = "HEALTHY";
pub const STATUS_UNHEALTHY: &str = "UNHEALTHY";
pub const STATUS_UNKNOWN: &str = "UNKNOWN";

/// Reachability of a worker as last observed by a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Healthy,
    Unhealthy,
    /// Never checked.
    Unknown,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => STATUS_HEALTHY,
            Self::Unhealthy => STATUS_UNHEALTHY,
            Self::Unknown => STATUS_UNKNOWN,
        }
    }

    /// Parse a persisted status. Unrecognised values read as `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            STATUS_HEALTHY => Self::Healthy,
            STATUS_UNHEALTHY => Self::Unhealthy,
            _ => Self::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Sort key for candidate workers. Orders the preferred worker first:
/// priority descending, then queue length ascending, then name ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankKey<'a> {
    pub priority: i32,
    pub queue_length: i32,
    pub name: &'a str,
}

impl<'a> RankKey<'a> {
    pub fn new(priority: i32, queue_length: i32, name: &'a str) -> Self {
        Self {
            priority,
            queue_length,
            name,
        }
    }
}

impl Ord for RankKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.queue_length.cmp(&other.queue_length))
            .then_with(|| self.name.cmp(other.name))
    }
}

impl PartialOrd for RankKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A worker can take another job only while its queue is strictly below
/// its concurrency limit.
pub fn has_capacity(queue_length: i32, max_concurrent_jobs: i32) -> bool {
    queue_length < max_concurrent_jobs
}

/// Load estimate used when the live queue cannot be read: the larger of
/// the last observed queue length and the local job counter.
pub fn fallback_load(cached_queue_length: i32, current_jobs: i32) -> i32 {
    cached_queue_length.max(current_jobs)
}
