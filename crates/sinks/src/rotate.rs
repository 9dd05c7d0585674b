//! Output path engine
//!
//! Resolves timestamped filenames from a strftime-style pattern and
//! decides when a timestamp has moved into a later rotation window.
//! Windows are `rotation_period` seconds wide and aligned on period
//! boundaries counted from the Unix epoch.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Filename pattern plus rotation window arithmetic.
#[derive(Debug, Clone)]
pub struct OutputPattern {
    pattern: String,
    period_secs: u64,
}

impl OutputPattern {
    /// `pattern` should already carry the sink's suggested extension.
    /// A `period_secs` of zero disables time-based rotation.
    pub fn new(pattern: String, period_secs: u64) -> Self {
        Self {
            pattern,
            period_secs,
        }
    }

    /// Expand the pattern for the given timestamp. Patterns without
    /// conversion specifiers resolve to themselves.
    pub fn filename(&self, timestamp: DateTime<Utc>) -> PathBuf {
        PathBuf::from(timestamp.format(&self.pattern).to_string())
    }

    /// True iff `timestamp` falls in a later rotation window than the
    /// one the current file was opened in.
    pub fn need_rotate(&self, timestamp: DateTime<Utc>, opened_at: DateTime<Utc>) -> bool {
        if self.period_secs == 0 {
            return false;
        }
        self.window(timestamp) > self.window(opened_at)
    }

    fn window(&self, t: DateTime<Utc>) -> i64 {
        t.timestamp().div_euclid(self.period_secs as i64)
    }
}

#[cfg(test)]
#[path = "rotate_test.rs"]
mod rotate_test;
