//! Rolling per-level counters.
//!
//! The engine records one increment per accepted entry before dispatch. The
//! periodic reporter calls [`StatsAggregator::take`], which swaps the counters
//! out under the same lock, so every increment lands in exactly one window.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::level::{LevelCounts, LogLevel};

struct Window {
    counts: LevelCounts,
    started_at: DateTime<Utc>,
}

/// Thread-safe per-level counters for the current window.
pub struct StatsAggregator {
    window: Mutex<Window>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(Window {
                counts: LevelCounts::default(),
                started_at: Utc::now(),
            }),
        }
    }

    /// Count one entry.
    pub fn record(&self, level: LogLevel) {
        self.window.lock().counts.increment(level);
    }

    /// Counts so far in the current window.
    pub fn snapshot(&self) -> LevelCounts {
        self.window.lock().counts
    }

    /// Close the current window and start a new one at zero.
    pub fn take(&self) -> StatsWindow {
        let now = Utc::now();
        let mut window = self.window.lock();
        let counts = std::mem::take(&mut window.counts);
        let started_at = std::mem::replace(&mut window.started_at, now);
        StatsWindow {
            counts,
            started_at,
            ended_at: now,
        }
    }

    /// Drop all counts without reporting them.
    pub fn reset(&self) {
        let mut window = self.window.lock();
        window.counts = LevelCounts::default();
        window.started_at = Utc::now();
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts for one closed reporting window.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsWindow {
    pub counts: LevelCounts,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl StatsWindow {
    pub fn total(&self) -> u64 {
        self.counts.total()
    }

    /// ERROR count divided by total; 0.0 for an empty window.
    pub fn error_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.counts.get(LogLevel::Error) as f64 / total as f64
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Properties payload for the summary business event.
    pub fn to_properties(&self) -> Value {
        let mut counts = serde_json::Map::new();
        for (level, count) in self.counts.iter() {
            counts.insert(level.as_str().to_string(), Value::from(count));
        }
        json!({
            "counts": counts,
            "total": self.total(),
            "error_rate": self.error_rate(),
            "window_start": self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "window_end": self.ended_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "window_secs": (self.ended_at - self.started_at).num_seconds(),
        })
    }
}
