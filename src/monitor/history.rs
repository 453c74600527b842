//! Bounded per-target latency history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Maximum number of samples kept per target.
pub const HISTORY_CAPACITY: usize = 50;

/// Rolling window of samples and the times they were taken.
///
/// Values and timestamps are kept index-aligned; once the window is full the
/// oldest pair is evicted.
#[derive(Debug, Clone, Default)]
pub struct History {
    values: VecDeque<f64>,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, value: f64, timestamp: DateTime<Utc>) {
        self.values.push_back(value);
        self.timestamps.push_back(timestamp);

        while self.values.len() > HISTORY_CAPACITY {
            self.values.pop_front();
            self.timestamps.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Most recent value, if any.
    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.timestamps.iter().copied()
    }
}
