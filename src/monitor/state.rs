//! Shared monitoring state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Detector, History};

pub type SharedState = Arc<RwLock<MonitorState>>;

pub(crate) fn read_state(state: &SharedState) -> RwLockReadGuard<'_, MonitorState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_state(state: &SharedState) -> RwLockWriteGuard<'_, MonitorState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

pub const STATUS_IDLE: &str = "Idle";
pub const STATUS_STOPPED: &str = "Stopped";

/// Everything known about one target, updated as a unit.
#[derive(Debug, Clone)]
pub struct TargetRecord {
    pub detector: Detector,
    pub history: History,
    /// Mirrors `detector.ewma()` as of the last recorded sample.
    pub baseline: f64,
    pub status: String,
    /// Last HTTP response code, 0 until the target has answered.
    pub last_code: u16,
}

impl TargetRecord {
    pub fn new(detector: Detector) -> Self {
        Self {
            detector,
            history: History::new(),
            baseline: 0.0,
            status: STATUS_IDLE.to_string(),
            last_code: 0,
        }
    }

    /// Append a sample and resync the displayed baseline with the detector.
    pub fn push_sample(&mut self, value: f64, timestamp: DateTime<Utc>) {
        self.history.append(value, timestamp);
        self.baseline = self.detector.ewma();
    }
}

/// Process-wide monitoring state.
///
/// Every monitoring session gets a new generation number; a poll loop only
/// writes while its own generation is the active one.
#[derive(Debug, Default)]
pub struct MonitorState {
    active: bool,
    generation: u64,
    seed: String,
    targets: Vec<String>,
    records: HashMap<String, TargetRecord>,
}

impl MonitorState {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Replace all per-target state and mark monitoring active.
    ///
    /// Returns the generation of the new session.
    pub fn begin_session(
        &mut self,
        seed: &str,
        targets: &[String],
        mut new_detector: impl FnMut() -> Detector,
    ) -> u64 {
        self.generation += 1;
        self.active = true;
        self.seed = seed.to_string();
        self.targets = targets.to_vec();
        self.records = targets
            .iter()
            .map(|t| (t.clone(), TargetRecord::new(new_detector())))
            .collect();
        self.generation
    }

    /// Mark monitoring inactive and every target stopped. History is kept.
    pub fn end_session(&mut self) {
        self.active = false;
        for record in self.records.values_mut() {
            record.status = STATUS_STOPPED.to_string();
        }
    }

    /// Whether a poll loop of `generation` may still write.
    pub fn accepts(&self, generation: u64) -> bool {
        self.active && self.generation == generation
    }

    pub fn record_mut(&mut self, target: &str) -> Option<&mut TargetRecord> {
        self.records.get_mut(target)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot {
            is_monitoring: self.active,
            target_url: self.seed.clone(),
            targets: self.targets.clone(),
            ..Default::default()
        };

        for (target, record) in &self.records {
            snapshot
                .current_latencies
                .insert(target.clone(), record.history.last().unwrap_or(0.0));
            snapshot.baseline_avgs.insert(target.clone(), record.baseline);
            snapshot.status_messages.insert(target.clone(), record.status.clone());
            snapshot.status_codes.insert(target.clone(), record.last_code);
            snapshot
                .histories
                .insert(target.clone(), record.history.values().collect());
            snapshot.timestamps.insert(
                target.clone(),
                record.history.timestamps().map(unix_seconds).collect(),
            );
        }

        snapshot
    }
}

/// Read-only view of the monitor, as served by the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub is_monitoring: bool,
    pub target_url: String,
    pub targets: Vec<String>,
    pub current_latencies: BTreeMap<String, f64>,
    pub baseline_avgs: BTreeMap<String, f64>,
    pub status_messages: BTreeMap<String, String>,
    pub status_codes: BTreeMap<String, u16>,
    pub histories: BTreeMap<String, Vec<f64>>,
    /// Unix seconds, index-aligned with `histories`.
    pub timestamps: BTreeMap<String, Vec<f64>>,
}

fn unix_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_millis() as f64 / 1000.0
}
