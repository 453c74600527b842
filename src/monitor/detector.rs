//! Adaptive latency anomaly detection.
//!
//! Each target gets its own [`Detector`], which learns a baseline with an
//! exponentially weighted moving average (EWMA) and a dispersion estimate
//! with an exponentially weighted mean absolute deviation (EWMAD). A sample
//! is a candidate anomaly when its one-sided z-score exceeds the threshold;
//! [`REQUIRED_FAILURES`] candidates in a row declare the target down.

/// Consecutive over-threshold samples needed before a target is `Down`.
pub const REQUIRED_FAILURES: u32 = 3;

/// Substituted for a zero EWMAD so the z-score stays defined.
pub const EWMAD_FLOOR: f64 = 0.001;

/// Classification of a single latency sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// First sample; the baseline has just been seeded.
    Training,
    Up,
    /// Over threshold, but not yet for long enough to call it down.
    Unstable,
    Down,
}

impl Label {
    pub fn status_text(self) -> &'static str {
        match self {
            Label::Training => "Learning Baseline...",
            Label::Up => "Operational",
            Label::Unstable => "Warning: Unstable",
            Label::Down => "CRITICAL: High Latency",
        }
    }
}

/// Online EWMA/EWMAD detector with consecutive-failure voting.
///
/// The baseline keeps absorbing every sample, including those seen while the
/// target is `Unstable` or `Down`, so a sustained slowdown eventually becomes
/// the new normal.
#[derive(Debug, Clone)]
pub struct Detector {
    alpha: f64,
    threshold: f64,
    ewma: f64,
    ewmad: f64,
    initialized: bool,
    consecutive_anomalies: u32,
}

impl Detector {
    /// Create a detector with smoothing factor `alpha` in (0, 1) and a
    /// positive z-score `threshold`.
    pub fn new(alpha: f64, threshold: f64) -> Self {
        Self {
            alpha,
            threshold,
            ewma: 0.0,
            ewmad: 1.0,
            initialized: false,
            consecutive_anomalies: 0,
        }
    }

    /// Feed one latency sample in milliseconds.
    ///
    /// Returns the label and whether this sample is an anomaly event (only
    /// true for `Down`).
    pub fn update(&mut self, sample: f64) -> (Label, bool) {
        if !self.initialized {
            self.ewma = sample;
            self.initialized = true;
            return (Label::Training, false);
        }

        self.ewma = self.alpha * sample + (1.0 - self.alpha) * self.ewma;

        let deviation = (sample - self.ewma).abs();
        self.ewmad = self.alpha * deviation + (1.0 - self.alpha) * self.ewmad;

        if self.ewmad == 0.0 {
            self.ewmad = EWMAD_FLOOR;
        }

        // One-sided: faster than baseline never counts against a target.
        let z = (sample - self.ewma) / self.ewmad;

        if z > self.threshold {
            self.consecutive_anomalies += 1;
            if self.consecutive_anomalies >= REQUIRED_FAILURES {
                (Label::Down, true)
            } else {
                (Label::Unstable, false)
            }
        } else {
            self.consecutive_anomalies = 0;
            (Label::Up, false)
        }
    }

    /// Current learned baseline in milliseconds.
    pub fn ewma(&self) -> f64 {
        self.ewma
    }

    pub fn ewmad(&self) -> f64 {
        self.ewmad
    }

    pub fn consecutive_anomalies(&self) -> u32 {
        self.consecutive_anomalies
    }
}
