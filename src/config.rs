//! Configuration module for ServerPulse.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8000)
    pub http_port: u16,
    /// Idle time between two polling cycles (default: 1.5s)
    pub poll_interval: Duration,
    /// Timeout of a single probe (default: 10s)
    pub probe_timeout: Duration,
    /// Timeout of a single subdomain lookup (default: 2s)
    pub resolve_timeout: Duration,
    /// Number of targets probed at once; 1 probes serially (default: 1)
    pub probe_concurrency: usize,
    /// Detector smoothing factor (default: 0.15)
    pub alpha: f64,
    /// Detector z-score threshold (default: 2.0)
    pub threshold: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let monitor = MonitorConfig::default();
        Self {
            http_port: 8000,
            poll_interval: monitor.poll_interval,
            probe_timeout: monitor.probe_timeout,
            resolve_timeout: monitor.resolve_timeout,
            probe_concurrency: monitor.probe_concurrency,
            alpha: monitor.alpha,
            threshold: monitor.threshold,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SERVERPULSE_HTTP_PORT`: HTTP port (default: 8000)
    /// - `SERVERPULSE_POLL_INTERVAL_MS`: idle between cycles (default: 1500)
    /// - `SERVERPULSE_PROBE_TIMEOUT_MS`: per-probe timeout (default: 10000)
    /// - `SERVERPULSE_RESOLVE_TIMEOUT_MS`: per-lookup timeout (default: 2000)
    /// - `SERVERPULSE_PROBE_CONCURRENCY`: parallel probes per cycle (default: 1)
    /// - `SERVERPULSE_ALPHA`: smoothing factor in (0, 1) (default: 0.15)
    /// - `SERVERPULSE_THRESHOLD`: positive z-score threshold (default: 2.0)
    ///
    /// Unparsable or out-of-range values are ignored.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Some(port) = parse_var("SERVERPULSE_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(ms) = parse_var::<u64>("SERVERPULSE_POLL_INTERVAL_MS") {
            cfg.poll_interval = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>("SERVERPULSE_PROBE_TIMEOUT_MS").filter(|ms| *ms > 0) {
            cfg.probe_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>("SERVERPULSE_RESOLVE_TIMEOUT_MS").filter(|ms| *ms > 0) {
            cfg.resolve_timeout = Duration::from_millis(ms);
        }

        if let Some(n) = parse_var::<usize>("SERVERPULSE_PROBE_CONCURRENCY").filter(|n| *n > 0) {
            cfg.probe_concurrency = n;
        }

        if let Some(alpha) = parse_var::<f64>("SERVERPULSE_ALPHA").filter(|a| *a > 0.0 && *a < 1.0) {
            cfg.alpha = alpha;
        }

        if let Some(threshold) = parse_var::<f64>("SERVERPULSE_THRESHOLD").filter(|t| *t > 0.0) {
            cfg.threshold = threshold;
        }

        cfg
    }

    /// The subset of settings consumed by the monitoring engine.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: self.poll_interval,
            probe_timeout: self.probe_timeout,
            resolve_timeout: self.resolve_timeout,
            probe_concurrency: self.probe_concurrency,
            alpha: self.alpha,
            threshold: self.threshold,
        }
    }
}

/// Settings for one monitoring engine.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
    pub resolve_timeout: Duration,
    pub probe_concurrency: usize,
    pub alpha: f64,
    pub threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            probe_timeout: Duration::from_secs(10),
            resolve_timeout: Duration::from_secs(2),
            probe_concurrency: 1,
            alpha: 0.15,
            threshold: 2.0,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
