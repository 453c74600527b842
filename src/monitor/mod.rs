//! Monitoring engine: detectors, bounded history and the session lifecycle.

mod detector;
mod history;
mod seed;
mod state;

pub use detector::*;
pub use history::*;
pub use seed::*;
pub use state::*;

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;
use crate::probe::{discover_targets, HttpProber, NameResolver, Prober, SystemResolver};
use crate::scheduler::{run_poll_loop, PollContext};

/// Errors returned to callers of the monitor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("Already monitoring")]
    AlreadyMonitoring,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Background poll loop of one monitoring session.
struct Session {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the monitoring state and the poll loop that drives it.
pub struct Monitor<P = HttpProber, R = SystemResolver> {
    config: MonitorConfig,
    prober: Arc<P>,
    resolver: Arc<R>,
    state: SharedState,
    session: Mutex<Option<Session>>,
}

impl Monitor {
    /// Monitor that probes over HTTP and discovers targets with system DNS.
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_parts(config, HttpProber, SystemResolver)
    }
}

impl<P: Prober, R: NameResolver> Monitor<P, R> {
    pub fn with_parts(config: MonitorConfig, prober: P, resolver: R) -> Self {
        Self {
            config,
            prober: Arc::new(prober),
            resolver: Arc::new(resolver),
            state: Arc::new(RwLock::new(MonitorState::default())),
            session: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        read_state(&self.state).is_active()
    }

    /// Validate `seed`, discover its targets and start polling them.
    ///
    /// Returns the discovered targets. Fails if monitoring is already active.
    pub async fn start(&self, seed: &str) -> Result<Vec<String>, MonitorError> {
        let seed = SeedUrl::parse(seed)?;
        if self.is_active() {
            return Err(MonitorError::AlreadyMonitoring);
        }

        let targets =
            discover_targets(self.resolver.clone(), &seed, self.config.resolve_timeout).await;

        let generation = {
            let mut state = write_state(&self.state);
            // A concurrent start may have won while we were resolving.
            if state.is_active() {
                return Err(MonitorError::AlreadyMonitoring);
            }
            let (alpha, threshold) = (self.config.alpha, self.config.threshold);
            state.begin_session(seed.as_str(), &targets, || Detector::new(alpha, threshold))
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let ctx = Arc::new(PollContext {
            state: self.state.clone(),
            prober: self.prober.clone(),
            generation,
            targets: targets.clone(),
            interval: self.config.poll_interval,
            probe_timeout: self.config.probe_timeout,
            concurrency: self.config.probe_concurrency,
        });
        let handle = tokio::spawn(run_poll_loop(ctx, shutdown_rx));

        tracing::info!(
            "Monitor: started session {} for {} with {} targets",
            generation,
            seed.as_str(),
            targets.len()
        );

        let previous = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Session { shutdown, handle });
        if previous.is_some() {
            // Dropping the old sender ends that loop at its next idle.
            tracing::debug!("Monitor: replaced previous session");
        }

        Ok(targets)
    }

    /// Stop polling and mark every target stopped.
    ///
    /// Does not wait for the probe in flight; its result is discarded.
    pub fn stop(&self) {
        write_state(&self.state).end_session();

        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = session.as_ref() {
            let _ = session.shutdown.send(true);
        }
        tracing::info!("Monitor: stopped");
    }

    /// Wait for the current poll loop, if any, to exit.
    pub async fn join(&self) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            if let Err(e) = session.handle.await {
                tracing::warn!("Monitor: poll loop ended abnormally: {}", e);
            }
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        read_state(&self.state).snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeError, ProbeResponse};
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    /// Answers every target with a fixed status code and latency after `delay`.
    struct StaticProber {
        status_code: u16,
        latency_ms: f64,
        delay: Duration,
    }

    impl Prober for StaticProber {
        async fn probe(&self, _target: &str, _timeout: Duration) -> Result<ProbeResponse, ProbeError> {
            tokio::time::sleep(self.delay).await;
            Ok(ProbeResponse {
                status_code: self.status_code,
                latency_ms: self.latency_ms,
            })
        }
    }

    /// Resolves `www.` hosts only.
    struct WwwResolver;

    impl NameResolver for WwwResolver {
        async fn resolve(&self, host: &str) -> Result<IpAddr, ProbeError> {
            if host.starts_with("www.") {
                Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
            } else {
                Err(ProbeError::Resolution(host.to_string()))
            }
        }
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(10),
            probe_timeout: Duration::from_millis(500),
            resolve_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    fn monitor(delay: Duration) -> Monitor<StaticProber, WwwResolver> {
        let prober = StaticProber {
            status_code: 200,
            latency_ms: 100.0,
            delay,
        };
        Monitor::with_parts(fast_config(), prober, WwwResolver)
    }

    async fn wait_until(monitor: &Monitor<StaticProber, WwwResolver>, f: impl Fn(&StatusSnapshot) -> bool) {
        for _ in 0..200 {
            if f(&monitor.status()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:?}", monitor.status());
    }

    #[tokio::test]
    async fn test_start_discovers_and_polls() {
        let monitor = monitor(Duration::ZERO);
        let targets = monitor.start("https://example.com").await.unwrap();
        assert_eq!(targets, vec!["https://example.com", "https://www.example.com"]);
        assert!(monitor.is_active());

        wait_until(&monitor, |s| {
            s.status_messages.values().all(|m| m == "Operational")
        })
        .await;

        let status = monitor.status();
        assert_eq!(status.current_latencies["https://example.com"], 100.0);
        assert_eq!(status.status_codes["https://www.example.com"], 200);
        assert!(status.histories["https://example.com"].len() >= 2);

        monitor.stop();
        monitor.join().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let monitor = monitor(Duration::ZERO);
        monitor.start("https://example.com").await.unwrap();
        assert_eq!(
            monitor.start("https://example.com").await,
            Err(MonitorError::AlreadyMonitoring)
        );
        monitor.stop();
        monitor.join().await;
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_seed() {
        let monitor = monitor(Duration::ZERO);
        assert!(matches!(
            monitor.start("ftp://example.com").await,
            Err(MonitorError::InvalidUrl(_))
        ));
        assert!(!monitor.is_active());
    }

    #[tokio::test]
    async fn test_stop_mid_cycle_freezes_state() {
        // Probes outlast the stop request.
        let monitor = monitor(Duration::from_millis(100));
        monitor.start("https://example.com").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        monitor.stop();
        let stopped = monitor.status();
        assert!(!stopped.is_monitoring);
        assert!(stopped.status_messages.values().all(|m| m == STATUS_STOPPED));

        monitor.join().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after = monitor.status();
        assert!(after.status_messages.values().all(|m| m == STATUS_STOPPED));
        let lengths = |s: &StatusSnapshot| -> HashMap<String, usize> {
            s.histories.iter().map(|(k, v)| (k.clone(), v.len())).collect()
        };
        assert_eq!(lengths(&after), lengths(&stopped));
    }

    #[tokio::test]
    async fn test_restart_resets_state() {
        let monitor = monitor(Duration::ZERO);
        monitor.start("https://example.com").await.unwrap();
        wait_until(&monitor, |s| {
            s.histories.values().all(|h| h.len() >= 2)
        })
        .await;
        monitor.stop();
        monitor.join().await;

        let targets = monitor.start("http://other.test").await.unwrap();
        assert_eq!(targets, vec!["http://other.test", "http://www.other.test"]);
        let status = monitor.status();
        assert!(status.is_monitoring);
        assert_eq!(status.target_url, "http://other.test");
        assert!(!status.histories.contains_key("https://example.com"));

        monitor.stop();
        monitor.join().await;
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_harmless() {
        let monitor = monitor(Duration::ZERO);
        monitor.stop();
        monitor.join().await;
        assert!(!monitor.is_active());
        assert!(monitor.status().targets.is_empty());
    }
}
