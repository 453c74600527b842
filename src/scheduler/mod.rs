//! Poll loop driving probes, detectors and history.

use crate::monitor::{read_state, write_state, SharedState, TargetRecord};
use crate::probe::{ProbeError, ProbeResponse, Prober};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Everything one session's poll loop needs.
pub struct PollContext<P> {
    pub state: SharedState,
    pub prober: Arc<P>,
    /// Session this loop belongs to; writes are dropped once it is not current.
    pub generation: u64,
    pub targets: Vec<String>,
    pub interval: Duration,
    pub probe_timeout: Duration,
    /// Targets probed at once within a cycle; 1 means one after another.
    pub concurrency: usize,
}

impl<P> PollContext<P> {
    fn is_current(&self) -> bool {
        read_state(&self.state).accepts(self.generation)
    }
}

/// Run polling cycles until the session is stopped or replaced.
///
/// Each cycle probes every target, then idles for `interval`. A stop request
/// cuts the idle short but never interrupts a probe in flight.
pub async fn run_poll_loop<P: Prober>(ctx: Arc<PollContext<P>>, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(
        "Scheduler: polling {} targets every {:?}",
        ctx.targets.len(),
        ctx.interval
    );

    loop {
        if !ctx.is_current() {
            break;
        }

        run_cycle(&ctx).await;

        tokio::select! {
            _ = tokio::time::sleep(ctx.interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("Scheduler: session {} finished", ctx.generation);
}

/// Probe every target once.
async fn run_cycle<P: Prober>(ctx: &Arc<PollContext<P>>) {
    if ctx.concurrency <= 1 {
        for target in &ctx.targets {
            if !ctx.is_current() {
                return;
            }

            // Spawned so a panic stays with this target.
            let handle = tokio::spawn(poll_target(ctx.clone(), target.clone()));
            if let Err(e) = handle.await {
                tracing::warn!("Scheduler: processing {} failed: {}", target, e);
            }
        }
        return;
    }

    let semaphore = Arc::new(Semaphore::new(ctx.concurrency));
    let mut tasks = JoinSet::new();

    for target in &ctx.targets {
        let semaphore = semaphore.clone();
        let ctx = ctx.clone();
        let target = target.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            if ctx.is_current() {
                poll_target(ctx, target).await;
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::warn!("Scheduler: target task failed: {}", e);
        }
    }
}

/// Probe one target and record the outcome.
async fn poll_target<P: Prober>(ctx: Arc<PollContext<P>>, target: String) {
    let outcome = ctx.prober.probe(&target, ctx.probe_timeout).await;

    match &outcome {
        Ok(resp) => tracing::debug!(
            "Scheduler: {} answered {} in {:.1}ms",
            target,
            resp.status_code,
            resp.latency_ms
        ),
        Err(e) => tracing::warn!("Scheduler: probe failed for {}: {}", target, e),
    }

    let mut state = write_state(&ctx.state);
    if !state.accepts(ctx.generation) {
        tracing::debug!("Scheduler: discarding result for {} after stop", target);
        return;
    }

    if let Some(record) = state.record_mut(&target) {
        record_outcome(record, outcome, Utc::now());
    }
}

/// Apply one probe outcome to a target's record.
///
/// Only successful responses below 400 reach the detector; every other
/// outcome records a sentinel sample of 0.
pub fn record_outcome(
    record: &mut TargetRecord,
    outcome: Result<ProbeResponse, ProbeError>,
    now: DateTime<Utc>,
) {
    let value = match outcome {
        Ok(resp) if resp.status_code >= 400 => {
            record.last_code = resp.status_code;
            record.status = format!("HTTP {} ERROR", resp.status_code);
            0.0
        }
        Ok(resp) => {
            record.last_code = resp.status_code;
            let (label, anomaly) = record.detector.update(resp.latency_ms);
            if anomaly {
                tracing::warn!(
                    "Scheduler: latency anomaly, {:.1}ms against baseline {:.1}ms (±{:.1}ms, {} in a row)",
                    resp.latency_ms,
                    record.detector.ewma(),
                    record.detector.ewmad(),
                    record.detector.consecutive_anomalies()
                );
            }
            record.status = label.status_text().to_string();
            resp.latency_ms
        }
        Err(e) => {
            record.status = e.status_text();
            0.0
        }
    };

    record.push_sample(value, now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{Detector, MonitorState, STATUS_STOPPED};
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, RwLock};

    fn record() -> TargetRecord {
        TargetRecord::new(Detector::new(0.15, 2.0))
    }

    fn ok(status_code: u16, latency_ms: f64) -> Result<ProbeResponse, ProbeError> {
        Ok(ProbeResponse {
            status_code,
            latency_ms,
        })
    }

    #[test]
    fn test_http_error_skips_detector() {
        let mut record = record();
        record_outcome(&mut record, ok(200, 100.0), Utc::now());
        let ewma = record.detector.ewma();

        record_outcome(&mut record, ok(503, 40.0), Utc::now());
        assert_eq!(record.status, "HTTP 503 ERROR");
        assert_eq!(record.last_code, 503);
        assert_eq!(record.history.last(), Some(0.0));
        assert_eq!(record.detector.ewma(), ewma);
        assert_eq!(record.detector.consecutive_anomalies(), 0);

        // The detector never saw the 503, so the next success is its second sample.
        record_outcome(&mut record, ok(200, 100.0), Utc::now());
        assert_eq!(record.status, "Operational");
    }

    #[test]
    fn test_transport_errors_record_sentinel() {
        let cases = [
            (ProbeError::Timeout(Duration::from_secs(10)), "TIMEOUT (Firewall/Net)"),
            (ProbeError::ConnectionRefused("refused".into()), "CONNECTION REFUSED"),
            (ProbeError::Transport("broken pipe".into()), "ERROR: broken pipe"),
        ];

        for (err, expected) in cases {
            let mut record = record();
            record_outcome(&mut record, Err(err), Utc::now());
            assert_eq!(record.status, expected);
            assert_eq!(record.history.last(), Some(0.0));
            assert_eq!(record.last_code, 0);
            assert_eq!(record.detector.ewma(), 0.0);
        }
    }

    #[test]
    fn test_success_maps_labels() {
        let mut record = record();

        record_outcome(&mut record, ok(200, 100.0), Utc::now());
        assert_eq!(record.status, "Learning Baseline...");
        assert_eq!(record.baseline, 100.0);

        for _ in 0..20 {
            record_outcome(&mut record, ok(301, 100.0), Utc::now());
            assert_eq!(record.status, "Operational");
        }

        record_outcome(&mut record, ok(200, 5000.0), Utc::now());
        assert_eq!(record.status, "Warning: Unstable");
        record_outcome(&mut record, ok(200, 5000.0), Utc::now());
        assert_eq!(record.status, "Warning: Unstable");
        record_outcome(&mut record, ok(200, 5000.0), Utc::now());
        assert_eq!(record.status, "CRITICAL: High Latency");

        assert_eq!(record.history.last(), Some(5000.0));
        assert_eq!(record.baseline, record.detector.ewma());
    }

    /// Replays scripted outcomes per target, then keeps answering 200/100ms.
    struct ScriptedProber {
        scripts: Mutex<HashMap<String, VecDeque<Result<ProbeResponse, ProbeError>>>>,
        delay: Duration,
    }

    impl ScriptedProber {
        fn new(delay: Duration) -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                delay,
            }
        }

        fn script(self, target: &str, outcomes: Vec<Result<ProbeResponse, ProbeError>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(target.to_string(), outcomes.into());
            self
        }
    }

    impl Prober for ScriptedProber {
        async fn probe(&self, target: &str, _timeout: Duration) -> Result<ProbeResponse, ProbeError> {
            tokio::time::sleep(self.delay).await;
            if target.contains("panic") {
                panic!("prober blew up for {}", target);
            }
            let next = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(target)
                .and_then(|q| q.pop_front());
            next.unwrap_or(Ok(ProbeResponse {
                status_code: 200,
                latency_ms: 100.0,
            }))
        }
    }

    fn context(
        prober: ScriptedProber,
        targets: &[&str],
        concurrency: usize,
    ) -> (Arc<PollContext<ScriptedProber>>, SharedState) {
        let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        let state: SharedState = Arc::new(RwLock::new(MonitorState::default()));
        let generation = write_state(&state).begin_session("https://example.com", &targets, || {
            Detector::new(0.15, 2.0)
        });

        let ctx = Arc::new(PollContext {
            state: state.clone(),
            prober: Arc::new(prober),
            generation,
            targets,
            interval: Duration::from_millis(5),
            probe_timeout: Duration::from_secs(1),
            concurrency,
        });
        (ctx, state)
    }

    #[tokio::test]
    async fn test_failing_target_does_not_stop_cycle() {
        let prober = ScriptedProber::new(Duration::ZERO)
            .script("https://a.example", vec![Err(ProbeError::Transport("boom".into()))])
            .script("https://b.example", vec![ok(503, 10.0)]);
        let (ctx, state) = context(
            prober,
            &["https://a.example", "https://b.example", "https://c.example", "https://panic.example"],
            1,
        );

        run_cycle(&ctx).await;

        let snapshot = read_state(&state).snapshot();
        assert_eq!(snapshot.status_messages["https://a.example"], "ERROR: boom");
        assert_eq!(snapshot.status_messages["https://b.example"], "HTTP 503 ERROR");
        assert_eq!(snapshot.status_messages["https://c.example"], "Learning Baseline...");
        assert_eq!(snapshot.status_messages["https://panic.example"], "Idle");
        assert_eq!(snapshot.histories["https://a.example"], vec![0.0]);
        assert_eq!(snapshot.histories["https://b.example"], vec![0.0]);
        assert_eq!(snapshot.histories["https://c.example"], vec![100.0]);
    }

    #[tokio::test]
    async fn test_concurrent_cycle_probes_every_target() {
        let targets = ["https://a.example", "https://b.example", "https://c.example", "https://d.example"];
        let (ctx, state) = context(ScriptedProber::new(Duration::from_millis(20)), &targets, 4);

        run_cycle(&ctx).await;
        run_cycle(&ctx).await;

        let snapshot = read_state(&state).snapshot();
        for t in targets {
            assert_eq!(snapshot.histories[t].len(), 2);
            assert_eq!(snapshot.status_messages[t], "Operational");
        }
    }

    #[tokio::test]
    async fn test_loop_stops_without_further_writes() {
        let (ctx, state) = context(
            ScriptedProber::new(Duration::from_millis(30)),
            &["https://a.example", "https://b.example"],
            1,
        );
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_poll_loop(ctx, shutdown_rx));

        // Land mid-probe.
        tokio::time::sleep(Duration::from_millis(45)).await;
        write_state(&state).end_session();
        shutdown.send(true).unwrap();
        let frozen = read_state(&state).snapshot();

        handle.await.unwrap();

        let after = read_state(&state).snapshot();
        assert_eq!(after.histories, frozen.histories);
        assert!(after.status_messages.values().all(|s| s == STATUS_STOPPED));
    }

    #[tokio::test]
    async fn test_loop_exits_when_sender_dropped() {
        let (ctx, _state) = context(ScriptedProber::new(Duration::ZERO), &["https://a.example"], 1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_poll_loop(ctx, shutdown_rx));

        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
