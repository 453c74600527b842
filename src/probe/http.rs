//! HTTP probe implementation.

use std::time::{Duration, Instant};

use super::{ProbeError, ProbeResponse, Prober};

/// User agent sent with every probe.
pub const USER_AGENT: &str = "Mozilla/5.0 (ServerPulse-AI/2.0; +https://serverpulse.ai)";

/// Probes targets with a `HEAD` request, following redirects.
///
/// A fresh client is built per probe so every sample includes connection
/// setup rather than reusing a pooled keep-alive socket.
#[derive(Debug, Clone, Default)]
pub struct HttpProber;

impl Prober for HttpProber {
    async fn probe(&self, target: &str, timeout: Duration) -> Result<ProbeResponse, ProbeError> {
        run_http_probe(target, timeout).await
    }
}

/// Run a header-only HTTP probe against the given address.
///
/// Returns the response code and the latency in milliseconds.
pub async fn run_http_probe(address: &str, timeout: Duration) -> Result<ProbeResponse, ProbeError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProbeError::Transport(e.to_string()))?;

    let start = Instant::now();

    let response = client
        .head(address)
        .send()
        .await
        .map_err(|e| classify_error(&e, timeout))?;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    Ok(ProbeResponse {
        status_code: response.status().as_u16(),
        latency_ms,
    })
}

fn classify_error(e: &reqwest::Error, timeout: Duration) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout(timeout)
    } else if e.is_connect() {
        ProbeError::ConnectionRefused(e.to_string())
    } else {
        ProbeError::Transport(e.to_string())
    }
}
