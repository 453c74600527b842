//! Probe module for network monitoring.
//!
//! Supports header-only HTTP probes and DNS-based target discovery.

mod dns;
mod http;

pub use dns::*;
pub use http::*;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Longest transport error message carried into a status line.
const STATUS_MESSAGE_LEN: usize = 20;

/// Probe error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("name resolution failed: {0}")]
    Resolution(String),
}

impl ProbeError {
    /// Human-readable status line shown for a target whose probe failed.
    pub fn status_text(&self) -> String {
        match self {
            ProbeError::Timeout(_) => "TIMEOUT (Firewall/Net)".to_string(),
            ProbeError::ConnectionRefused(_) => "CONNECTION REFUSED".to_string(),
            ProbeError::Transport(msg) | ProbeError::Resolution(msg) => {
                let short: String = msg.chars().take(STATUS_MESSAGE_LEN).collect();
                format!("ERROR: {}", short)
            }
        }
    }
}

/// A completed probe: the server answered, whatever the status code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResponse {
    pub status_code: u16,
    /// Wall-clock time from request start to response headers.
    pub latency_ms: f64,
}

/// Issues one lightweight request against a target.
pub trait Prober: Send + Sync + 'static {
    fn probe(
        &self,
        target: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProbeResponse, ProbeError>> + Send;
}
