//! DNS-based target discovery.
//!
//! Expands a seed address into the set of its common subdomains that
//! actually resolve.

use std::collections::BTreeSet;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::ProbeError;
use crate::monitor::SeedUrl;

/// Subdomain labels tried against every seed host.
pub const COMMON_SUBDOMAINS: [&str; 20] = [
    "www", "api", "blog", "shop", "mail", "ftp", "admin", "test", "dev", "staging",
    "beta", "forum", "news", "app", "secure", "login", "dashboard", "webmail", "portal", "cms",
];

/// Resolves a hostname to an address.
pub trait NameResolver: Send + Sync + 'static {
    fn resolve(&self, host: &str) -> impl Future<Output = Result<IpAddr, ProbeError>> + Send;
}

/// Resolver backed by the operating system's resolver.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

impl NameResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ProbeError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addrs: Vec<_> = tokio::net::lookup_host(format!("{}:0", host))
            .await
            .map_err(|e| ProbeError::Resolution(format!("{}: {}", host, e)))?
            .collect();

        addrs
            .into_iter()
            .next()
            .map(|sa| sa.ip())
            .ok_or_else(|| ProbeError::Resolution(format!("no addresses found for {}", host)))
    }
}

/// Discover the targets to monitor for a seed address.
///
/// Returns the seed itself plus every `<scheme>://<label>.<host>` whose
/// hostname resolves within `timeout`, sorted and deduplicated. Candidates
/// that fail or time out are dropped silently.
pub async fn discover_targets<R: NameResolver>(
    resolver: Arc<R>,
    seed: &SeedUrl,
    timeout: Duration,
) -> Vec<String> {
    let mut targets = BTreeSet::new();
    targets.insert(seed.as_str().to_string());

    let mut lookups = JoinSet::new();
    for label in COMMON_SUBDOMAINS {
        let host = format!("{}.{}", label, seed.host());
        let url = seed.with_host(&host);
        let resolver = resolver.clone();

        lookups.spawn(async move {
            match tokio::time::timeout(timeout, resolver.resolve(&host)).await {
                Ok(Ok(_)) => Some(url),
                Ok(Err(e)) => {
                    tracing::debug!("Discovery: dropping {}: {}", host, e);
                    None
                }
                Err(_) => {
                    tracing::debug!("Discovery: lookup for {} timed out", host);
                    None
                }
            }
        });
    }

    while let Some(result) = lookups.join_next().await {
        match result {
            Ok(Some(url)) => {
                targets.insert(url);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Discovery: lookup task failed: {}", e),
        }
    }

    tracing::info!("Discovery: {} targets for {}", targets.len(), seed.as_str());
    targets.into_iter().collect()
}
