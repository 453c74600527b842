//! Validated seed address.

use reqwest::Url;

use super::MonitorError;

/// A monitoring seed: an `http`/`https` address with a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedUrl {
    raw: String,
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl SeedUrl {
    pub fn parse(input: &str) -> Result<Self, MonitorError> {
        let raw = input.trim();
        if !(raw.starts_with("http://") || raw.starts_with("https://")) {
            return Err(MonitorError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let url = Url::parse(raw).map_err(|e| MonitorError::InvalidUrl(format!("{}: {}", raw, e)))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MonitorError::InvalidUrl(format!("{}: missing host", raw)))?;

        Ok(Self {
            raw: raw.to_string(),
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port: url.port(),
        })
    }

    /// The seed exactly as given, minus surrounding whitespace.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Address of `host` reached with this seed's scheme and port.
    pub fn with_host(&self, host: &str) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, host, port),
            None => format!("{}://{}", self.scheme, host),
        }
    }
}
