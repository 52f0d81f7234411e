use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use url::Url;

/// Client configuration.
///
/// Every field except `base_url` has a default, so a config can be
/// deserialized from a document that only names the service:
///
/// ```
/// # fn main() -> anyhow::Result<()> {
/// let config: tplus_sdk::Config = serde_json::from_str(r#"{"base_url": "https://oms.example.com"}"#)?;
/// assert_eq!(config.refresh_margin.as_secs(), 60);
/// # Ok(())
/// # }
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Service root, e.g. `https://oms.example.com`.
    pub base_url: Url,
    /// Per-request HTTP timeout.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "defaults::timeout")]
    pub timeout: Duration,
    /// A token is refreshed once it expires within this margin.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "defaults::refresh_margin")]
    pub refresh_margin: Duration,
    /// WebSocket connect timeout.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout: Duration,
    /// Deadline for correlated control requests.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "defaults::correlation_timeout")]
    pub correlation_timeout: Duration,
    /// Reconnect data streams after the remote closes them.
    #[serde(default)]
    pub reconnect: bool,
}

mod defaults {
    use std::time::Duration;

    pub fn timeout() -> Duration {
        Duration::from_secs(10)
    }

    pub fn refresh_margin() -> Duration {
        Duration::from_secs(60)
    }

    pub fn connect_timeout() -> Duration {
        Duration::from_secs(5)
    }

    pub fn correlation_timeout() -> Duration {
        Duration::from_secs(5)
    }
}

impl Config {
    /// Default settings for `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: defaults::timeout(),
            refresh_margin: defaults::refresh_margin(),
            connect_timeout: defaults::connect_timeout(),
            correlation_timeout: defaults::correlation_timeout(),
            reconnect: false,
        }
    }

    /// Enables automatic reconnects on data streams.
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_correlation_timeout(mut self, timeout: Duration) -> Self {
        self.correlation_timeout = timeout;
        self
    }
}
