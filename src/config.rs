//! Configuration types for timelapse-dl

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for a [`TimelapseExporter`](crate::TimelapseExporter)
///
/// Identifies the printer and tunes the timing of the completion watch and
/// the download retry loop. Everything except `host` has a sensible default;
/// a config file only needs to name the printer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Printer IP address or hostname
    pub host: String,

    /// Port of the printer's WebSocket control endpoint (default: 3030)
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// Port of the printer's HTTP file server (default: 80)
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Path of the timelapse listing page (default: "/local/aic_tlp/")
    #[serde(default = "default_listing_path")]
    pub listing_path: String,

    /// Interval between keepalive pings on the control connection (default: 20 seconds)
    #[serde(default = "default_ping_interval", with = "duration_serde")]
    pub ping_interval: Duration,

    /// Per-request timeout for a single download attempt (default: 30 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Existence-polling behavior during the completion watch
    #[serde(default)]
    pub poll: PollConfig,

    /// Retry behavior for the artifact download
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Create a configuration for the given printer host with all defaults
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// URL of the printer's WebSocket control endpoint
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/websocket", self.host, self.ws_port)
    }

    /// URL of a path on the printer's HTTP file server
    ///
    /// The port is omitted when it is the default HTTP port, so URLs match
    /// what the printer's own UI displays.
    #[must_use]
    pub fn http_url(&self, path: &str) -> String {
        if self.http_port == 80 {
            format!("http://{}{}", self.host, path)
        } else {
            format!("http://{}:{}{}", self.host, self.http_port, path)
        }
    }

    /// URL of the listing page, with the trailing slash the printer requires
    #[must_use]
    pub fn listing_url(&self) -> String {
        if self.listing_path.ends_with('/') {
            self.http_url(&self.listing_path)
        } else {
            self.http_url(&format!("{}/", self.listing_path))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::new(),
            ws_port: default_ws_port(),
            http_port: default_http_port(),
            listing_path: default_listing_path(),
            ping_interval: default_ping_interval(),
            download_timeout: default_download_timeout(),
            poll: PollConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Existence-polling configuration for the completion watch
///
/// The poll watcher probes the artifact URL, sleeping between probes with a
/// multiplicative backoff capped at `max_delay`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay before the second probe (default: 1.5 seconds)
    #[serde(default = "default_poll_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between probes (default: 5 seconds)
    #[serde(default = "default_poll_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each probe (default: 1.5)
    #[serde(default = "default_poll_multiplier")]
    pub multiplier: f64,

    /// Timeout for a single existence probe (default: 3 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_poll_initial_delay(),
            max_delay: default_poll_max_delay(),
            multiplier: default_poll_multiplier(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

/// Retry configuration for the artifact download
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial try (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 8 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 1.5)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 1.5,
            jitter: false,
        }
    }
}

fn default_ws_port() -> u16 {
    3030
}

fn default_http_port() -> u16 {
    80
}

fn default_listing_path() -> String {
    "/local/aic_tlp/".to_string()
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(20)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_initial_delay() -> Duration {
    Duration::from_millis(1500)
}

fn default_poll_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_multiplier() -> f64 {
    1.5
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(8)
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

// Duration serialization helper (fractional seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
