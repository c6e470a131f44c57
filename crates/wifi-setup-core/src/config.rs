//! Configuration for the provisioning subsystem.
//!
//! All values have defaults matching the device firmware, so an empty JSON
//! object (or no file at all) yields a working configuration. Durations are
//! expressed in milliseconds.
//!
//! ```json
//! {
//!   "accessPoint": { "ssid": "ESP32-WiFi-Setup", "maxConnections": 1 },
//!   "timeouts": { "portalMs": 300000, "connectedGraceMs": 30000 },
//!   "retry": { "maxRetries": 3 },
//!   "rateLimit": { "maxAttempts": 5, "windowMs": 60000 },
//!   "http": { "port": 80 }
//! }
//! ```

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rate_limit::{RateLimiter, DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW_MS};

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Read(#[from] std::io::Error),

    /// The configuration document is not valid.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Complete provisioning configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WifiSetupConfig {
    pub access_point: AccessPointSettings,
    pub timeouts: TimeoutSettings,
    pub retry: RetrySettings,
    pub rate_limit: RateLimitSettings,
    pub http: HttpSettings,
}

impl WifiSetupConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Parameters of the provisioning access point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessPointSettings {
    /// Network name broadcast while the portal runs.
    pub ssid: String,

    /// Maximum simultaneous clients.
    pub max_connections: u16,

    /// Radio channel.
    pub channel: u8,

    /// Address of the device on the portal network.
    pub gateway: Ipv4Addr,
}

impl Default for AccessPointSettings {
    fn default() -> Self {
        Self {
            ssid: "ESP32-WiFi-Setup".to_string(),
            max_connections: 1,
            channel: 1,
            gateway: Ipv4Addr::new(192, 168, 4, 1),
        }
    }
}

/// Lifetimes of the portal and the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutSettings {
    /// Portal lifetime from start.
    pub portal_ms: u64,

    /// Time a connection stays up unless the caller asked to stay connected.
    pub connected_grace_ms: u64,

    /// Settle time between a failed connection and releasing the radio.
    pub failure_grace_ms: u64,

    /// Delay between accepting a submission and tearing the portal down,
    /// so the success page reaches the browser.
    pub handoff_delay_ms: u64,
}

impl TimeoutSettings {
    pub fn portal(&self) -> Duration {
        Duration::from_millis(self.portal_ms)
    }

    pub fn connected_grace(&self) -> Duration {
        Duration::from_millis(self.connected_grace_ms)
    }

    pub fn failure_grace(&self) -> Duration {
        Duration::from_millis(self.failure_grace_ms)
    }

    pub fn handoff_delay(&self) -> Duration {
        Duration::from_millis(self.handoff_delay_ms)
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            portal_ms: 5 * 60 * 1000,
            connected_grace_ms: 30 * 1000,
            failure_grace_ms: 1000,
            handoff_delay_ms: 1000,
        }
    }
}

/// Station-mode retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Automatic reconnect attempts after a link-down while connecting.
    pub max_retries: u8,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Submission rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    pub max_attempts: u32,
    pub window_ms: u64,
}

impl RateLimitSettings {
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(self.max_attempts, self.window_ms)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Portal HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSettings {
    pub port: u16,

    /// Largest accepted submission body in bytes.
    pub max_body_bytes: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            port: 80,
            max_body_bytes: 512,
        }
    }
}
