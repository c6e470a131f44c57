//! WiFi provisioning data model types.
//!
//! These types are shared by every platform:
//! - Credentials for the target network
//! - The connection lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum network name length in bytes (802.11 SSID field minus terminator).
pub const SSID_MAX_LEN: usize = 31;

/// Maximum WPA2 passphrase length in bytes.
pub const PASSWORD_MAX_LEN: usize = 63;

/// Errors raised when building credentials from caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialsError {
    /// The network name is empty.
    #[error("network name cannot be empty")]
    EmptyNetworkName,

    /// The network name exceeds [`SSID_MAX_LEN`] bytes.
    #[error("network name is {0} bytes, maximum is {SSID_MAX_LEN}")]
    NetworkNameTooLong(usize),

    /// The network secret exceeds [`PASSWORD_MAX_LEN`] bytes.
    #[error("network secret is {0} bytes, maximum is {PASSWORD_MAX_LEN}")]
    SecretTooLong(usize),
}

/// Credentials for the network the device joins in station mode.
///
/// Persisted as two string entries, `ssid` and `password`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Network name (SSID).
    pub ssid: String,

    /// Network secret (empty for open networks).
    pub password: String,
}

impl Credentials {
    /// Build credentials, rejecting an empty name and oversized fields.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, CredentialsError> {
        let ssid = ssid.into();
        let password = password.into();

        if ssid.is_empty() {
            return Err(CredentialsError::EmptyNetworkName);
        }
        if ssid.len() > SSID_MAX_LEN {
            return Err(CredentialsError::NetworkNameTooLong(ssid.len()));
        }
        if password.len() > PASSWORD_MAX_LEN {
            return Err(CredentialsError::SecretTooLong(password.len()));
        }

        Ok(Self { ssid, password })
    }

    /// Whether these credentials name a network at all.
    ///
    /// A zero-length name is treated as "no credentials stored".
    pub fn is_present(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// Whether the target network is open (no secret).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Lifecycle state of the provisioning subsystem.
///
/// Exactly one instance exists per device, owned by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Initialized but inactive.
    Idle,
    /// Access point and setup form are being served.
    PortalRunning,
    /// Joining the stored network in station mode.
    Connecting,
    /// Joined with an address assigned.
    Connected,
    /// Retries exhausted; resources are released after a short grace period.
    Failed,
    /// Radio released to save power.
    Disabled,
}

impl ConnectionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::PortalRunning => "PortalRunning",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Failed => "Failed",
            Self::Disabled => "Disabled",
        }
    }

    /// States from which a fresh portal or connection may start.
    pub const fn is_quiescent(self) -> bool {
        matches!(self, Self::Idle | Self::Disabled | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
