//! Setup password derived from the hardware identity.
//!
//! The password protects both the provisioning access point (WPA2 passphrase)
//! and the setup form. It is derived deterministically from the device MAC so
//! it can be printed on a label and survives restarts.

use std::fmt;

use subtle::ConstantTimeEq;

/// Length of a derived setup password in characters.
pub const SETUP_PASSWORD_LEN: usize = 8;

/// The device's setup password.
#[derive(Clone, PartialEq, Eq)]
pub struct SetupPassword(String);

impl SetupPassword {
    /// Derive the password from a 6-byte MAC address.
    ///
    /// Uses the last four bytes, which carry the device-specific part of
    /// the address, as 8 uppercase hex digits.
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let value = mac[2..]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<String>();
        Self(value)
    }

    /// Wrap a password produced by an external provider.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare a submitted password in constant time.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl fmt::Display for SetupPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SetupPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SetupPassword").field(&"<redacted>").finish()
    }
}
