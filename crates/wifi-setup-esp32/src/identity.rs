//! Device identity.

use esp_idf_svc::sys::{esp, esp_efuse_mac_get_default};

use wifi_setup_core::SetupPassword;

/// Factory-programmed base MAC address.
pub fn base_mac() -> anyhow::Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    esp!(unsafe { esp_efuse_mac_get_default(mac.as_mut_ptr()) })?;
    Ok(mac)
}

/// Setup password derived from the base MAC.
pub fn setup_password() -> anyhow::Result<SetupPassword> {
    Ok(SetupPassword::from_mac(base_mac()?))
}
