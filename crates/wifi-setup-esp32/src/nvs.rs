//! Credential storage in ESP-IDF NVS flash.

use std::sync::{Mutex, PoisonError};

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::{debug, info};

use wifi_setup_core::{CredentialStore, Credentials, StoreError, PASSWORD_MAX_LEN, SSID_MAX_LEN};

pub const NAMESPACE: &str = "wifi_setup";
const KEY_SSID: &str = "ssid";
const KEY_PASSWORD: &str = "password";

/// Credentials stored as two string entries in the `wifi_setup` namespace.
pub struct NvsCredentialStore {
    nvs: Mutex<EspNvs<NvsDefault>>,
}

impl NvsCredentialStore {
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NAMESPACE, true)?;
        Ok(Self {
            nvs: Mutex::new(nvs),
        })
    }
}

fn access(err: impl std::fmt::Display) -> StoreError {
    StoreError::AccessFailure(err.to_string())
}

impl CredentialStore for NvsCredentialStore {
    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let mut nvs = self.nvs.lock().unwrap_or_else(PoisonError::into_inner);
        nvs.set_str(KEY_SSID, &credentials.ssid).map_err(access)?;
        nvs.set_str(KEY_PASSWORD, &credentials.password)
            .map_err(access)?;
        info!("WiFi credentials saved");
        Ok(())
    }

    fn load(&self) -> Result<Credentials, StoreError> {
        let nvs = self.nvs.lock().unwrap_or_else(PoisonError::into_inner);

        let mut ssid_buf = [0u8; SSID_MAX_LEN + 1];
        let ssid = match nvs.get_str(KEY_SSID, &mut ssid_buf).map_err(access)? {
            Some(ssid) if !ssid.is_empty() => ssid.to_string(),
            _ => return Err(StoreError::NotFound),
        };

        let mut password_buf = [0u8; PASSWORD_MAX_LEN + 1];
        let password = nvs
            .get_str(KEY_PASSWORD, &mut password_buf)
            .map_err(access)?
            .unwrap_or_default()
            .to_string();

        debug!("Loaded credentials for '{}'", ssid);
        Credentials::new(ssid, password).map_err(access)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut nvs = self.nvs.lock().unwrap_or_else(PoisonError::into_inner);
        nvs.remove(KEY_SSID).map_err(access)?;
        nvs.remove(KEY_PASSWORD).map_err(access)?;
        info!("WiFi credentials cleared");
        Ok(())
    }
}
