//! ESP32 drivers for WiFi provisioning.
//!
//! This crate provides the platform side of the provisioning subsystem:
//! - [`nvs::NvsCredentialStore`] - credentials in non-volatile storage
//! - [`radio::EspRadio`] - access point and station control over `EspWifi`
//! - [`portal::EspPortal`] - the setup form on `EspHttpServer`
//! - [`events::subscribe_link_events`] - system event loop to link events
//! - [`identity::setup_password`] - setup password from the factory MAC
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(NvsCredentialStore::new(nvs_partition)?);
//! let radio = EspRadio::new(peripherals.modem, sysloop.clone(), nvs)?;
//! let manager = ConnectionManager::spawn(config, setup_password()?, store, radio, EspPortal::new(80));
//! let _subscriptions = subscribe_link_events(&sysloop, LinkEventBridge::new(manager.clone()))?;
//! ```

pub mod events;
pub mod identity;
pub mod nvs;
pub mod portal;
pub mod radio;
