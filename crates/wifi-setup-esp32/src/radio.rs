//! `RadioDriver` over the ESP-IDF WiFi driver.
//!
//! Calls are non-blocking: completion is reported through the system event
//! loop (see [`crate::events`]), not by waiting here.

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, peripheral},
    nvs::EspDefaultNvsPartition,
    wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi},
};
use log::info;

use wifi_setup_core::Credentials;
use wifi_setup_server::{AccessPointConfig, DriverError, RadioDriver};

fn radio_error(err: impl std::fmt::Display) -> DriverError {
    DriverError::Radio(err.to_string())
}

pub struct EspRadio {
    wifi: Box<EspWifi<'static>>,
}

impl EspRadio {
    pub fn new(
        modem: impl peripheral::Peripheral<P = Modem> + 'static,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> anyhow::Result<Self> {
        let wifi = EspWifi::new(modem, sysloop, nvs)?;
        Ok(Self {
            wifi: Box::new(wifi),
        })
    }
}

impl RadioDriver for EspRadio {
    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<(), DriverError> {
        let ap = AccessPointConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| radio_error("access point name too long"))?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| radio_error("setup password too long"))?,
            channel: config.channel,
            auth_method: AuthMethod::WPA2Personal,
            max_connections: config.max_connections,
            ..Default::default()
        };

        self.wifi
            .set_configuration(&Configuration::AccessPoint(ap))
            .map_err(radio_error)?;
        self.wifi.start().map_err(radio_error)?;
        info!(
            "Access point '{}' up on channel {} ({})",
            config.ssid, config.channel, config.gateway
        );
        Ok(())
    }

    fn stop_access_point(&mut self) -> Result<(), DriverError> {
        self.wifi.stop().map_err(radio_error)
    }

    fn start_station(&mut self, credentials: &Credentials) -> Result<(), DriverError> {
        let auth_method = if credentials.is_open() {
            info!("WiFi password is empty, using open network");
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let client = ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| radio_error("SSID too long"))?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| radio_error("password too long"))?,
            auth_method,
            ..Default::default()
        };

        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(radio_error)?;
        self.wifi.start().map_err(radio_error)
    }

    fn associate(&mut self) -> Result<(), DriverError> {
        self.wifi.connect().map_err(radio_error)
    }

    fn stop_station(&mut self) -> Result<(), DriverError> {
        if self.wifi.is_connected().unwrap_or(false) {
            self.wifi.disconnect().map_err(radio_error)?;
        }
        self.wifi.stop().map_err(radio_error)
    }
}
