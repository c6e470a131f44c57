//! Platform seams: the radio and the portal HTTP server.
//!
//! Both traits are synchronous. On the device they wrap blocking esp-idf
//! calls; the connection manager runs them on the blocking pool.

use std::net::Ipv4Addr;

use tracing::{debug, info, warn};

use wifi_setup_core::config::AccessPointSettings;
use wifi_setup_core::{Credentials, SetupPassword};

use crate::error::DriverError;
use crate::portal::Provisioning;

/// Parameters for the provisioning access point.
///
/// The access point is always WPA2-PSK protected with the setup password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub password: SetupPassword,
    pub channel: u8,
    pub max_connections: u16,
    pub gateway: Ipv4Addr,
}

impl AccessPointConfig {
    pub fn new(settings: &AccessPointSettings, password: SetupPassword) -> Self {
        Self {
            ssid: settings.ssid.clone(),
            password,
            channel: settings.channel,
            max_connections: settings.max_connections,
            gateway: settings.gateway,
        }
    }
}

/// Radio operations the connection manager needs.
pub trait RadioDriver: Send + 'static {
    /// Bring up the provisioning access point.
    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<(), DriverError>;

    fn stop_access_point(&mut self) -> Result<(), DriverError>;

    /// Configure and start station mode for the given network.
    ///
    /// Association is requested separately once the driver reports that
    /// the station interface is up.
    fn start_station(&mut self, credentials: &Credentials) -> Result<(), DriverError>;

    /// Request (re)association with the configured network.
    fn associate(&mut self) -> Result<(), DriverError>;

    fn stop_station(&mut self) -> Result<(), DriverError>;
}

/// The HTTP server hosting the setup form.
pub trait PortalServer: Send + 'static {
    /// Start serving the form, routing requests into `provisioning`.
    fn start(&mut self, provisioning: Provisioning) -> Result<(), DriverError>;

    fn stop(&mut self) -> Result<(), DriverError>;
}

/// The radio and server together with what is currently held.
///
/// Release is idempotent: each resource is stopped only when held, and a
/// failed stop is logged and the resource considered released.
pub(crate) struct Resources<R, P> {
    radio: R,
    portal: P,
    access_point: bool,
    http: bool,
    station: bool,
}

impl<R: RadioDriver, P: PortalServer> Resources<R, P> {
    pub(crate) fn new(radio: R, portal: P) -> Self {
        Self {
            radio,
            portal,
            access_point: false,
            http: false,
            station: false,
        }
    }

    /// Start the access point and then the HTTP server.
    ///
    /// On failure anything already started is released again.
    pub(crate) fn open_portal(
        &mut self,
        config: &AccessPointConfig,
        provisioning: Provisioning,
    ) -> Result<(), DriverError> {
        self.radio.start_access_point(config)?;
        self.access_point = true;
        info!("Access point '{}' started", config.ssid);

        if let Err(e) = self.portal.start(provisioning) {
            self.close_portal();
            return Err(e);
        }
        self.http = true;
        debug!("Portal server started");
        Ok(())
    }

    /// Stop the HTTP server, then the access point.
    pub(crate) fn close_portal(&mut self) {
        if self.http {
            if let Err(e) = self.portal.stop() {
                warn!("Failed to stop portal server: {}", e);
            }
            self.http = false;
            debug!("Portal server stopped");
        }
        if self.access_point {
            if let Err(e) = self.radio.stop_access_point() {
                warn!("Failed to stop access point: {}", e);
            }
            self.access_point = false;
            debug!("Access point stopped");
        }
    }

    pub(crate) fn open_station(&mut self, credentials: &Credentials) -> Result<(), DriverError> {
        self.radio.start_station(credentials)?;
        self.station = true;
        info!("Station started for '{}'", credentials.ssid);
        Ok(())
    }

    pub(crate) fn associate(&mut self) -> Result<(), DriverError> {
        if !self.station {
            return Err(DriverError::Radio("station not started".to_string()));
        }
        self.radio.associate()
    }

    /// Release everything: HTTP server, access point, station.
    pub(crate) fn release_all(&mut self) {
        self.close_portal();
        if self.station {
            if let Err(e) = self.radio.stop_station() {
                warn!("Failed to stop station: {}", e);
            }
            self.station = false;
            debug!("Station stopped");
        }
    }
}
