//! Simulated radio for running the portal on a development machine.
//!
//! There is no real access point: the portal is served on the host's
//! interfaces. Station mode "joins" any network after a short delay,
//! except networks whose name starts with `fail`, which never associate.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use wifi_setup_core::Credentials;
use wifi_setup_server::{AccessPointConfig, DriverError, LinkEvent, RadioDriver};

/// Reason code reported when the simulated network is not found.
const REASON_NO_AP_FOUND: u16 = 201;

const ASSOCIATION_DELAY: Duration = Duration::from_millis(500);

pub struct SimulatedRadio {
    events: mpsc::UnboundedSender<LinkEvent>,
    network: Option<String>,
    address: Ipv4Addr,
}

impl SimulatedRadio {
    pub fn new(events: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self {
            events,
            network: None,
            address: Ipv4Addr::new(192, 168, 1, 100),
        }
    }

    fn emit_later(&self, event: LinkEvent) {
        let events = self.events.clone();
        std::thread::spawn(move || {
            std::thread::sleep(ASSOCIATION_DELAY);
            let _ = events.send(event);
        });
    }
}

impl RadioDriver for SimulatedRadio {
    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<(), DriverError> {
        info!(
            "[sim] Access point '{}' on channel {} (WPA2, max {} clients)",
            config.ssid, config.channel, config.max_connections
        );
        Ok(())
    }

    fn stop_access_point(&mut self) -> Result<(), DriverError> {
        info!("[sim] Access point down");
        Ok(())
    }

    fn start_station(&mut self, credentials: &Credentials) -> Result<(), DriverError> {
        info!("[sim] Station mode for '{}'", credentials.ssid);
        self.network = Some(credentials.ssid.clone());
        self.events
            .send(LinkEvent::StationStarted)
            .map_err(|_| DriverError::Radio("event channel closed".to_string()))
    }

    fn associate(&mut self) -> Result<(), DriverError> {
        let network = self
            .network
            .as_deref()
            .ok_or_else(|| DriverError::Radio("station not configured".to_string()))?;
        info!("[sim] Associating with '{}'", network);

        if network.starts_with("fail") {
            self.emit_later(LinkEvent::StationDisconnected {
                reason: Some(REASON_NO_AP_FOUND),
            });
        } else {
            self.emit_later(LinkEvent::AddressAcquired { ip: self.address });
        }
        Ok(())
    }

    fn stop_station(&mut self) -> Result<(), DriverError> {
        info!("[sim] Station down");
        self.network = None;
        Ok(())
    }
}
