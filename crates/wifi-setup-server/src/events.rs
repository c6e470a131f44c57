//! Mapping of radio driver notifications onto connection manager inputs.
//!
//! Driver callbacks run on the driver's own context (the esp-idf system
//! event task, or a simulator thread). [`LinkEventBridge::notify`] only
//! enqueues a command, so it never blocks on the manager or the radio.

use std::net::Ipv4Addr;

use tracing::{debug, info};

use crate::manager::{ConnectionManager, LinkInput};

/// A station-side notification from the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The station interface is up and can associate.
    StationStarted,
    /// The station lost or failed its association.
    StationDisconnected { reason: Option<u16> },
    /// DHCP assigned an address.
    AddressAcquired { ip: Ipv4Addr },
}

/// Forwards [`LinkEvent`]s to the connection manager.
///
/// The bridge makes no decisions; whether an event matters is decided by
/// the manager against its current state.
#[derive(Clone)]
pub struct LinkEventBridge {
    manager: ConnectionManager,
}

impl LinkEventBridge {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Deliver an event. Safe to call from any thread.
    pub fn notify(&self, event: LinkEvent) {
        let input = match event {
            LinkEvent::StationStarted => {
                debug!("Station interface started");
                LinkInput::Associate
            }
            LinkEvent::StationDisconnected { reason } => {
                match reason {
                    Some(code) => info!("Station disconnected (reason {})", code),
                    None => info!("Station disconnected"),
                }
                LinkInput::LinkDown
            }
            LinkEvent::AddressAcquired { ip } => {
                info!("Got IP: {}", ip);
                LinkInput::LinkUp { ip }
            }
        };

        if self.manager.link(input).is_err() {
            debug!("Connection manager stopped, dropping {:?}", event);
        }
    }
}
