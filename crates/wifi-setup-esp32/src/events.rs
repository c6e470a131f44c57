//! System event loop subscriptions feeding the link event bridge.

use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::wifi::WifiEvent;
use log::debug;

use wifi_setup_server::{LinkEvent, LinkEventBridge};

/// Keeps the subscriptions alive; dropping it unsubscribes.
pub struct LinkSubscriptions {
    _wifi: EspSubscription<'static, System>,
    _ip: EspSubscription<'static, System>,
}

/// Forward station start, disassociation and DHCP events to `bridge`.
pub fn subscribe_link_events(
    sysloop: &EspSystemEventLoop,
    bridge: LinkEventBridge,
) -> anyhow::Result<LinkSubscriptions> {
    let wifi_bridge = bridge.clone();
    let wifi = sysloop.subscribe::<WifiEvent, _>(move |event| match event {
        WifiEvent::StaStarted => wifi_bridge.notify(LinkEvent::StationStarted),
        WifiEvent::StaDisconnected(info) => wifi_bridge.notify(LinkEvent::StationDisconnected {
            reason: Some(info.reason()),
        }),
        other => debug!("WiFi event: {:?}", other),
    })?;

    let ip = sysloop.subscribe::<IpEvent, _>(move |event| {
        if let IpEvent::DhcpIpAssigned(assignment) = event {
            bridge.notify(LinkEvent::AddressAcquired {
                ip: assignment.ip(),
            });
        }
    })?;

    Ok(LinkSubscriptions {
        _wifi: wifi,
        _ip: ip,
    })
}
