mod radio;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wifi_setup_core::boot::{plan_boot, BootAction, WakeCause};
use wifi_setup_core::{ConnectionState, FileCredentialStore, SetupPassword, WifiSetupConfig};
use wifi_setup_server::{ConnectionManager, ConnectionOutcome, LinkEventBridge};
use wifi_setup_web::AxumPortal;

use crate::radio::SimulatedRadio;

/// Simulated hardware identity when `WIFI_SETUP_MAC` is not set.
const DEFAULT_MAC: [u8; 6] = [0x24, 0x6f, 0x28, 0xa1, 0x0b, 0xfe];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,wifi_setup_server=debug,wifi_setup_web=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("WiFi setup simulator starting...");

    // Configuration
    let config = match std::env::var("WIFI_SETUP_CONFIG") {
        Ok(path) => WifiSetupConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => WifiSetupConfig::default(),
    };
    let credentials_path =
        std::env::var("WIFI_SETUP_CREDENTIALS").unwrap_or_else(|_| "wifi_setup.json".into());
    let mac = match std::env::var("WIFI_SETUP_MAC") {
        Ok(text) => parse_mac(&text).with_context(|| format!("invalid WIFI_SETUP_MAC '{}'", text))?,
        Err(_) => DEFAULT_MAC,
    };
    let switch_closed = std::env::var("WIFI_SETUP_SWITCH").is_ok_and(|v| v == "1");

    let store = Arc::new(FileCredentialStore::new(&credentials_path));
    let setup_password = SetupPassword::from_mac(mac);
    tracing::info!("Setup password: {}", setup_password);
    tracing::info!("Credentials file: {}", credentials_path);

    let portal_addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let manager = ConnectionManager::spawn(
        config,
        setup_password,
        store,
        SimulatedRadio::new(event_tx),
        AxumPortal::new(portal_addr),
    );

    // Forward simulated driver events
    let bridge = LinkEventBridge::new(manager.clone());
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            bridge.notify(event);
        }
    });

    let report = |outcome: ConnectionOutcome| {
        if outcome.is_success() {
            tracing::info!("Provisioning result: {}", outcome);
        } else {
            tracing::warn!("Provisioning result: {}", outcome);
        }
    };

    match plan_boot(WakeCause::ColdBoot, manager.has_credentials(), switch_closed) {
        BootAction::StartPortal => {
            manager.start_portal(report).await?;
            tracing::info!("Open http://localhost:{} to provision", portal_addr.port());
        }
        BootAction::Connect => {
            manager.connect(false, report).await?;
        }
        BootAction::Sleep => {
            tracing::info!("Nothing to do");
            return Ok(());
        }
    }

    // Wait for the session to end or a shutdown signal
    let mut state = manager.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = state.wait_for(|s| *s == ConnectionState::Disabled) => {
            tracing::info!("Session finished");
        }
    }

    manager.shutdown().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Parse a MAC address written as six colon- or dash-separated hex bytes.
fn parse_mac(text: &str) -> anyhow::Result<[u8; 6]> {
    let parts: Vec<&str> = text.trim().split(|c: char| c == ':' || c == '-').collect();
    anyhow::ensure!(parts.len() == 6, "expected 6 bytes, got {}", parts.len());

    let mut mac = [0u8; 6];
    for (byte, part) in mac.iter_mut().zip(parts) {
        *byte = u8::from_str_radix(part, 16).with_context(|| format!("bad byte '{}'", part))?;
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            parse_mac("24:6f:28:a1:0b:fe").unwrap(),
            [0x24, 0x6f, 0x28, 0xa1, 0x0b, 0xfe]
        );
        assert_eq!(
            parse_mac("24-6F-28-A1-0B-FE").unwrap(),
            [0x24, 0x6f, 0x28, 0xa1, 0x0b, 0xfe]
        );
    }

    #[test]
    fn test_parse_mac_rejects_garbage() {
        assert!(parse_mac("24:6f:28").is_err());
        assert!(parse_mac("zz:6f:28:a1:0b:fe").is_err());
        assert!(parse_mac("").is_err());
    }
}
