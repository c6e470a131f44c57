//! Integration tests for the connection manager state machine.
//!
//! The manager runs against a recording radio and a capturing portal;
//! driver notifications are injected through the link event bridge.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use wifi_setup_core::config::TimeoutSettings;
use wifi_setup_core::{
    ConnectionState, CredentialStore, Credentials, MemoryCredentialStore, SetupPassword,
    WifiSetupConfig,
};
use wifi_setup_server::testing::{
    eventually, wait_for_state, CapturingPortal, FailingStore, RadioCall, RecordingHandler,
    RecordingRadio, SlowStore,
};
use wifi_setup_server::{ConnectionManager, ConnectionOutcome, LinkEvent, LinkEventBridge, ManagerError};

const IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 42);

struct Harness {
    manager: ConnectionManager,
    bridge: LinkEventBridge,
    radio: RecordingRadio,
    portal: CapturingPortal,
    store: Arc<MemoryCredentialStore>,
}

fn test_config(timeouts: TimeoutSettings) -> WifiSetupConfig {
    WifiSetupConfig {
        timeouts,
        ..WifiSetupConfig::default()
    }
}

fn fast_timeouts() -> TimeoutSettings {
    TimeoutSettings {
        portal_ms: 10_000,
        connected_grace_ms: 10_000,
        failure_grace_ms: 500,
        handoff_delay_ms: 10,
    }
}

fn start(config: WifiSetupConfig, store: Arc<MemoryCredentialStore>) -> Harness {
    let radio = RecordingRadio::new();
    let portal = CapturingPortal::new();
    let manager = ConnectionManager::spawn(
        config,
        SetupPassword::new("28A10BFE"),
        store.clone(),
        radio.clone(),
        portal.clone(),
    );
    Harness {
        bridge: LinkEventBridge::new(manager.clone()),
        manager,
        radio,
        portal,
        store,
    }
}

fn with_credentials() -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_credentials(
        Credentials::new("Home", "secret123").unwrap(),
    ))
}

/// Connect and bring the link up.
async fn connect_and_link_up(h: &Harness, stay_connected: bool, handler: &RecordingHandler) {
    h.manager.connect(stay_connected, handler.clone()).await.unwrap();
    assert_eq!(h.manager.state(), ConnectionState::Connecting);

    h.bridge.notify(LinkEvent::StationStarted);
    h.bridge.notify(LinkEvent::AddressAcquired { ip: IP });
    assert!(wait_for_state(&h.manager, ConnectionState::Connected).await);
}

#[tokio::test]
async fn test_initial_state_is_idle() {
    let h = start(test_config(fast_timeouts()), Arc::new(MemoryCredentialStore::new()));
    assert_eq!(h.manager.state(), ConnectionState::Idle);
    assert!(!h.manager.has_credentials());
    assert!(h.radio.calls().is_empty());
}

#[tokio::test]
async fn test_connect_without_credentials() {
    let h = start(test_config(fast_timeouts()), Arc::new(MemoryCredentialStore::new()));
    let handler = RecordingHandler::new();

    let result = h.manager.connect(false, handler.clone()).await;
    assert!(matches!(result, Err(ManagerError::NotFound)));
    assert_eq!(h.manager.state(), ConnectionState::Idle);
    assert!(h.radio.calls().is_empty());
    assert!(handler.outcomes().is_empty());
}

#[tokio::test]
async fn test_connect_store_failure() {
    let radio = RecordingRadio::new();
    let manager = ConnectionManager::spawn(
        test_config(fast_timeouts()),
        SetupPassword::new("28A10BFE"),
        Arc::new(FailingStore),
        radio.clone(),
        CapturingPortal::new(),
    );

    let result = manager.connect(false, RecordingHandler::new()).await;
    assert!(matches!(result, Err(ManagerError::StoreAccessFailure(_))));
    assert!(radio.calls().is_empty());
}

#[tokio::test]
async fn test_connect_success() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    let handler = RecordingHandler::new();

    connect_and_link_up(&h, false, &handler).await;

    assert_eq!(
        h.radio.calls(),
        vec![
            RadioCall::StartStation {
                ssid: "Home".to_string()
            },
            RadioCall::Associate,
        ]
    );
    assert_eq!(handler.outcomes(), vec![ConnectionOutcome::Connected { ip: IP }]);
}

#[tokio::test]
async fn test_connect_twice_is_already_connected() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    let handler = RecordingHandler::new();

    h.manager.connect(false, handler.clone()).await.unwrap();
    let second = h.manager.connect(false, handler.clone()).await;
    assert!(matches!(second, Err(ManagerError::AlreadyConnected)));

    h.bridge.notify(LinkEvent::StationStarted);
    h.bridge.notify(LinkEvent::AddressAcquired { ip: IP });
    assert!(wait_for_state(&h.manager, ConnectionState::Connected).await);

    let third = h.manager.connect(true, handler.clone()).await;
    assert!(matches!(third, Err(ManagerError::AlreadyConnected)));
    assert_eq!(h.radio.count(&RadioCall::StartStation { ssid: "Home".to_string() }), 1);
}

#[tokio::test]
async fn test_retries_exhausted_reports_failure_once() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    let handler = RecordingHandler::new();

    h.manager.connect(false, handler.clone()).await.unwrap();
    h.bridge.notify(LinkEvent::StationStarted);
    for _ in 0..4 {
        h.bridge.notify(LinkEvent::StationDisconnected { reason: Some(201) });
    }

    assert!(wait_for_state(&h.manager, ConnectionState::Failed).await);
    // One initial association plus three retries.
    assert_eq!(h.radio.count(&RadioCall::Associate), 4);
    assert_eq!(handler.outcomes(), vec![ConnectionOutcome::Failed]);

    // Late link-downs are ignored once failed.
    h.bridge.notify(LinkEvent::StationDisconnected { reason: None });

    assert!(wait_for_state(&h.manager, ConnectionState::Disabled).await);
    assert_eq!(h.radio.count(&RadioCall::Associate), 4);
    assert_eq!(h.radio.count(&RadioCall::StopStation), 1);
    assert_eq!(handler.outcomes(), vec![ConnectionOutcome::Failed]);
}

#[tokio::test]
async fn test_link_up_after_retries_connects() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    let handler = RecordingHandler::new();

    h.manager.connect(false, handler.clone()).await.unwrap();
    h.bridge.notify(LinkEvent::StationStarted);
    h.bridge.notify(LinkEvent::StationDisconnected { reason: Some(15) });
    h.bridge.notify(LinkEvent::StationDisconnected { reason: Some(15) });
    h.bridge.notify(LinkEvent::AddressAcquired { ip: IP });

    assert!(wait_for_state(&h.manager, ConnectionState::Connected).await);
    assert_eq!(h.radio.count(&RadioCall::Associate), 3);
    assert_eq!(handler.outcomes(), vec![ConnectionOutcome::Connected { ip: IP }]);
}

#[tokio::test]
async fn test_connected_grace_period_disconnects() {
    let config = test_config(TimeoutSettings {
        connected_grace_ms: 200,
        ..fast_timeouts()
    });
    let h = start(config, with_credentials());
    let handler = RecordingHandler::new();

    connect_and_link_up(&h, false, &handler).await;

    assert!(wait_for_state(&h.manager, ConnectionState::Disabled).await);
    assert_eq!(
        handler.wait_for(2).await,
        vec![
            ConnectionOutcome::Connected { ip: IP },
            ConnectionOutcome::TimedOut
        ]
    );
    assert_eq!(h.radio.count(&RadioCall::StopStation), 1);
}

#[tokio::test]
async fn test_stay_connected_ignores_grace_period() {
    let config = test_config(TimeoutSettings {
        connected_grace_ms: 30,
        ..fast_timeouts()
    });
    let h = start(config, with_credentials());
    let handler = RecordingHandler::new();

    connect_and_link_up(&h, true, &handler).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.manager.state(), ConnectionState::Connected);

    h.manager.disconnect().await.unwrap();
    assert_eq!(h.manager.state(), ConnectionState::Disabled);
    assert_eq!(
        handler.outcomes(),
        vec![
            ConnectionOutcome::Connected { ip: IP },
            ConnectionOutcome::Disconnected
        ]
    );
    assert_eq!(h.radio.count(&RadioCall::StopStation), 1);
}

#[tokio::test]
async fn test_link_lost_while_connected() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    let handler = RecordingHandler::new();

    connect_and_link_up(&h, true, &handler).await;
    h.bridge.notify(LinkEvent::StationDisconnected { reason: Some(8) });

    assert!(wait_for_state(&h.manager, ConnectionState::Disabled).await);
    assert_eq!(
        handler.outcomes(),
        vec![
            ConnectionOutcome::Connected { ip: IP },
            ConnectionOutcome::Disconnected
        ]
    );
}

#[tokio::test]
async fn test_disconnect_when_idle_is_noop() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    h.manager.disconnect().await.unwrap();
    assert_eq!(h.manager.state(), ConnectionState::Idle);
    assert!(h.radio.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_disconnects_report_once() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    let handler = RecordingHandler::new();
    connect_and_link_up(&h, true, &handler).await;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let manager = h.manager.clone();
        let bridge = h.bridge.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                bridge.notify(LinkEvent::AddressAcquired { ip: IP });
            }
            manager.disconnect().await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(h.manager.state(), ConnectionState::Disabled);
    let disconnects = handler
        .outcomes()
        .into_iter()
        .filter(|o| *o == ConnectionOutcome::Disconnected)
        .count();
    assert_eq!(disconnects, 1);
    assert_eq!(h.radio.count(&RadioCall::StopStation), 1);
}

#[tokio::test]
async fn test_link_events_ignored_when_idle() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    h.bridge.notify(LinkEvent::StationStarted);
    h.bridge.notify(LinkEvent::AddressAcquired { ip: IP });
    h.bridge.notify(LinkEvent::StationDisconnected { reason: None });

    // A round trip through the manager guarantees the events were handled.
    h.manager.stop_portal().await.unwrap();
    assert_eq!(h.manager.state(), ConnectionState::Idle);
    assert!(h.radio.calls().is_empty());
}

#[tokio::test]
async fn test_station_start_failure_reported() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    let handler = RecordingHandler::new();
    h.radio.fail_station();

    h.manager.connect(false, handler.clone()).await.unwrap();
    assert_eq!(handler.outcomes(), vec![ConnectionOutcome::Failed]);
    assert_eq!(h.manager.state(), ConnectionState::Failed);
    assert!(wait_for_state(&h.manager, ConnectionState::Disabled).await);
}

#[tokio::test]
async fn test_start_portal() {
    let h = start(test_config(fast_timeouts()), Arc::new(MemoryCredentialStore::new()));
    let handler = RecordingHandler::new();

    h.manager.start_portal(handler.clone()).await.unwrap();
    assert_eq!(h.manager.state(), ConnectionState::PortalRunning);
    assert!(h.portal.is_running());
    assert_eq!(
        h.radio.calls(),
        vec![RadioCall::StartAccessPoint {
            ssid: "ESP32-WiFi-Setup".to_string()
        }]
    );

    let again = h.manager.start_portal(handler.clone()).await;
    assert!(matches!(
        again,
        Err(ManagerError::InvalidState(ConnectionState::PortalRunning))
    ));
    assert_eq!(h.radio.calls().len(), 1);
}

#[tokio::test]
async fn test_stop_portal_returns_to_idle() {
    let h = start(test_config(fast_timeouts()), Arc::new(MemoryCredentialStore::new()));
    let handler = RecordingHandler::new();

    h.manager.start_portal(handler.clone()).await.unwrap();
    h.manager.stop_portal().await.unwrap();

    assert_eq!(h.manager.state(), ConnectionState::Idle);
    assert!(!h.portal.is_running());
    assert_eq!(h.radio.count(&RadioCall::StopAccessPoint), 1);
    assert!(handler.outcomes().is_empty());
}

#[tokio::test]
async fn test_portal_timeout() {
    let config = test_config(TimeoutSettings {
        portal_ms: 50,
        ..fast_timeouts()
    });
    let h = start(config, Arc::new(MemoryCredentialStore::new()));
    let handler = RecordingHandler::new();

    h.manager.start_portal(handler.clone()).await.unwrap();

    assert!(wait_for_state(&h.manager, ConnectionState::Disabled).await);
    assert_eq!(handler.wait_for(1).await, vec![ConnectionOutcome::TimedOut]);
    assert!(!h.portal.is_running());
    assert_eq!(h.radio.count(&RadioCall::StopAccessPoint), 1);
}

#[tokio::test]
async fn test_portal_start_failure_releases_access_point() {
    let h = start(test_config(fast_timeouts()), Arc::new(MemoryCredentialStore::new()));
    let handler = RecordingHandler::new();
    h.portal.fail_start();

    h.manager.start_portal(handler.clone()).await.unwrap();

    assert_eq!(h.manager.state(), ConnectionState::Disabled);
    assert_eq!(handler.outcomes(), vec![ConnectionOutcome::Failed]);
    assert_eq!(h.radio.count(&RadioCall::StopAccessPoint), 1);
}

#[tokio::test]
async fn test_access_point_failure_reported() {
    let h = start(test_config(fast_timeouts()), Arc::new(MemoryCredentialStore::new()));
    let handler = RecordingHandler::new();
    h.radio.fail_access_point();

    h.manager.start_portal(handler.clone()).await.unwrap();

    assert_eq!(h.manager.state(), ConnectionState::Disabled);
    assert_eq!(handler.outcomes(), vec![ConnectionOutcome::Failed]);
    assert!(!h.portal.is_running());
}

#[tokio::test]
async fn test_submission_hands_off_to_station() {
    let h = start(test_config(fast_timeouts()), Arc::new(MemoryCredentialStore::new()));
    let handler = RecordingHandler::new();

    h.manager.start_portal(handler.clone()).await.unwrap();
    let provisioning = h.portal.provisioning().unwrap();
    provisioning.handle_get();
    let token = provisioning.current_token().unwrap();

    let body = format!("setup_pwd=28A10BFE&ssid=Home&password=secret123&csrf={}", token);
    let response = provisioning.handle_post(body.as_bytes()).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.contains("Success!"));
    assert_eq!(h.store.load().unwrap(), Credentials::new("Home", "secret123").unwrap());

    let radio = h.radio.clone();
    assert!(eventually(|| radio.count(&RadioCall::StartStation { ssid: "Home".to_string() }) == 1).await);
    assert!(!h.portal.is_running());
    assert_eq!(h.manager.state(), ConnectionState::Connecting);

    h.bridge.notify(LinkEvent::StationStarted);
    h.bridge.notify(LinkEvent::AddressAcquired { ip: IP });
    assert!(wait_for_state(&h.manager, ConnectionState::Connected).await);
    assert_eq!(handler.outcomes(), vec![ConnectionOutcome::Connected { ip: IP }]);
}

#[tokio::test]
async fn test_slow_save_racing_portal_timeout_still_connects() {
    let store = Arc::new(SlowStore::new(Duration::from_millis(300)));
    let radio = RecordingRadio::new();
    let portal = CapturingPortal::new();
    let config = test_config(TimeoutSettings {
        portal_ms: 100,
        ..fast_timeouts()
    });
    let manager = ConnectionManager::spawn(
        config,
        SetupPassword::new("28A10BFE"),
        store.clone(),
        radio.clone(),
        portal.clone(),
    );
    let handler = RecordingHandler::new();

    manager.start_portal(handler.clone()).await.unwrap();
    let provisioning = portal.provisioning().unwrap();
    provisioning.handle_get();
    let token = provisioning.current_token().unwrap();

    // The portal timeout fires while the save is still in progress.
    let body = format!("setup_pwd=28A10BFE&ssid=Home&password=secret123&csrf={}", token);
    let response = provisioning.handle_post(body.as_bytes()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert!(store.has_credentials());

    assert!(eventually(|| radio.count(&RadioCall::StartStation { ssid: "Home".to_string() }) == 1).await);
    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert!(handler.outcomes().is_empty());
}

#[tokio::test]
async fn test_disable_releases_everything_silently() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    let handler = RecordingHandler::new();
    connect_and_link_up(&h, true, &handler).await;

    h.manager.disable().await.unwrap();
    assert_eq!(h.manager.state(), ConnectionState::Disabled);
    assert_eq!(h.radio.count(&RadioCall::StopStation), 1);
    assert_eq!(handler.outcomes(), vec![ConnectionOutcome::Connected { ip: IP }]);

    // Portal can be started again from Disabled.
    h.manager.start_portal(handler.clone()).await.unwrap();
    assert_eq!(h.manager.state(), ConnectionState::PortalRunning);
}

#[tokio::test]
async fn test_clear_credentials() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    assert!(h.manager.has_credentials());

    h.manager.clear_credentials().await.unwrap();
    assert_eq!(h.manager.state(), ConnectionState::Disabled);
    assert!(!h.manager.has_credentials());

    let result = h.manager.connect(false, RecordingHandler::new()).await;
    assert!(matches!(result, Err(ManagerError::NotFound)));
}

#[tokio::test]
async fn test_store_credentials_validates() {
    let h = start(test_config(fast_timeouts()), Arc::new(MemoryCredentialStore::new()));

    let result = h.manager.store_credentials("", "secret");
    assert!(matches!(result, Err(ManagerError::InvalidArgument(_))));
    assert!(!h.manager.has_credentials());

    h.manager.store_credentials("Cafe", "").unwrap();
    assert!(h.manager.has_credentials());
}

#[tokio::test]
async fn test_shutdown_stops_manager() {
    let h = start(test_config(fast_timeouts()), with_credentials());
    h.manager.start_portal(RecordingHandler::new()).await.unwrap();

    h.manager.shutdown().await.unwrap();
    assert!(!h.portal.is_running());

    let result = h.manager.connect(false, RecordingHandler::new()).await;
    assert!(matches!(result, Err(ManagerError::Stopped)));
}
