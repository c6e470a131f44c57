//! Test doubles for the radio, the portal server and result handlers.
//!
//! Every double is cheap to clone and clones share their recordings, so a
//! test keeps one clone while the manager owns another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use wifi_setup_core::{
    ConnectionState, CredentialStore, Credentials, MemoryCredentialStore, StoreError,
};

use crate::driver::{AccessPointConfig, PortalServer, RadioDriver};
use crate::error::DriverError;
use crate::handler::{ConnectionOutcome, ResultHandler};
use crate::manager::ConnectionManager;
use crate::portal::Provisioning;

/// Upper bound for the waiting helpers.
pub const WAIT: Duration = Duration::from_secs(5);

/// A call made on [`RecordingRadio`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartAccessPoint { ssid: String },
    StopAccessPoint,
    StartStation { ssid: String },
    Associate,
    StopStation,
}

/// Radio that records calls and optionally fails them.
#[derive(Clone, Default)]
pub struct RecordingRadio {
    calls: Arc<Mutex<Vec<RadioCall>>>,
    fail_access_point: Arc<AtomicBool>,
    fail_station: Arc<AtomicBool>,
}

impl RecordingRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Make `start_access_point` fail.
    pub fn fail_access_point(&self) {
        self.fail_access_point.store(true, Ordering::SeqCst);
    }

    /// Make `start_station` fail.
    pub fn fail_station(&self) {
        self.fail_station.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: RadioCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl RadioDriver for RecordingRadio {
    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<(), DriverError> {
        if self.fail_access_point.load(Ordering::SeqCst) {
            return Err(DriverError::Radio("access point unavailable".to_string()));
        }
        self.record(RadioCall::StartAccessPoint {
            ssid: config.ssid.clone(),
        });
        Ok(())
    }

    fn stop_access_point(&mut self) -> Result<(), DriverError> {
        self.record(RadioCall::StopAccessPoint);
        Ok(())
    }

    fn start_station(&mut self, credentials: &Credentials) -> Result<(), DriverError> {
        if self.fail_station.load(Ordering::SeqCst) {
            return Err(DriverError::Radio("station unavailable".to_string()));
        }
        self.record(RadioCall::StartStation {
            ssid: credentials.ssid.clone(),
        });
        Ok(())
    }

    fn associate(&mut self) -> Result<(), DriverError> {
        self.record(RadioCall::Associate);
        Ok(())
    }

    fn stop_station(&mut self) -> Result<(), DriverError> {
        self.record(RadioCall::StopStation);
        Ok(())
    }
}

/// Portal server that keeps the [`Provisioning`] it was started with.
#[derive(Clone, Default)]
pub struct CapturingPortal {
    current: Arc<Mutex<Option<Provisioning>>>,
    fail_start: Arc<AtomicBool>,
}

impl CapturingPortal {
    pub fn new() -> Self {
        Self::default()
    }

    /// The running portal's request handler.
    pub fn provisioning(&self) -> Option<Provisioning> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.provisioning().is_some()
    }

    /// Make `start` fail.
    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }
}

impl PortalServer for CapturingPortal {
    fn start(&mut self, provisioning: Provisioning) -> Result<(), DriverError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DriverError::Server("address in use".to_string()));
        }
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(provisioning);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Result handler that records every outcome.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    outcomes: Arc<Mutex<Vec<ConnectionOutcome>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<ConnectionOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `count` outcomes were recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<ConnectionOutcome> {
        let _ = tokio::time::timeout(WAIT, async {
            while self.outcomes().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        self.outcomes()
    }
}

impl ResultHandler for RecordingHandler {
    fn on_result(&self, outcome: ConnectionOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
    }
}

/// Credential store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

impl CredentialStore for FailingStore {
    fn save(&self, _credentials: &Credentials) -> Result<(), StoreError> {
        Err(StoreError::AccessFailure("storage offline".to_string()))
    }

    fn load(&self) -> Result<Credentials, StoreError> {
        Err(StoreError::AccessFailure("storage offline".to_string()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError::AccessFailure("storage offline".to_string()))
    }
}

/// In-memory store whose saves block for a fixed delay.
#[derive(Debug)]
pub struct SlowStore {
    inner: MemoryCredentialStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryCredentialStore::new(),
            delay,
        }
    }
}

impl CredentialStore for SlowStore {
    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        std::thread::sleep(self.delay);
        self.inner.save(credentials)
    }

    fn load(&self) -> Result<Credentials, StoreError> {
        self.inner.load()
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }
}

/// Wait until the manager reaches `state`. Returns false on timeout.
#[allow(clippy::let_and_return)]
pub async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) -> bool {
    let mut rx = manager.subscribe();
    // Bound to a local so the borrowed `watch::Ref` is dropped before `rx`.
    let reached = matches!(
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state)).await,
        Ok(Ok(_))
    );
    reached
}

/// Poll `condition` until it holds. Returns false on timeout.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
