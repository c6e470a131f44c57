//! The connection manager: owner of the provisioning state machine.
//!
//! ```text
//!   Idle/Disabled/Failed --start_portal--> PortalRunning
//!   PortalRunning --valid submission--> Connecting
//!   PortalRunning --portal timeout--> Disabled          (TimedOut)
//!   PortalRunning --stop_portal--> Idle
//!   Idle/Disabled/Failed/PortalRunning --connect--> Connecting
//!   Connecting --link up--> Connected                   (Connected)
//!   Connecting --link down, retries left--> Connecting
//!   Connecting --link down, retries exhausted--> Failed (Failed)
//!   Failed --failure grace--> Disabled
//!   Connected --grace timeout, not staying--> Disabled  (TimedOut)
//!   Connected --link down--> Disabled                   (Disconnected)
//!   any active --disconnect--> Disabled                 (Disconnected)
//!   any --disable / clear_credentials--> Disabled
//! ```
//!
//! All transitions happen on a single actor task. Callers, HTTP handlers,
//! driver callbacks and timers only send commands, so the state and the
//! held radio resources always change together.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use wifi_setup_core::{
    ConnectionState, CredentialStore, Credentials, SetupPassword, StoreError, WifiSetupConfig,
};

use crate::driver::{AccessPointConfig, PortalServer, RadioDriver, Resources};
use crate::error::{DriverError, ManagerError};
use crate::handler::{ConnectionOutcome, ResultHandler};
use crate::portal::Provisioning;
use crate::timeout::TimeoutScheduler;

/// Link-layer inputs produced by the [`crate::LinkEventBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkInput {
    Associate,
    LinkDown,
    LinkUp { ip: Ipv4Addr },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeoutKind {
    /// Portal lifetime expired.
    Portal,
    /// Success page delivered; tear down the portal and start the station.
    Handoff,
    /// Connected grace period expired.
    ConnectedGrace,
    /// Settle time after a failure expired.
    FailureGrace,
}

enum Command {
    StartPortal {
        handler: Arc<dyn ResultHandler>,
        reply: oneshot::Sender<Result<(), ManagerError>>,
    },
    StopPortal {
        reply: oneshot::Sender<()>,
    },
    Connect {
        stay_connected: bool,
        handler: Arc<dyn ResultHandler>,
        reply: oneshot::Sender<Result<(), ManagerError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Disable {
        reply: oneshot::Sender<()>,
    },
    ClearCredentials {
        reply: oneshot::Sender<Result<(), ManagerError>>,
    },
    Submit {
        credentials: Credentials,
        reply: oneshot::Sender<Result<(), ManagerError>>,
    },
    Link(LinkInput),
    Timeout(TimeoutKind),
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the connection manager task.
///
/// Cheap to clone; every clone talks to the same state machine.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    store: Arc<dyn CredentialStore>,
}

impl ConnectionManager {
    /// Spawn the manager task on the current tokio runtime.
    ///
    /// The radio and portal server are owned by the task from here on.
    pub fn spawn<R, P>(
        config: WifiSetupConfig,
        setup_password: SetupPassword,
        store: Arc<dyn CredentialStore>,
        radio: R,
        portal: P,
    ) -> Self
    where
        R: RadioDriver,
        P: PortalServer,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let handle = Self {
            commands: command_tx.clone(),
            state: state_rx,
            store: store.clone(),
        };

        let worker = Worker {
            access_point: AccessPointConfig::new(&config.access_point, setup_password.clone()),
            config,
            setup_password,
            store,
            resources: Arc::new(Mutex::new(Resources::new(radio, portal))),
            timeout: TimeoutScheduler::new(),
            commands: command_tx,
            state: state_tx,
            handle: handle.clone(),
            handler: None,
            stay_connected: false,
            retries: 0,
            awaiting_handoff: false,
        };
        tokio::spawn(worker.run(command_rx));

        handle
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch receiver following every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Whether usable credentials are stored.
    pub fn has_credentials(&self) -> bool {
        self.store.has_credentials()
    }

    /// Validate and persist credentials without connecting.
    pub fn store_credentials(
        &self,
        ssid: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), ManagerError> {
        let credentials = Credentials::new(ssid, password)?;
        self.store.save(&credentials).map_err(ManagerError::StoreAccessFailure)
    }

    /// Start the provisioning access point and setup form.
    ///
    /// Allowed from Idle, Disabled and Failed. The handler receives the
    /// outcome of the session: the connection result after a submission,
    /// or [`ConnectionOutcome::TimedOut`] when nobody submits in time.
    pub async fn start_portal<H>(&self, handler: H) -> Result<(), ManagerError>
    where
        H: ResultHandler + 'static,
    {
        let handler: Arc<dyn ResultHandler> = Arc::new(handler);
        self.request(|reply| Command::StartPortal { handler, reply })
            .await?
    }

    /// Stop a running portal without reporting an outcome.
    pub async fn stop_portal(&self) -> Result<(), ManagerError> {
        self.request(|reply| Command::StopPortal { reply }).await
    }

    /// Join the stored network.
    ///
    /// Returns once the attempt has started. Unless `stay_connected` is
    /// set, the connection is released after the connected grace period.
    pub async fn connect<H>(&self, stay_connected: bool, handler: H) -> Result<(), ManagerError>
    where
        H: ResultHandler + 'static,
    {
        let handler: Arc<dyn ResultHandler> = Arc::new(handler);
        self.request(|reply| Command::Connect {
            stay_connected,
            handler,
            reply,
        })
        .await?
    }

    /// End the current session, reporting [`ConnectionOutcome::Disconnected`].
    pub async fn disconnect(&self) -> Result<(), ManagerError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Release all radio resources. No outcome is reported.
    pub async fn disable(&self) -> Result<(), ManagerError> {
        self.request(|reply| Command::Disable { reply }).await
    }

    /// Disable and erase the stored credentials.
    pub async fn clear_credentials(&self) -> Result<(), ManagerError> {
        self.request(|reply| Command::ClearCredentials { reply })
            .await?
    }

    /// Release everything and stop the manager task.
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Persist a validated portal submission and start connecting.
    ///
    /// Fails with [`ManagerError::InvalidState`] unless the portal is
    /// running; nothing is saved in that case.
    pub(crate) async fn submit(&self, credentials: Credentials) -> Result<(), ManagerError> {
        self.request(|reply| Command::Submit { credentials, reply })
            .await?
    }

    /// [`Self::submit`] for callers outside the runtime.
    ///
    /// Polls for the answer so an HTTP server that stops while a request
    /// is in flight is never blocked for longer than `wait`.
    pub(crate) fn submit_blocking(
        &self,
        credentials: Credentials,
        wait: Duration,
    ) -> Result<(), ManagerError> {
        let (reply_tx, mut reply_rx) = oneshot::channel();
        self.send(Command::Submit {
            credentials,
            reply: reply_tx,
        })?;

        let deadline = Instant::now() + wait;
        loop {
            match reply_rx.try_recv() {
                Ok(result) => return result,
                Err(oneshot::error::TryRecvError::Closed) => return Err(ManagerError::Stopped),
                Err(oneshot::error::TryRecvError::Empty) if Instant::now() >= deadline => {
                    return Err(ManagerError::Unresponsive)
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    std::thread::sleep(Duration::from_millis(5))
                }
            }
        }
    }

    pub(crate) fn link(&self, input: LinkInput) -> Result<(), ManagerError> {
        self.send(Command::Link(input))
    }

    fn send(&self, command: Command) -> Result<(), ManagerError> {
        self.commands
            .send(command)
            .map_err(|_| ManagerError::Stopped)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ManagerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx))?;
        reply_rx.await.map_err(|_| ManagerError::Stopped)
    }
}

struct Worker<R, P> {
    config: WifiSetupConfig,
    access_point: AccessPointConfig,
    setup_password: SetupPassword,
    store: Arc<dyn CredentialStore>,
    resources: Arc<Mutex<Resources<R, P>>>,
    timeout: TimeoutScheduler,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Sender<ConnectionState>,
    handle: ConnectionManager,
    handler: Option<Arc<dyn ResultHandler>>,
    stay_connected: bool,
    retries: u8,
    /// A submission was accepted and the station has not been started yet.
    awaiting_handoff: bool,
}

impl<R: RadioDriver, P: PortalServer> Worker<R, P> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("Connection manager started");

        while let Some(command) = commands.recv().await {
            match command {
                Command::StartPortal { handler, reply } => {
                    let result = self.start_portal(handler).await;
                    let _ = reply.send(result);
                }
                Command::StopPortal { reply } => {
                    self.stop_portal().await;
                    let _ = reply.send(());
                }
                Command::Connect {
                    stay_connected,
                    handler,
                    reply,
                } => {
                    let result = self.connect(stay_connected, handler).await;
                    let _ = reply.send(result);
                }
                Command::Disconnect { reply } => {
                    self.disconnect().await;
                    let _ = reply.send(());
                }
                Command::Disable { reply } => {
                    self.disable().await;
                    let _ = reply.send(());
                }
                Command::ClearCredentials { reply } => {
                    self.disable().await;
                    let result = self.store.clear().map_err(ManagerError::StoreAccessFailure);
                    if result.is_ok() {
                        info!("Stored credentials cleared");
                    }
                    let _ = reply.send(result);
                }
                Command::Submit { credentials, reply } => {
                    let result = self.submit(credentials).await;
                    let _ = reply.send(result);
                }
                Command::Link(input) => self.on_link(input).await,
                Command::Timeout(kind) => self.on_timeout(kind).await,
                Command::Shutdown { reply } => {
                    self.disable().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }

        self.timeout.cancel();
        self.release_all().await;
        debug!("Connection manager stopped");
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("WiFi state: {} -> {}", previous, next);
        }
    }

    fn notify(&self, outcome: ConnectionOutcome) {
        debug!("Reporting outcome: {}", outcome);
        if let Some(handler) = &self.handler {
            handler.on_result(outcome);
        }
    }

    fn arm(&self, kind: TimeoutKind) {
        let after = match kind {
            TimeoutKind::Portal => self.config.timeouts.portal(),
            TimeoutKind::Handoff => self.config.timeouts.handoff_delay(),
            TimeoutKind::ConnectedGrace => self.config.timeouts.connected_grace(),
            TimeoutKind::FailureGrace => self.config.timeouts.failure_grace(),
        };
        let commands = self.commands.clone();
        self.timeout.arm(after, move || {
            let _ = commands.send(Command::Timeout(kind));
        });
    }

    /// Run a resource operation on the blocking pool.
    async fn with_resources<F>(&self, op: F) -> Result<(), DriverError>
    where
        F: FnOnce(&mut Resources<R, P>) -> Result<(), DriverError> + Send + 'static,
    {
        let resources = Arc::clone(&self.resources);
        tokio::task::spawn_blocking(move || {
            let mut resources = resources.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut resources)
        })
        .await
        .map_err(|e| DriverError::Radio(format!("resource task failed: {}", e)))?
    }

    async fn release_all(&self) {
        let result = self
            .with_resources(|r| {
                r.release_all();
                Ok(())
            })
            .await;
        if let Err(e) = result {
            error!("Failed to release radio resources: {}", e);
        }
    }

    fn reset_session(&mut self, handler: Arc<dyn ResultHandler>, stay_connected: bool) {
        self.handler = Some(handler);
        self.stay_connected = stay_connected;
        self.retries = 0;
        self.awaiting_handoff = false;
    }

    async fn start_portal(&mut self, handler: Arc<dyn ResultHandler>) -> Result<(), ManagerError> {
        let state = self.current();
        if !state.is_quiescent() {
            warn!("Cannot start portal in state {}", state);
            return Err(ManagerError::InvalidState(state));
        }

        self.timeout.cancel();
        self.release_all().await;
        self.reset_session(handler, false);

        let provisioning = Provisioning::new(
            self.setup_password.clone(),
            &self.config,
            self.handle.clone(),
        );
        let access_point = self.access_point.clone();
        let result = self
            .with_resources(move |r| r.open_portal(&access_point, provisioning))
            .await;

        match result {
            Ok(()) => {
                self.set_state(ConnectionState::PortalRunning);
                self.arm(TimeoutKind::Portal);
                info!(
                    "Setup portal running on '{}' (http://{})",
                    self.access_point.ssid, self.access_point.gateway
                );
            }
            Err(e) => {
                error!("Failed to start setup portal: {}", e);
                self.release_all().await;
                self.set_state(ConnectionState::Disabled);
                self.notify(ConnectionOutcome::Failed);
            }
        }
        Ok(())
    }

    async fn stop_portal(&mut self) {
        if self.current() != ConnectionState::PortalRunning {
            debug!("Portal not running, nothing to stop");
            return;
        }
        self.timeout.cancel();
        self.release_all().await;
        self.set_state(ConnectionState::Idle);
    }

    async fn connect(
        &mut self,
        stay_connected: bool,
        handler: Arc<dyn ResultHandler>,
    ) -> Result<(), ManagerError> {
        match self.current() {
            ConnectionState::Connected | ConnectionState::Connecting => {
                return Err(ManagerError::AlreadyConnected)
            }
            _ => {}
        }

        let credentials = self.store.load()?;

        self.timeout.cancel();
        self.release_all().await;
        self.reset_session(handler, stay_connected);
        self.set_state(ConnectionState::Connecting);
        self.start_station(credentials).await;
        Ok(())
    }

    async fn start_station(&mut self, credentials: Credentials) {
        info!("Connecting to WiFi network '{}'", credentials.ssid);
        let result = self
            .with_resources(move |r| r.open_station(&credentials))
            .await;
        if let Err(e) = result {
            error!("Failed to start station: {}", e);
            self.fail();
        }
    }

    async fn disconnect(&mut self) {
        let state = self.current();
        if matches!(state, ConnectionState::Idle | ConnectionState::Disabled) {
            debug!("Nothing to disconnect in state {}", state);
            return;
        }

        self.timeout.cancel();
        self.release_all().await;
        self.set_state(ConnectionState::Disabled);
        self.awaiting_handoff = false;
        // A failed session has already reported its outcome.
        if state != ConnectionState::Failed {
            self.notify(ConnectionOutcome::Disconnected);
        }
    }

    async fn disable(&mut self) {
        self.timeout.cancel();
        self.release_all().await;
        self.awaiting_handoff = false;
        self.set_state(ConnectionState::Disabled);
    }

    async fn submit(&mut self, credentials: Credentials) -> Result<(), ManagerError> {
        let state = self.current();
        if state != ConnectionState::PortalRunning {
            warn!("Rejecting submission in state {}", state);
            return Err(ManagerError::InvalidState(state));
        }

        let store = Arc::clone(&self.store);
        let ssid = credentials.ssid.clone();
        tokio::task::spawn_blocking(move || store.save(&credentials))
            .await
            .map_err(|e| StoreError::AccessFailure(format!("store task failed: {}", e)))
            .and_then(|saved| saved)
            .map_err(|e| {
                error!("Failed to save credentials: {}", e);
                ManagerError::StoreAccessFailure(e)
            })?;
        info!("Credentials saved for '{}'", ssid);

        self.stay_connected = false;
        self.retries = 0;
        self.awaiting_handoff = true;
        self.set_state(ConnectionState::Connecting);
        // Replaces the portal timeout.
        self.arm(TimeoutKind::Handoff);
        Ok(())
    }

    async fn handoff(&mut self) {
        self.awaiting_handoff = false;
        let result = self
            .with_resources(|r| {
                r.close_portal();
                Ok(())
            })
            .await;
        if let Err(e) = result {
            error!("Failed to stop setup portal: {}", e);
        }

        match self.store.load() {
            Ok(credentials) => self.start_station(credentials).await,
            Err(e) => {
                error!("Failed to load submitted credentials: {}", e);
                self.fail();
            }
        }
    }

    async fn on_link(&mut self, input: LinkInput) {
        let state = self.current();
        match (input, state) {
            (LinkInput::Associate, ConnectionState::Connecting) if !self.awaiting_handoff => {
                self.associate().await;
            }
            (LinkInput::LinkDown, ConnectionState::Connecting) if !self.awaiting_handoff => {
                self.retry_or_fail().await;
            }
            (LinkInput::LinkDown, ConnectionState::Connected) => {
                warn!("Lost connection to WiFi network");
                self.timeout.cancel();
                self.release_all().await;
                self.set_state(ConnectionState::Disabled);
                self.notify(ConnectionOutcome::Disconnected);
            }
            (LinkInput::LinkUp { ip }, ConnectionState::Connecting) if !self.awaiting_handoff => {
                self.retries = 0;
                self.set_state(ConnectionState::Connected);
                if self.stay_connected {
                    self.timeout.cancel();
                } else {
                    self.arm(TimeoutKind::ConnectedGrace);
                }
                info!("Connected to WiFi with IP {}", ip);
                self.notify(ConnectionOutcome::Connected { ip });
            }
            (input, state) => {
                debug!("Ignoring {:?} in state {}", input, state);
            }
        }
    }

    async fn associate(&mut self) {
        if let Err(e) = self.with_resources(|r| r.associate()).await {
            warn!("Association request failed: {}", e);
            self.retry_or_fail().await;
        }
    }

    async fn retry_or_fail(&mut self) {
        loop {
            if self.retries >= self.config.retry.max_retries {
                warn!("Failed to connect after {} retries", self.retries);
                self.fail();
                return;
            }
            self.retries += 1;
            info!(
                "Retry connecting ({}/{})",
                self.retries, self.config.retry.max_retries
            );
            match self.with_resources(|r| r.associate()).await {
                Ok(()) => return,
                Err(e) => warn!("Association request failed: {}", e),
            }
        }
    }

    /// Connecting → Failed, reporting once. Resources are released after
    /// the failure grace period.
    fn fail(&mut self) {
        self.timeout.cancel();
        self.awaiting_handoff = false;
        self.set_state(ConnectionState::Failed);
        self.notify(ConnectionOutcome::Failed);
        self.arm(TimeoutKind::FailureGrace);
    }

    async fn on_timeout(&mut self, kind: TimeoutKind) {
        let state = self.current();
        match (kind, state) {
            (TimeoutKind::Portal, ConnectionState::PortalRunning) => {
                info!("Setup portal timed out");
                self.release_all().await;
                self.set_state(ConnectionState::Disabled);
                self.notify(ConnectionOutcome::TimedOut);
            }
            (TimeoutKind::Handoff, ConnectionState::Connecting) if self.awaiting_handoff => {
                self.handoff().await;
            }
            (TimeoutKind::ConnectedGrace, ConnectionState::Connected) if !self.stay_connected => {
                info!("Connected grace period over, disconnecting");
                self.release_all().await;
                self.set_state(ConnectionState::Disabled);
                self.notify(ConnectionOutcome::TimedOut);
            }
            (TimeoutKind::FailureGrace, ConnectionState::Failed) => {
                self.release_all().await;
                self.set_state(ConnectionState::Disabled);
            }
            (kind, state) => {
                debug!("Ignoring stale {:?} timeout in state {}", kind, state);
            }
        }
    }
}
