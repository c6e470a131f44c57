//! # wifi-setup-server
//!
//! Connection lifecycle for WiFi provisioning.
//!
//! This crate provides:
//! - [`ConnectionManager`] - the single owner of the connection state machine
//! - [`Provisioning`] - setup form request handling (GET form, POST submission)
//! - [`TimeoutScheduler`] - one cancelable delayed action at a time
//! - [`LinkEventBridge`] - maps radio driver notifications onto manager inputs
//! - [`RadioDriver`] / [`PortalServer`] - seams implemented per platform
//!
//! ## Architecture
//!
//! The manager runs as an actor task. HTTP handlers, driver event callbacks,
//! timers and the caller's control context all talk to it through a command
//! channel, so the state and the radio resources have exactly one writer.
//! Radio and HTTP server start/stop run on the blocking pool and never under
//! a lock that the event path needs.

pub mod driver;
pub mod error;
pub mod events;
pub mod handler;
pub mod manager;
pub mod portal;
pub mod timeout;

#[cfg(feature = "test-support")]
pub mod testing;

pub use driver::{AccessPointConfig, PortalServer, RadioDriver};
pub use error::{DriverError, ManagerError};
pub use events::{LinkEvent, LinkEventBridge};
pub use handler::{ConnectionOutcome, ResultHandler};
pub use manager::ConnectionManager;
pub use portal::{PortalError, PortalResponse, Provisioning};
pub use timeout::TimeoutScheduler;

pub use wifi_setup_core::{ConnectionState, Credentials, WifiSetupConfig};
