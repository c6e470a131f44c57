//! # wifi-setup-core
//!
//! Core types for provisioning a headless device with WiFi credentials.
//!
//! This crate provides:
//! - Data model types (Credentials, ConnectionState)
//! - Credential storage abstraction with memory and file backends
//! - Portal security primitives (anti-forgery tokens, rate limiting, setup password)
//! - Setup form decoding and HTML pages
//! - Configuration types and boot planning
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (tokio) and ESP32 (esp-idf) targets.

pub mod boot;
pub mod config;
pub mod form;
pub mod guard;
pub mod model;
pub mod page;
pub mod password;
pub mod rate_limit;
pub mod store;

pub use config::WifiSetupConfig;
pub use guard::{AntiForgeryGuard, CsrfToken};
pub use model::*;
pub use password::SetupPassword;
pub use rate_limit::{RateDecision, RateLimiter};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError};
