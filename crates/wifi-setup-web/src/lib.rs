//! # wifi-setup-web
//!
//! HTTP front end of the setup portal.
//!
//! This crate provides:
//! - [`create_router`] - `GET /` (setup form) and `POST /save` (submission)
//! - [`AxumPortal`] - a [`wifi_setup_server::PortalServer`] serving the router
//!   on a TCP listener
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wifi_setup_web::AxumPortal;
//!
//! let portal = AxumPortal::new("0.0.0.0:80".parse()?);
//! let manager = ConnectionManager::spawn(config, password, store, radio, portal);
//! manager.start_portal(|outcome| println!("{}", outcome)).await?;
//! ```

pub mod routes;
pub mod serve;

pub use routes::create_router;
pub use serve::AxumPortal;
