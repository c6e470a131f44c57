//! Request handling for the setup form.
//!
//! [`Provisioning`] is transport-independent: the axum router on the host
//! and the esp-idf HTTP server on the device both pass raw request bodies
//! in and write the returned [`PortalResponse`] out.
//!
//! A submission is checked in a fixed order: rate limit, portal state, body
//! size, form decoding, setup password, anti-forgery token, then the network
//! name. A submission passing all checks is handed to the connection
//! manager, which persists it and leaves PortalRunning in one step. The
//! success page is only sent once the manager has accepted it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use wifi_setup_core::form::SetupForm;
use wifi_setup_core::page::{self, HTML_CONTENT_TYPE, SECURITY_HEADERS};
use wifi_setup_core::{
    AntiForgeryGuard, ConnectionState, Credentials, CsrfToken, RateLimiter, SetupPassword,
    StoreError, WifiSetupConfig,
};

use crate::error::ManagerError;
use crate::manager::ConnectionManager;

/// How long a blocking submission waits for the connection manager.
const SUBMIT_WAIT: Duration = Duration::from_secs(5);

/// A rejected submission.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Too many attempts. Try again later.")]
    RateLimited,

    #[error("{0}")]
    Malformed(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Setup is not accepting submissions")]
    Closed,

    #[error("Failed to save credentials")]
    Store(#[source] StoreError),

    #[error("Failed to start connection")]
    Unavailable,
}

impl PortalError {
    pub fn status_code(&self) -> u16 {
        match self {
            PortalError::RateLimited => 429,
            PortalError::Malformed(_) => 400,
            PortalError::Forbidden(_) => 403,
            PortalError::Closed => 503,
            PortalError::Store(_) | PortalError::Unavailable => 500,
        }
    }

    /// Error page for this rejection.
    pub fn into_response(self) -> PortalResponse {
        let status = self.status_code();
        PortalResponse::html(status, page::error_page(status, &self.to_string()))
    }
}

/// A rendered portal response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: u16,
    pub body: String,
}

impl PortalResponse {
    fn html(status: u16, body: String) -> Self {
        Self { status, body }
    }

    /// Headers to send with the response.
    pub fn headers(&self) -> [(&'static str, &'static str); 3] {
        [
            ("Content-Type", HTML_CONTENT_TYPE),
            SECURITY_HEADERS[0],
            SECURITY_HEADERS[1],
        ]
    }
}

struct Inner {
    setup_password: SetupPassword,
    guard: Mutex<AntiForgeryGuard>,
    limiter: Mutex<RateLimiter>,
    started: Instant,
    max_body_bytes: usize,
    manager: ConnectionManager,
}

/// Setup form handler for one portal session.
///
/// A new instance, with a fresh token and rate limit window, is created each
/// time the portal starts.
#[derive(Clone)]
pub struct Provisioning {
    inner: Arc<Inner>,
}

impl Provisioning {
    pub fn new(
        setup_password: SetupPassword,
        config: &WifiSetupConfig,
        manager: ConnectionManager,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                setup_password,
                guard: Mutex::new(AntiForgeryGuard::new()),
                limiter: Mutex::new(config.rate_limit.limiter()),
                started: Instant::now(),
                max_body_bytes: config.http.max_body_bytes,
                manager,
            }),
        }
    }

    /// Largest accepted submission body.
    pub fn max_body_bytes(&self) -> usize {
        self.inner.max_body_bytes
    }

    /// `GET /`: the setup form with a freshly issued token.
    pub fn handle_get(&self) -> PortalResponse {
        let token = lock(&self.inner.guard).issue();
        debug!("Serving setup form");
        PortalResponse::html(200, page::setup_page(&self.inner.setup_password, token))
    }

    /// `POST /save`: validate and hand off to the connection manager.
    pub async fn handle_post(&self, body: &[u8]) -> Result<PortalResponse, PortalError> {
        let credentials = self.validate(body)?;
        self.inner
            .manager
            .submit(credentials)
            .await
            .map_err(submit_error)?;
        Ok(PortalResponse::html(200, page::success_page()))
    }

    /// `POST /save` for HTTP servers running outside the tokio runtime.
    ///
    /// Blocks the calling thread until the connection manager answers.
    pub fn handle_post_blocking(&self, body: &[u8]) -> Result<PortalResponse, PortalError> {
        let credentials = self.validate(body)?;
        self.inner
            .manager
            .submit_blocking(credentials, SUBMIT_WAIT)
            .map_err(submit_error)?;
        Ok(PortalResponse::html(200, page::success_page()))
    }

    /// [`Self::handle_post`] with failures rendered as error pages.
    pub async fn respond_post(&self, body: &[u8]) -> PortalResponse {
        self.handle_post(body)
            .await
            .unwrap_or_else(PortalError::into_response)
    }

    /// [`Self::handle_post_blocking`] with failures rendered as error pages.
    pub fn respond_post_blocking(&self, body: &[u8]) -> PortalResponse {
        self.handle_post_blocking(body)
            .unwrap_or_else(PortalError::into_response)
    }

    fn validate(&self, body: &[u8]) -> Result<Credentials, PortalError> {
        let inner = &self.inner;

        let now_ms = inner.started.elapsed().as_millis() as u64;
        if !lock(&inner.limiter).check_and_record(now_ms).is_allowed() {
            warn!("Rate limit exceeded");
            return Err(PortalError::RateLimited);
        }

        if inner.manager.state() != ConnectionState::PortalRunning {
            debug!("Rejecting submission, portal not running");
            return Err(PortalError::Closed);
        }

        if body.len() > inner.max_body_bytes {
            return Err(PortalError::Malformed("Request too large".to_string()));
        }

        let form = SetupForm::decode(body).map_err(|e| {
            debug!("Malformed submission: {}", e);
            PortalError::Malformed(format!("Invalid request: {}", e))
        })?;

        if !inner.setup_password.matches(&form.setup_pwd) {
            warn!("Invalid setup password attempt");
            return Err(PortalError::Forbidden("Invalid password"));
        }

        let token_valid = CsrfToken::parse(&form.csrf)
            .map(|token| lock(&inner.guard).verify(token))
            .unwrap_or(false);
        if !token_valid {
            warn!("Anti-forgery token mismatch");
            return Err(PortalError::Forbidden("Invalid request"));
        }

        if form.ssid.is_empty() {
            return Err(PortalError::Malformed("SSID required".to_string()));
        }

        Credentials::new(form.ssid, form.password).map_err(|e| PortalError::Malformed(e.to_string()))
    }

    /// Token currently embedded in the form, if one was issued.
    pub fn current_token(&self) -> Option<CsrfToken> {
        lock(&self.inner.guard).current()
    }
}

fn submit_error(err: ManagerError) -> PortalError {
    match err {
        ManagerError::InvalidState(state) => {
            info!("Submission arrived in state {}, portal closed", state);
            PortalError::Closed
        }
        ManagerError::StoreAccessFailure(e) => PortalError::Store(e),
        other => {
            warn!("Submission not accepted: {}", other);
            PortalError::Unavailable
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
