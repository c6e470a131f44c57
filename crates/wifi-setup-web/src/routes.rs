//! Setup portal routes.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tracing::debug;

use wifi_setup_core::page;
use wifi_setup_server::{PortalResponse, Provisioning};

/// Hard cap on buffered request bodies. Bodies above the submission limit
/// but below this cap get a 400 from the form handler.
const MAX_REQUEST_BYTES: usize = 4096;

/// Create the portal router.
///
/// Routes:
/// - `GET /` - setup form with a fresh anti-forgery token
/// - `POST /save` - credential submission
pub fn create_router(provisioning: Provisioning) -> Router {
    Router::new()
        .route("/", get(setup_form))
        .route("/save", post(save))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .with_state(provisioning)
}

async fn setup_form(State(provisioning): State<Provisioning>) -> Response {
    render(provisioning.handle_get())
}

async fn save(State(provisioning): State<Provisioning>, body: Bytes) -> Response {
    let response = provisioning.respond_post(&body).await;
    if response.status != 200 {
        debug!("Submission rejected with {}", response.status);
    }
    render(response)
}

async fn not_found() -> Response {
    let response = PortalResponse {
        status: 404,
        body: page::error_page(404, "Not found"),
    };
    render(response)
}

fn render(response: PortalResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = response.headers();
    let mut out = (status, response.body).into_response();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            out.headers_mut().insert(name, value);
        }
    }
    out
}
