//! Boundary conversion (A2): taxon_common::Error into wire form. The
//! WebSocket side converts to an `error` frame (§7: never disconnects for
//! these kinds); the HTTP side converts to a status code + JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use taxon_common::Error;

use crate::protocol::ServerFrame;

/// Renders an error frame for the sender, per §7's policy that
/// `EInvalidInput`/`ENotFound`/`EForbidden` stay on the wire, not a closed
/// connection.
pub fn to_error_frame(err: &Error) -> ServerFrame {
    ServerFrame::error(err.to_string())
}

/// Wraps `taxon_common::Error` so handlers can `?`-propagate and still
/// produce the right HTTP status (§7's `ENotFound` → 404 etc.).
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Upstream(..) => StatusCode::BAD_GATEWAY,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "detail": self.0.to_string() }))).into_response()
    }
}
