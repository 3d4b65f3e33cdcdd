// =============================================================================
// Bearer Token Authentication — Axum extractor for control endpoints
// =============================================================================
//
// The expected token is taken from `PULSE_ADMIN_TOKEN` at startup and held on
// the AppState. Comparison is constant time. When no token is configured every
// control request is rejected.
//
//   async fn handler(_auth: AuthBearer, ...) { ... }
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app_state::AppState;

/// Compare two byte slices in constant time for equal lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Proof that the request carried the admin bearer token.
pub struct AuthBearer;

/// Rejection returned when authentication fails.
pub struct AuthRejection {
    status: StatusCode,
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, axum::Json(body)).into_response()
    }
}

impl AuthRejection {
    fn forbidden(message: &'static str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message,
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthBearer {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token() else {
            warn!("PULSE_ADMIN_TOKEN is not set; rejecting control request");
            return Err(AuthRejection::forbidden("Server authentication not configured"));
        };

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let Some(token) = token else {
            warn!("missing or malformed Authorization header");
            return Err(AuthRejection::forbidden("Missing or invalid authorization token"));
        };

        if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            warn!("invalid admin token presented");
            return Err(AuthRejection::forbidden("Invalid authorization token"));
        }

        Ok(AuthBearer)
    }
}
