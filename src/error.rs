use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the meli-sync service.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // ── Provider Errors ─────────────────────────────────────────────────
    /// The token endpoint rejected a code exchange or refresh.
    #[error("Authorization exchange failed: {0}")]
    AuthExchange(String),

    /// A resource endpoint answered with a non-2xx status.
    #[error("MercadoLibre API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Transport failure talking to the provider (connect, timeout, decode).
    #[error("Provider request failed: {0}")]
    Provider(String),

    // ── Resource Errors ─────────────────────────────────────────────────
    #[error("{0} not found")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // ── Session Errors ──────────────────────────────────────────────────
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid state parameter")]
    InvalidState,

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        SyncError::Api {
            status,
            body: body.into(),
        }
    }

    /// Errors the user can fix by going through the OAuth flow again.
    pub fn requires_authorization(&self) -> bool {
        matches!(self, SyncError::AuthExchange(_) | SyncError::NotFound(_))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        SyncError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        SyncError::Internal(e.to_string())
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SyncError::AuthExchange(_) => (StatusCode::BAD_GATEWAY, "auth_exchange_failed"),
            SyncError::Api { .. } => (StatusCode::BAD_GATEWAY, "api_error"),
            SyncError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            SyncError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            SyncError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            SyncError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            SyncError::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state"),
            SyncError::Crypto(_) => (StatusCode::INTERNAL_SERVER_ERROR, "crypto_error"),
            SyncError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            SyncError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            tracing::error!("{code}: {self}");
        }

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_authorization() {
        assert!(SyncError::AuthExchange("revoked".into()).requires_authorization());
        assert!(SyncError::NotFound("token".into()).requires_authorization());
        assert!(!SyncError::api(500, "boom").requires_authorization());
        assert!(!SyncError::Unauthorized.requires_authorization());
    }

    #[test]
    fn test_status_mapping() {
        let resp = SyncError::api(404, "{}").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = SyncError::BadRequest("missing code".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = SyncError::Database("down".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
