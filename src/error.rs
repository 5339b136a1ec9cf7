//! # Error Handling
//!
//! Unified error handling for the authgate API: a problem+json `ApiError`
//! response envelope with trace ID propagation, plus the auth-flow error
//! taxonomy used by the OAuth coordinator and session service.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<C: Into<String>, M: Into<String>>(status: StatusCode, code: C, message: M) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract the current trace ID from the active task context, falling
    /// back to a generated correlation ID.
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

/// Errors raised inside the OAuth handshake and session lifecycle.
///
/// The handler boundary collapses most of these into a generic redirect so
/// callers cannot distinguish CSRF failures from account-state failures.
#[derive(Debug, Error)]
pub enum AuthFlowError {
    /// The presented state token does not match any stored state.
    #[error("state token is invalid or already consumed")]
    StateInvalid,

    /// The state row existed but was past its expiry.
    #[error("state token has expired")]
    StateExpired,

    /// The provider identity carries no verified email address.
    #[error("provider identity has no verified email")]
    UnverifiedIdentity,

    /// The provider could not be reached or timed out.
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider rejected the authorization code or verifier.
    #[error("identity provider rejected the grant: {0}")]
    InvalidGrant(String),

    /// No session exists for the presented token.
    #[error("session not found")]
    SessionNotFound,

    /// The session existed but was past its expiry; it has been deleted.
    #[error("session has expired")]
    SessionExpired,

    /// The caller exhausted its login rate-limit budget.
    #[error("rate limit exceeded; retry after {retry_after_seconds}s")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// Persistence failure underneath a flow operation.
    #[error("store unavailable: {0}")]
    Store(#[from] sea_orm::DbErr),

    /// Token encryption/decryption failure.
    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),
}

impl From<AuthFlowError> for ApiError {
    fn from(error: AuthFlowError) -> Self {
        match error {
            AuthFlowError::StateInvalid
            | AuthFlowError::StateExpired
            | AuthFlowError::UnverifiedIdentity
            | AuthFlowError::InvalidGrant(_) => {
                // One generic message for every handshake failure; the
                // specific cause only goes to the logs.
                tracing::warn!(error = %error, "Authentication handshake failed");
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "AUTHENTICATION_FAILED",
                    "Authentication failed",
                )
            }
            AuthFlowError::ProviderUnavailable(detail) => {
                tracing::error!(detail = %detail, "Identity provider unavailable");
                ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    "Identity provider is unavailable",
                )
            }
            AuthFlowError::SessionNotFound | AuthFlowError::SessionExpired => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required",
            ),
            AuthFlowError::RateLimitExceeded {
                retry_after_seconds,
            } => ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many login attempts",
            )
            .with_retry_after(retry_after_seconds),
            AuthFlowError::Store(db_err) => db_err.into(),
            AuthFlowError::Crypto(crypto_err) => {
                tracing::error!(error = %crypto_err, "Token crypto failure");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Detect a unique-constraint violation across the supported backends.
///
/// The user upsert and session-token insert paths treat this as a signal to
/// retry, not as a hard failure.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        let code_str = code.as_ref();
        code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str)
    })
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_failures_collapse_to_generic_message() {
        for error in [
            AuthFlowError::StateInvalid,
            AuthFlowError::StateExpired,
            AuthFlowError::UnverifiedIdentity,
            AuthFlowError::InvalidGrant("bad code".to_string()),
        ] {
            let api: ApiError = error.into();
            assert_eq!(api.status, StatusCode::UNAUTHORIZED);
            assert_eq!(&*api.code, "AUTHENTICATION_FAILED");
            assert_eq!(&*api.message, "Authentication failed");
        }
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let api: ApiError = AuthFlowError::RateLimitExceeded {
            retry_after_seconds: 42,
        }
        .into();
        assert_eq!(api.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(api.retry_after, Some(42));
    }

    #[test]
    fn test_provider_unavailable_maps_to_bad_gateway() {
        let api: ApiError = AuthFlowError::ProviderUnavailable("timeout".to_string()).into();
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
    }
}
