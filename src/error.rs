use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

/// Email gateway failure normalised to `{code, message, error}`.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct EmailError {
    pub code: u16,
    pub message: String,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Password and confirmation do not match")]
    PasswordMismatch,
    #[error("{0}")]
    WeakPassword(String),
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email not confirmed")]
    AccountNotConfirmed,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token is no longer valid")]
    StaleToken,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error(transparent)]
    EmailDelivery(#[from] EmailError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::PasswordMismatch | AuthError::WeakPassword(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::StaleToken
            | AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::AccountNotConfirmed => StatusCode::FORBIDDEN,
            AuthError::EmailDelivery(_) => StatusCode::BAD_GATEWAY,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable name, used as the `error` query param on redirects.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation",
            AuthError::PasswordMismatch => "password_mismatch",
            AuthError::WeakPassword(_) => "weak_password",
            AuthError::DuplicateEmail => "duplicate_email",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountNotConfirmed => "account_not_confirmed",
            AuthError::InvalidToken => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::StaleToken => "stale_token",
            AuthError::Unauthorized(_) => "unauthorized",
            AuthError::EmailDelivery(_) => "email_delivery",
            AuthError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(inner: sqlx::Error) -> Self {
        AuthError::Internal(inner.into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AuthError::EmailDelivery(e) => json!({
                "code": e.code,
                "message": e.message,
                "error": e.error,
            }),
            AuthError::Internal(e) => {
                error!(error = ?e, "internal error");
                json!({ "code": status.as_u16(), "message": "Internal server error" })
            }
            other => json!({ "code": status.as_u16(), "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
