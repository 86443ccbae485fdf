use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use gatehouse_auth_types::token::TokenError;

/// Identity service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email not verified")]
    EmailNotVerified,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    InvalidToken,
    #[error("malformed token")]
    MalformedToken,
    #[error("session superseded")]
    SessionStale,
    #[error("token identity mismatch")]
    IdentityMismatch,
    #[error("invalid code")]
    InvalidCode,
    #[error("not found")]
    NotFound,
    #[error("email already in use")]
    EmailInUse,
    #[error("multi-factor auth already enabled")]
    MfaAlreadyEnabled,
    #[error("multi-factor auth not configured")]
    MfaNotConfigured,
    #[error("no pending deletion")]
    DeletionNotPending,
    #[error("grace period not expired")]
    GracePeriodNotExpired,
    #[error("too many requests")]
    TooManyRequests { retry_after_secs: u64 },
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for IdentityError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => Self::TokenExpired,
            TokenError::InvalidSignature => Self::InvalidToken,
            TokenError::Malformed | TokenError::WrongKind => Self::MalformedToken,
        }
    }
}

impl IdentityError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::SessionStale => "SESSION_STALE",
            Self::IdentityMismatch => "IDENTITY_MISMATCH",
            Self::InvalidCode => "INVALID_CODE",
            Self::NotFound => "NOT_FOUND",
            Self::EmailInUse => "EMAIL_IN_USE",
            Self::MfaAlreadyEnabled => "MFA_ALREADY_ENABLED",
            Self::MfaNotConfigured => "MFA_NOT_CONFIGURED",
            Self::DeletionNotPending => "DELETION_NOT_PENDING",
            Self::GracePeriodNotExpired => "GRACE_PERIOD_NOT_EXPIRED",
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            Self::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials
            | Self::EmailNotVerified
            | Self::TokenExpired
            | Self::InvalidToken
            | Self::MalformedToken
            | Self::SessionStale
            | Self::IdentityMismatch
            | Self::InvalidCode => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::EmailInUse
            | Self::MfaAlreadyEnabled
            | Self::MfaNotConfigured
            | Self::DeletionNotPending
            | Self::GracePeriodNotExpired => StatusCode::CONFLICT,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this failure counts toward a rate-limit pool.
    ///
    /// Rejections the limiter itself produced and internal faults do not;
    /// everything the caller could have gotten wrong does.
    pub fn counts_as_attempt(&self) -> bool {
        !matches!(self, Self::TooManyRequests { .. } | Self::Internal(_))
    }
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Log 500s only — tower-http TraceLayer already records method/uri/status for all
        // requests. 4xx are expected client errors; logging them here would be noise.
        // Internal errors need the anyhow chain logged so the root cause is traceable.
        if let Self::Internal(ref e) = self {
            tracing::error!(error = %e, kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        let mut response = (status, axum::Json(body)).into_response();
        if let Self::TooManyRequests { retry_after_secs } = self {
            if let Ok(value) = http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response
                    .headers_mut()
                    .insert(http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}
