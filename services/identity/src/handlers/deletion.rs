use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_auth_types::cookie::clear_session_cookies;

use crate::error::IdentityError;
use crate::handlers::email::reauth_token;
use crate::handlers::{authenticate, client_ip, identity_key, record_attempt};
use crate::state::AppState;
use crate::usecase::deletion::{
    CancelDeletionUseCase, ConfirmDeletionUseCase, RequestDeletionUseCase,
};

// ── POST /accounts/deletion ──────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct RequestDeletionRequest {
    pub reauthorization_token: Option<String>,
}

#[derive(Serialize)]
pub struct RequestDeletionResponse {
    pub pending_deletion_at: DateTime<Utc>,
    pub earliest_confirm_at: DateTime<Utc>,
}

pub async fn request_deletion(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Option<Json<RequestDeletionRequest>>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let limiter = &state.limits.deletion;
    limiter.check(&[&ip]).await?;

    let token = reauth_token(&jar, body.and_then(|Json(b)| b.reauthorization_token))
        .ok_or(IdentityError::InvalidToken)?;
    let usecase = RequestDeletionUseCase {
        identities: state.identity_repo(),
        secret: state.signer.secret.clone(),
    };
    let result = usecase.execute(&token).await;
    let identity = record_attempt(limiter, &[&ip], result).await?;

    let pending_at = identity.pending_deletion_at.unwrap_or_else(Utc::now);
    Ok((
        StatusCode::ACCEPTED,
        Json(RequestDeletionResponse {
            pending_deletion_at: pending_at,
            earliest_confirm_at: pending_at + Duration::days(state.deletion_grace_days as i64),
        }),
    ))
}

// ── DELETE /accounts/deletion (cancel) ───────────────────────────────────

pub async fn cancel_deletion(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let identity = authenticate(&state, &headers, &jar).await?;
    let id_key = identity_key(identity.id);
    let limiter = &state.limits.deletion;
    limiter.check(&[&ip, &id_key]).await?;

    let usecase = CancelDeletionUseCase {
        identities: state.identity_repo(),
    };
    let result = usecase.execute(&identity).await;
    record_attempt(limiter, &[&ip, &id_key], result).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ── PATCH /accounts/deletion (confirm) ───────────────────────────────────

pub async fn confirm_deletion(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let identity = authenticate(&state, &headers, &jar).await?;
    let id_key = identity_key(identity.id);
    let limiter = &state.limits.deletion;
    limiter.check(&[&ip, &id_key]).await?;

    let usecase = ConfirmDeletionUseCase {
        identities: state.identity_repo(),
        grace_days: state.deletion_grace_days,
    };
    let result = usecase.execute(&identity).await;
    record_attempt(limiter, &[&ip, &id_key], result).await?;

    let jar = clear_session_cookies(jar, state.cookie_domain.clone());
    Ok((StatusCode::NO_CONTENT, jar))
}
