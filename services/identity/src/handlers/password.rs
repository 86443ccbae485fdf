use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::error::IdentityError;
use crate::handlers::{authenticate, client_ip, email_key, identity_key, record_attempt};
use crate::state::AppState;
use crate::usecase::password::{
    ChangePasswordInput, ChangePasswordUseCase, ConfirmPasswordResetUseCase,
    RequestPasswordResetUseCase,
};

// ── POST /auth/password-reset ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RequestResetRequest {
    pub email: String,
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RequestResetRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let email = email_key(&body.email);
    let limiter = &state.limits.password;
    limiter.check(&[&ip, &email]).await?;

    let usecase = RequestPasswordResetUseCase {
        identities: state.identity_repo(),
        tokens: state.token_repo(),
        mailer: state.mailer.clone(),
        reset_ttl_secs: state.password_reset_ttl_secs,
    };
    usecase.execute(&body.email).await?;
    // Every request costs quota: the endpoint answers 202 either way, so
    // only the counters stand between a scraper and the mail relay.
    limiter.record_failure(&[&ip, &email]).await?;

    Ok(StatusCode::ACCEPTED)
}

// ── PATCH /auth/password-reset ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConfirmResetRequest {
    pub token: String,
    pub new_password: String,
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ConfirmResetRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let limiter = &state.limits.password;
    limiter.check(&[&ip]).await?;

    let usecase = ConfirmPasswordResetUseCase {
        identities: state.identity_repo(),
        tokens: state.token_repo(),
        hasher: state.hasher.clone(),
    };
    let result = usecase.execute(&body.token, &body.new_password).await;
    record_attempt(limiter, &[&ip], result).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ── PATCH /auth/password (authenticated change) ──────────────────────────

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let identity = authenticate(&state, &headers, &jar).await?;
    let id_key = identity_key(identity.id);
    let limiter = &state.limits.password;
    limiter.check(&[&ip, &id_key]).await?;

    let usecase = ChangePasswordUseCase {
        identities: state.identity_repo(),
        hasher: state.hasher.clone(),
        mailer: state.mailer.clone(),
    };
    let result = usecase
        .execute(
            &identity,
            ChangePasswordInput {
                current_password: body.current_password,
                new_password: body.new_password,
            },
        )
        .await;
    record_attempt(limiter, &[&ip, &id_key], result).await?;

    Ok(StatusCode::NO_CONTENT)
}
