use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use gatehouse_auth_types::cookie::REAUTH_TOKEN_COOKIE;

use crate::error::IdentityError;
use crate::handlers::{client_ip, record_attempt};
use crate::state::AppState;
use crate::usecase::email_change::{
    ConfirmEmailChangeUseCase, RequestEmailChangeInput, RequestEmailChangeUseCase,
};

/// Reauthorization token from the body when present, the cookie otherwise.
pub(super) fn reauth_token(jar: &CookieJar, body_token: Option<String>) -> Option<String> {
    body_token.or_else(|| jar.get(REAUTH_TOKEN_COOKIE).map(|c| c.value().to_owned()))
}

// ── POST /accounts/email ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RequestEmailChangeRequest {
    pub new_email: String,
    pub reauthorization_token: Option<String>,
}

pub async fn request_email_change(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<RequestEmailChangeRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let limiter = &state.limits.email_change;
    limiter.check(&[&ip]).await?;

    let token =
        reauth_token(&jar, body.reauthorization_token).ok_or(IdentityError::InvalidToken)?;
    let usecase = RequestEmailChangeUseCase {
        identities: state.identity_repo(),
        email_changes: state.email_change_repo(),
        mailer: state.mailer.clone(),
        secret: state.signer.secret.clone(),
        change_ttl_secs: state.email_change_ttl_secs,
    };
    let result = usecase
        .execute(RequestEmailChangeInput {
            reauthorization_token: token,
            new_email: body.new_email,
        })
        .await;
    record_attempt(limiter, &[&ip], result).await?;

    Ok(StatusCode::ACCEPTED)
}

// ── PATCH /accounts/email ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConfirmEmailChangeRequest {
    pub token: String,
}

pub async fn confirm_email_change(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ConfirmEmailChangeRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let limiter = &state.limits.email_change;
    limiter.check(&[&ip]).await?;

    let usecase = ConfirmEmailChangeUseCase {
        identities: state.identity_repo(),
        email_changes: state.email_change_repo(),
        mailer: state.mailer.clone(),
    };
    let result = usecase.execute(&body.token).await;
    record_attempt(limiter, &[&ip], result).await?;

    Ok(StatusCode::NO_CONTENT)
}
