use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::handlers::{client_ip, email_key, record_attempt};
use crate::state::AppState;
use crate::usecase::signup::{CreateAccountInput, CreateAccountUseCase, VerifyAccountUseCase};

// ── POST /accounts ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct CreateAccountResponse {
    pub id: uuid::Uuid,
    pub email: String,
}

pub async fn create_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let limiter = &state.limits.account_creation;
    limiter.check(&[&ip]).await?;

    let usecase = CreateAccountUseCase {
        identities: state.identity_repo(),
        hasher: state.hasher.clone(),
        mailer: state.mailer.clone(),
        verification_ttl_secs: state.verification_ttl_secs,
    };
    let result = usecase
        .execute(CreateAccountInput {
            email: body.email,
            password: body.password,
        })
        .await;
    let identity = record_attempt(limiter, &[&ip], result).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse {
            id: identity.id,
            email: identity.email,
        }),
    ))
}

// ── POST /accounts/verification ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyAccountRequest {
    pub email: String,
    pub token: String,
}

pub async fn verify_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VerifyAccountRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let email = email_key(&body.email);
    let limiter = &state.limits.account_creation;
    limiter.check(&[&ip, &email]).await?;

    let usecase = VerifyAccountUseCase {
        identities: state.identity_repo(),
        tokens: state.token_repo(),
    };
    let result = usecase.execute(&body.email, &body.token).await;
    record_attempt(limiter, &[&ip, &email], result).await?;

    Ok(StatusCode::NO_CONTENT)
}
