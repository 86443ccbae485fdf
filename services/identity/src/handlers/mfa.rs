use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::handlers::email::reauth_token;
use crate::handlers::token::session_response;
use crate::handlers::{authenticate, client_ip, identity_key, record_attempt};
use crate::state::AppState;
use crate::usecase::mfa::{
    BackupCodesRemainingUseCase, ConfirmTotpUseCase, DisableTotpUseCase,
    RegenerateBackupCodesUseCase, SetupTotpUseCase, VerifyMfaUseCase,
};

// ── POST /auth/mfa/totp (setup) ──────────────────────────────────────────

#[derive(Serialize)]
pub struct SetupTotpResponse {
    pub secret: String,
    pub otpauth_uri: String,
    pub manual_entry: String,
}

pub async fn setup_totp(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let identity = authenticate(&state, &headers, &jar).await?;
    let id_key = identity_key(identity.id);
    let limiter = &state.limits.credentials;
    limiter.check(&[&ip, &id_key]).await?;

    let usecase = SetupTotpUseCase {
        totp: state.totp_repo(),
        provisioner: state.provisioner.clone(),
    };
    let result = usecase.execute(&identity).await;
    let setup = record_attempt(limiter, &[&ip, &id_key], result).await?;

    Ok((
        StatusCode::CREATED,
        Json(SetupTotpResponse {
            secret: setup.secret,
            otpauth_uri: setup.otpauth_uri,
            manual_entry: setup.manual_entry,
        }),
    ))
}

// ── PATCH /auth/mfa/totp (confirm) ───────────────────────────────────────

#[derive(Deserialize)]
pub struct ConfirmTotpRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

pub async fn confirm_totp(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<ConfirmTotpRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let identity = authenticate(&state, &headers, &jar).await?;
    let id_key = identity_key(identity.id);
    let limiter = &state.limits.credentials;
    limiter.check(&[&ip, &id_key]).await?;

    let usecase = ConfirmTotpUseCase {
        totp: state.totp_repo(),
        hasher: state.hasher.clone(),
        provisioner: state.provisioner.clone(),
        backup_code_count: state.backup_code_count,
        backup_code_length: state.backup_code_length,
    };
    let result = usecase.execute(&identity, &body.code).await;
    let out = record_attempt(limiter, &[&ip, &id_key], result).await?;

    Ok(Json(BackupCodesResponse {
        backup_codes: out.backup_codes,
    }))
}

// ── DELETE /auth/mfa/totp (disable) ──────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct DisableTotpRequest {
    pub reauthorization_token: Option<String>,
}

pub async fn disable_totp(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Option<Json<DisableTotpRequest>>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let limiter = &state.limits.credentials;
    limiter.check(&[&ip]).await?;

    let token = reauth_token(&jar, body.and_then(|Json(b)| b.reauthorization_token))
        .ok_or(IdentityError::InvalidToken)?;
    let usecase = DisableTotpUseCase {
        identities: state.identity_repo(),
        totp: state.totp_repo(),
        secret: state.signer.secret.clone(),
    };
    let result = usecase.execute(&token).await;
    record_attempt(limiter, &[&ip], result).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ── POST /auth/mfa/verification ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyMfaRequest {
    pub mfa_token: String,
    pub code: String,
}

pub async fn verify_mfa(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<VerifyMfaRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let limiter = &state.limits.credentials;
    limiter.check(&[&ip]).await?;

    let usecase = VerifyMfaUseCase {
        identities: state.identity_repo(),
        totp: state.totp_repo(),
        backup_codes: state.backup_code_repo(),
        hasher: state.hasher.clone(),
        provisioner: state.provisioner.clone(),
        signer: state.signer.clone(),
        backup_code_length: state.backup_code_length,
    };
    let result = usecase.execute(&body.mfa_token, &body.code).await;
    let pair = record_attempt(limiter, &[&ip], result).await?;

    Ok(session_response(&state, jar, pair, StatusCode::CREATED))
}

// ── GET /auth/mfa/backup-codes ───────────────────────────────────────────

#[derive(Serialize)]
pub struct BackupCodesRemainingResponse {
    pub remaining: u64,
}

pub async fn backup_codes_remaining(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    state.limits.token_access.check(&[&ip]).await?;

    let identity = authenticate(&state, &headers, &jar).await?;
    let usecase = BackupCodesRemainingUseCase {
        backup_codes: state.backup_code_repo(),
    };
    let remaining = usecase.execute(&identity).await?;

    Ok(Json(BackupCodesRemainingResponse { remaining }))
}

// ── POST /auth/mfa/backup-codes (regenerate) ─────────────────────────────

pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let identity = authenticate(&state, &headers, &jar).await?;
    let id_key = identity_key(identity.id);
    let limiter = &state.limits.credentials;
    limiter.check(&[&ip, &id_key]).await?;

    let usecase = RegenerateBackupCodesUseCase {
        totp: state.totp_repo(),
        backup_codes: state.backup_code_repo(),
        hasher: state.hasher.clone(),
        backup_code_count: state.backup_code_count,
        backup_code_length: state.backup_code_length,
    };
    let result = usecase.execute(&identity).await;
    let codes = record_attempt(limiter, &[&ip, &id_key], result).await?;

    Ok((
        StatusCode::CREATED,
        Json(BackupCodesResponse {
            backup_codes: codes,
        }),
    ))
}
