use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use tower_http::trace::TraceLayer;

use gatehouse_core::health::{healthz, readyz};
use gatehouse_core::middleware::request_id_layer;

use crate::handlers::{
    accounts::{create_account, verify_account},
    deletion::{cancel_deletion, confirm_deletion, request_deletion},
    email::{confirm_email_change, request_email_change},
    mfa::{
        backup_codes_remaining, confirm_totp, disable_totp, regenerate_backup_codes, setup_totp,
        verify_mfa,
    },
    password::{change_password, confirm_password_reset, request_password_reset},
    token::{check_token, create_token, reauthorize, refresh_token, revoke_token},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Accounts
        .route("/accounts", post(create_account))
        .route("/accounts/verification", post(verify_account))
        .route("/accounts/email", post(request_email_change))
        .route("/accounts/email", patch(confirm_email_change))
        .route("/accounts/deletion", post(request_deletion))
        .route("/accounts/deletion", delete(cancel_deletion))
        .route("/accounts/deletion", patch(confirm_deletion))
        // Tokens
        .route("/auth/token", get(check_token))
        .route("/auth/token", post(create_token))
        .route("/auth/token", patch(refresh_token))
        .route("/auth/token", delete(revoke_token))
        .route("/auth/reauthorization", post(reauthorize))
        // Passwords
        .route("/auth/password-reset", post(request_password_reset))
        .route("/auth/password-reset", patch(confirm_password_reset))
        .route("/auth/password", patch(change_password))
        // MFA
        .route("/auth/mfa/totp", post(setup_totp))
        .route("/auth/mfa/totp", patch(confirm_totp))
        .route("/auth/mfa/totp", delete(disable_totp))
        .route("/auth/mfa/verification", post(verify_mfa))
        .route("/auth/mfa/backup-codes", get(backup_codes_remaining))
        .route("/auth/mfa/backup-codes", post(regenerate_backup_codes))
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
