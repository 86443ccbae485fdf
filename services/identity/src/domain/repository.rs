#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::types::{
    BackupCode, EmailChangeRequest, Identity, OneTimeToken, OneTimeTokenKind, TotpCredential,
};
use crate::error::IdentityError;

/// Repository for identity rows and session versions.
pub trait IdentityRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, IdentityError>;

    /// Display name from the identity's profile, if any.
    async fn display_name(&self, id: Uuid) -> Result<Option<String>, IdentityError>;

    /// Insert a new identity together with its email-verification token
    /// (same transaction).
    async fn create_with_verification(
        &self,
        identity: &Identity,
        token: &OneTimeToken,
    ) -> Result<(), IdentityError>;

    /// Increment the session version, invalidating all outstanding tokens.
    async fn bump_session_version(&self, id: Uuid) -> Result<(), IdentityError>;

    /// Set a new password hash and bump the session version atomically.
    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), IdentityError>;

    /// Mark the identity pending deletion, consuming the reauthorization row
    /// identified by `reauth_jti` in the same transaction. Returns `false`
    /// when the row was already consumed.
    async fn mark_pending_deletion(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        reauth_jti: &str,
    ) -> Result<bool, IdentityError>;

    /// Clear a pending deletion. Returns `false` when none was pending.
    async fn clear_pending_deletion(&self, id: Uuid) -> Result<bool, IdentityError>;

    /// Irreversibly delete the identity and all dependent rows.
    async fn delete(&self, id: Uuid) -> Result<(), IdentityError>;
}

/// Repository for one-time tokens.
///
/// The `consume_*` methods are transactional: they delete the token row and
/// apply the gated effect together, returning `false` when the token had
/// already been consumed by a racing call.
pub trait OneTimeTokenRepository: Send + Sync {
    async fn create(&self, token: &OneTimeToken) -> Result<(), IdentityError>;

    /// Insert a token, deleting any earlier token of the same kind for the
    /// identity in the same transaction. At most one stays valid at a time;
    /// repeated requests cannot pile up live tokens.
    async fn create_superseding(&self, token: &OneTimeToken) -> Result<(), IdentityError>;

    async fn find(
        &self,
        kind: OneTimeTokenKind,
        value: &str,
    ) -> Result<Option<OneTimeToken>, IdentityError>;

    /// Delete a token (expiry cleanup). Returns `false` if already gone.
    async fn delete(&self, id: Uuid) -> Result<bool, IdentityError>;

    /// Consume a verification token and mark the identity's email verified,
    /// provisioning its user profile.
    async fn consume_and_verify_email(
        &self,
        token_id: Uuid,
        identity_id: Uuid,
    ) -> Result<bool, IdentityError>;

    /// Consume a reset token, set the new password hash, and bump the
    /// session version.
    async fn consume_and_reset_password(
        &self,
        token_id: Uuid,
        identity_id: Uuid,
        new_password_hash: &str,
    ) -> Result<bool, IdentityError>;
}

/// Repository for pending email changes.
pub trait EmailChangeRepository: Send + Sync {
    /// Insert the confirmation token and the change request, consuming the
    /// reauthorization row in the same transaction. Returns `false` when the
    /// reauthorization was already spent.
    async fn create_with_reauth(
        &self,
        token: &OneTimeToken,
        request: &EmailChangeRequest,
        reauth_jti: &str,
    ) -> Result<bool, IdentityError>;

    async fn find_by_token(
        &self,
        value: &str,
    ) -> Result<Option<(OneTimeToken, EmailChangeRequest)>, IdentityError>;

    /// Drop a stale request together with its token (expiry cleanup).
    async fn delete_request(&self, request_id: Uuid) -> Result<(), IdentityError>;

    /// Consume the token, apply the new address, and bump the session
    /// version atomically. Returns `false` if the token was already spent.
    async fn consume_and_apply(
        &self,
        token_id: Uuid,
        request_id: Uuid,
        identity_id: Uuid,
        new_email: &str,
    ) -> Result<bool, IdentityError>;
}

/// Repository for TOTP credentials.
pub trait TotpRepository: Send + Sync {
    async fn find_by_identity(&self, id: Uuid) -> Result<Option<TotpCredential>, IdentityError>;

    /// Insert or replace the identity's unconfirmed credential. Confirmed
    /// credentials are never overwritten by setup.
    async fn create_unconfirmed(&self, credential: &TotpCredential) -> Result<(), IdentityError>;

    /// Confirm the credential and store the initial backup-code hashes in
    /// one transaction.
    async fn confirm_and_store_backup_codes(
        &self,
        identity_id: Uuid,
        at: DateTime<Utc>,
        code_hashes: &[String],
    ) -> Result<(), IdentityError>;

    /// Record `at` as the last accepted code time, conditionally: the write
    /// only lands when no code from the same time step was accepted before.
    /// Returns `false` when the step was already claimed, so of two racing
    /// verifications with the same code exactly one wins.
    async fn claim_time_step(
        &self,
        identity_id: Uuid,
        at: DateTime<Utc>,
        step_seconds: u64,
    ) -> Result<bool, IdentityError>;

    /// Remove the credential and all backup codes, consuming the
    /// reauthorization row. Returns `false` when it was already spent.
    async fn disable_with_reauth(
        &self,
        identity_id: Uuid,
        reauth_jti: &str,
    ) -> Result<bool, IdentityError>;
}

/// Repository for backup codes.
pub trait BackupCodeRepository: Send + Sync {
    async fn list_unused(&self, identity_id: Uuid) -> Result<Vec<BackupCode>, IdentityError>;

    /// Mark one code used. Returns `false` when a racing attempt already
    /// spent it.
    async fn mark_used(&self, id: Uuid) -> Result<bool, IdentityError>;

    async fn count_unused(&self, identity_id: Uuid) -> Result<u64, IdentityError>;

    /// Delete every existing code and insert the replacement set atomically.
    async fn replace_all(
        &self,
        identity_id: Uuid,
        code_hashes: &[String],
    ) -> Result<(), IdentityError>;
}

/// Kinds of transactional mail the service sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    Verification,
    PasswordReset,
    PasswordChanged,
    EmailChangeConfirmation,
    EmailChangeNotice,
    EmailChanged,
}

impl MailKind {
    pub fn template(self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::PasswordReset => "password_reset",
            Self::PasswordChanged => "password_changed",
            Self::EmailChangeConfirmation => "email_change_confirmation",
            Self::EmailChangeNotice => "email_change_notice",
            Self::EmailChanged => "email_changed",
        }
    }
}

/// Port to the mail relay.
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        kind: MailKind,
        context: serde_json::Value,
    ) -> Result<(), IdentityError>;
}

/// Password hashing port. Hashing is CPU-bound and synchronous; callers on
/// the async path wrap it in `spawn_blocking` if contention ever shows up.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, IdentityError>;

    fn verify(&self, password: &str, hash: &str) -> bool;
}
