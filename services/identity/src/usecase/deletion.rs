use chrono::{Duration, Utc};

use gatehouse_auth_types::token::ReauthPurpose;

use crate::domain::repository::IdentityRepository;
use crate::domain::types::Identity;
use crate::error::IdentityError;
use crate::usecase::token::verify_reauthorization;

// ── RequestDeletion ──────────────────────────────────────────────────────

pub struct RequestDeletionUseCase<I: IdentityRepository> {
    pub identities: I,
    pub secret: String,
}

impl<I: IdentityRepository> RequestDeletionUseCase<I> {
    /// Mark the account pending deletion, gated on a `delete_account`
    /// reauthorization. Nothing is removed yet; the account keeps working
    /// through the grace period.
    pub async fn execute(&self, reauthorization_token: &str) -> Result<Identity, IdentityError> {
        let (identity, claims) = verify_reauthorization(
            &self.identities,
            reauthorization_token,
            ReauthPurpose::DeleteAccount,
            &self.secret,
        )
        .await?;

        let at = Utc::now();
        let marked = self
            .identities
            .mark_pending_deletion(identity.id, at, &claims.jti)
            .await?;
        if !marked {
            return Err(IdentityError::InvalidToken);
        }
        Ok(Identity {
            pending_deletion_at: Some(at),
            ..identity
        })
    }
}

// ── CancelDeletion ───────────────────────────────────────────────────────

pub struct CancelDeletionUseCase<I: IdentityRepository> {
    pub identities: I,
}

impl<I: IdentityRepository> CancelDeletionUseCase<I> {
    pub async fn execute(&self, identity: &Identity) -> Result<(), IdentityError> {
        let cleared = self.identities.clear_pending_deletion(identity.id).await?;
        if !cleared {
            return Err(IdentityError::DeletionNotPending);
        }
        Ok(())
    }
}

// ── ConfirmDeletion ──────────────────────────────────────────────────────

pub struct ConfirmDeletionUseCase<I: IdentityRepository> {
    pub identities: I,
    pub grace_days: u16,
}

impl<I: IdentityRepository> ConfirmDeletionUseCase<I> {
    /// Irreversibly delete the account once the grace period has passed.
    pub async fn execute(&self, identity: &Identity) -> Result<(), IdentityError> {
        let pending_at = identity
            .pending_deletion_at
            .ok_or(IdentityError::DeletionNotPending)?;
        let earliest = pending_at + Duration::days(self.grace_days as i64);
        if Utc::now() < earliest {
            return Err(IdentityError::GracePeriodNotExpired);
        }
        self.identities.delete(identity.id).await
    }
}
