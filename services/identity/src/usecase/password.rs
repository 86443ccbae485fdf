use chrono::Utc;

use crate::domain::repository::{
    IdentityRepository, MailKind, Mailer, OneTimeTokenRepository, PasswordHasher,
};
use crate::domain::types::{OneTimeToken, OneTimeTokenKind, validate_password};
use crate::error::IdentityError;

// ── RequestPasswordReset ─────────────────────────────────────────────────

pub struct RequestPasswordResetUseCase<I, T, M>
where
    I: IdentityRepository,
    T: OneTimeTokenRepository,
    M: Mailer,
{
    pub identities: I,
    pub tokens: T,
    pub mailer: M,
    pub reset_ttl_secs: u64,
}

impl<I, T, M> RequestPasswordResetUseCase<I, T, M>
where
    I: IdentityRepository,
    T: OneTimeTokenRepository,
    M: Mailer,
{
    /// Issue a reset token and mail it, answering identically for known
    /// and unknown addresses.
    pub async fn execute(&self, email: &str) -> Result<(), IdentityError> {
        let email = email.trim().to_lowercase();
        // Unknown addresses get the same silent 200 as known ones.
        let Some(identity) = self.identities.find_by_email(&email).await? else {
            return Ok(());
        };

        let token = OneTimeToken::issue(
            identity.id,
            OneTimeTokenKind::PasswordReset,
            self.reset_ttl_secs,
        );
        // A new request invalidates any reset token still outstanding.
        self.tokens.create_superseding(&token).await?;

        if let Err(e) = self
            .mailer
            .send(
                &identity.email,
                MailKind::PasswordReset,
                serde_json::json!({ "token": token.value }),
            )
            .await
        {
            tracing::error!(error = %e, "password reset mail failed");
        }
        Ok(())
    }
}

// ── ConfirmPasswordReset ─────────────────────────────────────────────────

pub struct ConfirmPasswordResetUseCase<I, T, H>
where
    I: IdentityRepository,
    T: OneTimeTokenRepository,
    H: PasswordHasher,
{
    pub identities: I,
    pub tokens: T,
    pub hasher: H,
}

impl<I, T, H> ConfirmPasswordResetUseCase<I, T, H>
where
    I: IdentityRepository,
    T: OneTimeTokenRepository,
    H: PasswordHasher,
{
    /// Consume a reset token and set the new password. Bumps the session
    /// version, so every outstanding session dies with the old password.
    pub async fn execute(&self, token_value: &str, new_password: &str) -> Result<(), IdentityError> {
        validate_password(new_password)?;

        let token = self
            .tokens
            .find(OneTimeTokenKind::PasswordReset, token_value)
            .await?
            .ok_or(IdentityError::NotFound)?;
        if token.is_expired_at(Utc::now()) {
            self.tokens.delete(token.id).await?;
            return Err(IdentityError::TokenExpired);
        }

        let hash = self.hasher.hash(new_password)?;
        let consumed = self
            .tokens
            .consume_and_reset_password(token.id, token.identity_id, &hash)
            .await?;
        if !consumed {
            return Err(IdentityError::NotFound);
        }
        Ok(())
    }
}

// ── ChangePassword (authenticated) ───────────────────────────────────────

pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

pub struct ChangePasswordUseCase<I, H, M>
where
    I: IdentityRepository,
    H: PasswordHasher,
    M: Mailer,
{
    pub identities: I,
    pub hasher: H,
    pub mailer: M,
}

impl<I, H, M> ChangePasswordUseCase<I, H, M>
where
    I: IdentityRepository,
    H: PasswordHasher,
    M: Mailer,
{
    /// Change the password of an authenticated identity. The current
    /// password is re-checked here; no reauthorization token is involved.
    pub async fn execute(
        &self,
        identity: &crate::domain::types::Identity,
        input: ChangePasswordInput,
    ) -> Result<(), IdentityError> {
        validate_password(&input.new_password)?;
        if !self
            .hasher
            .verify(&input.current_password, &identity.password_hash)
        {
            return Err(IdentityError::InvalidCredentials);
        }

        let hash = self.hasher.hash(&input.new_password)?;
        self.identities.set_password(identity.id, &hash).await?;

        if let Err(e) = self
            .mailer
            .send(
                &identity.email,
                MailKind::PasswordChanged,
                serde_json::json!({}),
            )
            .await
        {
            tracing::error!(error = %e, "password changed notice failed");
        }
        Ok(())
    }
}
