use chrono::Utc;

use crate::domain::repository::{
    IdentityRepository, MailKind, Mailer, OneTimeTokenRepository, PasswordHasher,
};
use crate::domain::types::{
    Identity, OneTimeToken, OneTimeTokenKind, validate_email, validate_password,
};
use crate::error::IdentityError;

// ── CreateAccount ────────────────────────────────────────────────────────

pub struct CreateAccountInput {
    pub email: String,
    pub password: String,
}

pub struct CreateAccountUseCase<I, H, M>
where
    I: IdentityRepository,
    H: PasswordHasher,
    M: Mailer,
{
    pub identities: I,
    pub hasher: H,
    pub mailer: M,
    pub verification_ttl_secs: u64,
}

impl<I, H, M> CreateAccountUseCase<I, H, M>
where
    I: IdentityRepository,
    H: PasswordHasher,
    M: Mailer,
{
    /// Create an unverified account and send the verification mail.
    ///
    /// The identity and its verification token are inserted in one
    /// transaction; the mail send is best-effort and never rolls the
    /// signup back.
    pub async fn execute(&self, input: CreateAccountInput) -> Result<Identity, IdentityError> {
        validate_email(&input.email)?;
        validate_password(&input.password)?;
        let email = input.email.trim().to_lowercase();

        if self.identities.find_by_email(&email).await?.is_some() {
            return Err(IdentityError::EmailInUse);
        }

        let hash = self.hasher.hash(&input.password)?;
        let identity = Identity::new(email, hash);
        let token = OneTimeToken::issue(
            identity.id,
            OneTimeTokenKind::EmailVerification,
            self.verification_ttl_secs,
        );
        self.identities
            .create_with_verification(&identity, &token)
            .await?;

        if let Err(e) = self
            .mailer
            .send(
                &identity.email,
                MailKind::Verification,
                serde_json::json!({ "token": token.value }),
            )
            .await
        {
            tracing::error!(error = %e, "verification mail failed");
        }

        Ok(identity)
    }
}

// ── VerifyAccount ────────────────────────────────────────────────────────

pub struct VerifyAccountUseCase<I, T>
where
    I: IdentityRepository,
    T: OneTimeTokenRepository,
{
    pub identities: I,
    pub tokens: T,
}

impl<I, T> VerifyAccountUseCase<I, T>
where
    I: IdentityRepository,
    T: OneTimeTokenRepository,
{
    /// Consume a verification token and mark the address verified.
    ///
    /// An expired token is deleted on sight, so the first caller sees
    /// `TokenExpired` and any later one plain `NotFound`.
    pub async fn execute(&self, email: &str, token_value: &str) -> Result<(), IdentityError> {
        let token = self
            .tokens
            .find(OneTimeTokenKind::EmailVerification, token_value)
            .await?
            .ok_or(IdentityError::NotFound)?;

        if token.is_expired_at(Utc::now()) {
            self.tokens.delete(token.id).await?;
            return Err(IdentityError::TokenExpired);
        }

        let identity = self
            .identities
            .find_by_id(token.identity_id)
            .await?
            .ok_or(IdentityError::NotFound)?;
        // The token value alone must not confirm someone else's address.
        if !identity.email.eq_ignore_ascii_case(email.trim()) {
            return Err(IdentityError::NotFound);
        }

        let consumed = self
            .tokens
            .consume_and_verify_email(token.id, identity.id)
            .await?;
        if !consumed {
            return Err(IdentityError::NotFound);
        }
        Ok(())
    }
}
