use chrono::Utc;

use gatehouse_auth_types::token::ReauthPurpose;

use crate::domain::repository::{EmailChangeRepository, IdentityRepository, MailKind, Mailer};
use crate::domain::types::{
    EmailChangeRequest, OneTimeToken, OneTimeTokenKind, validate_email,
};
use crate::error::IdentityError;
use crate::usecase::token::verify_reauthorization;

// ── RequestEmailChange ───────────────────────────────────────────────────

pub struct RequestEmailChangeInput {
    pub reauthorization_token: String,
    pub new_email: String,
}

pub struct RequestEmailChangeUseCase<I, E, M>
where
    I: IdentityRepository,
    E: EmailChangeRepository,
    M: Mailer,
{
    pub identities: I,
    pub email_changes: E,
    pub mailer: M,
    pub secret: String,
    pub change_ttl_secs: u64,
}

impl<I, E, M> RequestEmailChangeUseCase<I, E, M>
where
    I: IdentityRepository,
    E: EmailChangeRepository,
    M: Mailer,
{
    /// Start an email change, gated on a `change_email` reauthorization.
    ///
    /// The confirmation token goes to the NEW address; the old address
    /// gets a notice so a hijacked session cannot move the account
    /// silently.
    pub async fn execute(&self, input: RequestEmailChangeInput) -> Result<(), IdentityError> {
        validate_email(&input.new_email)?;
        let new_email = input.new_email.trim().to_lowercase();

        let (identity, claims) = verify_reauthorization(
            &self.identities,
            &input.reauthorization_token,
            ReauthPurpose::ChangeEmail,
            &self.secret,
        )
        .await?;

        if new_email == identity.email {
            return Err(IdentityError::Validation(
                "new email is the current email".to_owned(),
            ));
        }
        if self.identities.find_by_email(&new_email).await?.is_some() {
            return Err(IdentityError::EmailInUse);
        }

        let token = OneTimeToken::issue(
            identity.id,
            OneTimeTokenKind::EmailChange,
            self.change_ttl_secs,
        );
        let request = EmailChangeRequest::new(identity.id, new_email.clone(), token.id);
        let created = self
            .email_changes
            .create_with_reauth(&token, &request, &claims.jti)
            .await?;
        if !created {
            // Reauthorization already spent by a racing request.
            return Err(IdentityError::InvalidToken);
        }

        let confirm = self.mailer.send(
            &new_email,
            MailKind::EmailChangeConfirmation,
            serde_json::json!({ "token": token.value }),
        );
        let notice = self.mailer.send(
            &identity.email,
            MailKind::EmailChangeNotice,
            serde_json::json!({ "new_email": new_email }),
        );
        let (confirm, notice) = tokio::join!(confirm, notice);
        if let Err(e) = confirm {
            tracing::error!(error = %e, "email change confirmation mail failed");
        }
        if let Err(e) = notice {
            tracing::error!(error = %e, "email change notice mail failed");
        }
        Ok(())
    }
}

// ── ConfirmEmailChange ───────────────────────────────────────────────────

pub struct ConfirmEmailChangeUseCase<I, E, M>
where
    I: IdentityRepository,
    E: EmailChangeRepository,
    M: Mailer,
{
    pub identities: I,
    pub email_changes: E,
    pub mailer: M,
}

impl<I, E, M> ConfirmEmailChangeUseCase<I, E, M>
where
    I: IdentityRepository,
    E: EmailChangeRepository,
    M: Mailer,
{
    /// Consume the confirmation token and move the account to the new
    /// address. Bumps the session version; tokens carrying the old email
    /// claim die here.
    pub async fn execute(&self, token_value: &str) -> Result<(), IdentityError> {
        let (token, request) = self
            .email_changes
            .find_by_token(token_value)
            .await?
            .ok_or(IdentityError::NotFound)?;

        if token.is_expired_at(Utc::now()) {
            self.email_changes.delete_request(request.id).await?;
            return Err(IdentityError::TokenExpired);
        }

        // The address may have been taken between request and confirm.
        if self
            .identities
            .find_by_email(&request.new_email)
            .await?
            .is_some()
        {
            return Err(IdentityError::EmailInUse);
        }

        let old_email = self
            .identities
            .find_by_id(request.identity_id)
            .await?
            .map(|i| i.email);

        let applied = self
            .email_changes
            .consume_and_apply(token.id, request.id, request.identity_id, &request.new_email)
            .await?;
        if !applied {
            return Err(IdentityError::NotFound);
        }

        // Success notice to the address the account now lives at, and a
        // heads-up to the one it left.
        if let Err(e) = self
            .mailer
            .send(
                &request.new_email,
                MailKind::EmailChanged,
                serde_json::json!({}),
            )
            .await
        {
            tracing::error!(error = %e, "email changed notice failed");
        }
        if let Some(old_email) = old_email {
            if let Err(e) = self
                .mailer
                .send(
                    &old_email,
                    MailKind::EmailChanged,
                    serde_json::json!({ "new_email": request.new_email }),
                )
                .await
            {
                tracing::error!(error = %e, "email changed heads-up failed");
            }
        }
        Ok(())
    }
}
