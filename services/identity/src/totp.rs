//! TOTP provisioning and verification on top of `totp-rs`.

use chrono::Utc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::domain::types::TotpCredential;
use crate::error::IdentityError;

/// Everything the caller needs to finish enrolment: the raw secret for
/// manual entry, the otpauth URI for QR rendering, and the secret grouped
/// in blocks of four for reading aloud.
#[derive(Debug, Clone)]
pub struct TotpSetup {
    pub secret: String,
    pub otpauth_uri: String,
    pub manual_entry: String,
}

/// Builds and checks TOTP codes with the service's provisioning defaults.
///
/// New credentials get the provisioner's digits/step; verification always
/// uses the parameters stored on the credential itself, so changing the
/// defaults never breaks already-enrolled authenticators.
#[derive(Debug, Clone)]
pub struct TotpProvisioner {
    pub issuer: String,
    pub digits: usize,
    pub step_seconds: u64,
    pub skew: u8,
}

impl TotpProvisioner {
    /// Fresh unconfirmed credential with a newly generated secret.
    pub fn new_credential(&self, identity_id: Uuid) -> TotpCredential {
        let secret = Secret::generate_secret().to_encoded().to_string();
        TotpCredential {
            identity_id,
            secret,
            algorithm: "SHA1".to_owned(),
            digits: self.digits as u32,
            step_seconds: self.step_seconds,
            confirmed_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    /// Setup payload for a credential, addressed to the account's email.
    pub fn setup(
        &self,
        credential: &TotpCredential,
        account_email: &str,
    ) -> Result<TotpSetup, IdentityError> {
        let totp = self.build(credential, account_email)?;
        Ok(TotpSetup {
            secret: credential.secret.clone(),
            otpauth_uri: totp.get_url(),
            manual_entry: group_by_four(&credential.secret),
        })
    }

    /// Check a code against the current clock.
    pub fn verify(&self, credential: &TotpCredential, code: &str) -> Result<bool, IdentityError> {
        let totp = self.build(credential, "")?;
        let code = normalize_code(code);
        match totp.check_current(&code) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                // System clock before the epoch. Treat as a plain mismatch
                // rather than leaking the cause to the caller.
                tracing::warn!(error = %e, "totp clock error");
                Ok(false)
            }
        }
    }

    /// Check a code at an explicit Unix timestamp.
    pub fn verify_at(
        &self,
        credential: &TotpCredential,
        code: &str,
        timestamp: u64,
    ) -> Result<bool, IdentityError> {
        let totp = self.build(credential, "")?;
        Ok(totp.check(&normalize_code(code), timestamp))
    }

    /// Current code for a credential. Test-only.
    #[cfg(test)]
    pub fn current_code(&self, credential: &TotpCredential) -> Result<String, IdentityError> {
        let totp = self.build(credential, "")?;
        totp.generate_current()
            .map_err(|e| anyhow::anyhow!("totp clock error: {e}").into())
    }

    fn build(
        &self,
        credential: &TotpCredential,
        account_email: &str,
    ) -> Result<TOTP, IdentityError> {
        let secret = Secret::Encoded(credential.secret.clone())
            .to_bytes()
            .map_err(|e| anyhow::anyhow!("stored totp secret is not valid base32: {e:?}"))?;
        TOTP::new(
            Algorithm::SHA1,
            credential.digits as usize,
            self.skew,
            credential.step_seconds,
            secret,
            Some(self.issuer.clone()),
            account_email.to_owned(),
        )
        .map_err(|e| anyhow::anyhow!("totp parameters rejected: {e}").into())
    }
}

fn normalize_code(code: &str) -> String {
    code.replace([' ', '-'], "")
}

fn group_by_four(secret: &str) -> String {
    secret
        .as_bytes()
        .chunks(4)
        .map(|c| std::str::from_utf8(c).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ")
}
