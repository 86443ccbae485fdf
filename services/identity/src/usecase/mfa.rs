use chrono::Utc;
use rand::RngExt;

use gatehouse_auth_types::token::{MfaMethod, parse_subject, validate_mfa_session_token};

use crate::domain::repository::{
    BackupCodeRepository, IdentityRepository, PasswordHasher, TotpRepository,
};
use crate::domain::types::Identity;
use crate::error::IdentityError;
use crate::totp::{TotpProvisioner, TotpSetup};
use crate::usecase::token::{TokenPair, TokenSigner};

// ── Backup codes ─────────────────────────────────────────────────────────

/// Code alphabet. 0/O and 1/I are excluded so codes survive handwriting.
const BACKUP_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate_backup_codes(count: u8, length: u8) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            (0..length)
                .map(|_| {
                    let idx = rng.random_range(0..BACKUP_CODE_CHARSET.len());
                    BACKUP_CODE_CHARSET[idx] as char
                })
                .collect()
        })
        .collect()
}

/// Uppercase and strip the separators users paste along.
pub fn normalize_backup_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Grouped in fours for display, the way they are printed at generation.
pub fn format_backup_code(code: &str) -> String {
    code.as_bytes()
        .chunks(4)
        .map(|c| std::str::from_utf8(c).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("-")
}

/// Shape heuristic separating backup codes from TOTP codes: backup codes
/// have the configured length and at least one letter, TOTP codes are all
/// digits and shorter.
pub fn looks_like_backup_code(normalized: &str, backup_len: u8) -> bool {
    normalized.len() == backup_len as usize
        && normalized
            .bytes()
            .all(|b| BACKUP_CODE_CHARSET.contains(&b))
        && normalized.bytes().any(|b| b.is_ascii_alphabetic())
}

// ── SetupTotp ────────────────────────────────────────────────────────────

pub struct SetupTotpUseCase<T: TotpRepository> {
    pub totp: T,
    pub provisioner: TotpProvisioner,
}

impl<T: TotpRepository> SetupTotpUseCase<T> {
    /// Provision an unconfirmed credential.
    ///
    /// Re-running setup before confirmation hands back the pending secret
    /// unchanged, so a user who already scanned the QR code is not stranded;
    /// a confirmed credential is never overwritten.
    pub async fn execute(&self, identity: &Identity) -> Result<TotpSetup, IdentityError> {
        if let Some(existing) = self.totp.find_by_identity(identity.id).await? {
            if existing.is_confirmed() {
                return Err(IdentityError::MfaAlreadyEnabled);
            }
            return self.provisioner.setup(&existing, &identity.email);
        }
        let credential = self.provisioner.new_credential(identity.id);
        self.totp.create_unconfirmed(&credential).await?;
        self.provisioner.setup(&credential, &identity.email)
    }
}

// ── ConfirmTotp ──────────────────────────────────────────────────────────

pub struct ConfirmTotpOutput {
    /// Plaintext backup codes, shown exactly once.
    pub backup_codes: Vec<String>,
}

pub struct ConfirmTotpUseCase<T, H>
where
    T: TotpRepository,
    H: PasswordHasher,
{
    pub totp: T,
    pub hasher: H,
    pub provisioner: TotpProvisioner,
    pub backup_code_count: u8,
    pub backup_code_length: u8,
}

impl<T, H> ConfirmTotpUseCase<T, H>
where
    T: TotpRepository,
    H: PasswordHasher,
{
    /// Confirm enrolment with a first valid code; mints the backup codes.
    pub async fn execute(
        &self,
        identity: &Identity,
        code: &str,
    ) -> Result<ConfirmTotpOutput, IdentityError> {
        let credential = self
            .totp
            .find_by_identity(identity.id)
            .await?
            .ok_or(IdentityError::MfaNotConfigured)?;
        if credential.is_confirmed() {
            return Err(IdentityError::MfaAlreadyEnabled);
        }
        if !self.provisioner.verify(&credential, code)? {
            return Err(IdentityError::InvalidCode);
        }

        let codes = generate_backup_codes(self.backup_code_count, self.backup_code_length);
        let hashes = codes
            .iter()
            .map(|c| self.hasher.hash(c))
            .collect::<Result<Vec<_>, _>>()?;
        self.totp
            .confirm_and_store_backup_codes(identity.id, Utc::now(), &hashes)
            .await?;

        Ok(ConfirmTotpOutput {
            backup_codes: codes.iter().map(|c| format_backup_code(c)).collect(),
        })
    }
}

// ── VerifyMfa ────────────────────────────────────────────────────────────

pub struct VerifyMfaUseCase<I, T, B, H>
where
    I: IdentityRepository,
    T: TotpRepository,
    B: BackupCodeRepository,
    H: PasswordHasher,
{
    pub identities: I,
    pub totp: T,
    pub backup_codes: B,
    pub hasher: H,
    pub provisioner: TotpProvisioner,
    pub signer: TokenSigner,
    pub backup_code_length: u8,
}

impl<I, T, B, H> VerifyMfaUseCase<I, T, B, H>
where
    I: IdentityRepository,
    T: TotpRepository,
    B: BackupCodeRepository,
    H: PasswordHasher,
{
    /// Complete a login by presenting a second factor against an MFA
    /// session token.
    pub async fn execute(&self, mfa_token: &str, code: &str) -> Result<TokenPair, IdentityError> {
        let claims = validate_mfa_session_token(mfa_token, &self.signer.secret)?;
        let id = parse_subject(&claims.sub)?;
        let identity = self
            .identities
            .find_by_id(id)
            .await?
            .ok_or(IdentityError::InvalidToken)?;
        if claims.sv != identity.session_version {
            return Err(IdentityError::SessionStale);
        }

        let credential = self
            .totp
            .find_by_identity(identity.id)
            .await?
            .filter(|c| c.is_confirmed())
            .ok_or(IdentityError::MfaNotConfigured)?;

        // A code is only tried against methods the session token offered.
        let normalized = normalize_backup_code(code);
        if looks_like_backup_code(&normalized, self.backup_code_length) {
            if !claims.methods.contains(&MfaMethod::BackupCode) {
                return Err(IdentityError::InvalidCode);
            }
            self.spend_backup_code(identity.id, &normalized).await?;
        } else {
            if !claims.methods.contains(&MfaMethod::Totp) {
                return Err(IdentityError::InvalidCode);
            }
            let now = Utc::now();
            if !self.provisioner.verify(&credential, code)? {
                return Err(IdentityError::InvalidCode);
            }
            // A code is good for one login: claiming the time step is a
            // conditional write, so of two racing requests in the same step
            // exactly one wins and the other is treated as replay.
            if !self
                .totp
                .claim_time_step(identity.id, now, credential.step_seconds)
                .await?
            {
                return Err(IdentityError::InvalidCode);
            }
        }

        let name = match self.identities.display_name(identity.id).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(error = %e, "display name lookup failed");
                None
            }
        };
        self.signer.issue_pair(&identity, name)
    }

    async fn spend_backup_code(
        &self,
        identity_id: uuid::Uuid,
        normalized: &str,
    ) -> Result<(), IdentityError> {
        let candidates = self.backup_codes.list_unused(identity_id).await?;
        for candidate in candidates {
            if self.hasher.verify(normalized, &candidate.code_hash) {
                // mark_used returns false when a concurrent attempt won the
                // race for the same code; that attempt does not get in.
                if self.backup_codes.mark_used(candidate.id).await? {
                    return Ok(());
                }
                return Err(IdentityError::InvalidCode);
            }
        }
        Err(IdentityError::InvalidCode)
    }
}

// ── DisableTotp ──────────────────────────────────────────────────────────

pub struct DisableTotpUseCase<I, T>
where
    I: IdentityRepository,
    T: TotpRepository,
{
    pub identities: I,
    pub totp: T,
    pub secret: String,
}

impl<I, T> DisableTotpUseCase<I, T>
where
    I: IdentityRepository,
    T: TotpRepository,
{
    /// Remove the credential and every backup code, gated on a
    /// `disable_mfa` reauthorization.
    pub async fn execute(&self, reauthorization_token: &str) -> Result<(), IdentityError> {
        let (identity, claims) = crate::usecase::token::verify_reauthorization(
            &self.identities,
            reauthorization_token,
            gatehouse_auth_types::token::ReauthPurpose::DisableMfa,
            &self.secret,
        )
        .await?;

        self.totp
            .find_by_identity(identity.id)
            .await?
            .filter(|c| c.is_confirmed())
            .ok_or(IdentityError::MfaNotConfigured)?;

        let disabled = self
            .totp
            .disable_with_reauth(identity.id, &claims.jti)
            .await?;
        if !disabled {
            return Err(IdentityError::InvalidToken);
        }
        Ok(())
    }
}

// ── RegenerateBackupCodes ────────────────────────────────────────────────

pub struct RegenerateBackupCodesUseCase<T, B, H>
where
    T: TotpRepository,
    B: BackupCodeRepository,
    H: PasswordHasher,
{
    pub totp: T,
    pub backup_codes: B,
    pub hasher: H,
    pub backup_code_count: u8,
    pub backup_code_length: u8,
}

impl<T, B, H> RegenerateBackupCodesUseCase<T, B, H>
where
    T: TotpRepository,
    B: BackupCodeRepository,
    H: PasswordHasher,
{
    /// Replace every backup code with a fresh set, returned in plaintext
    /// exactly once. Old codes die even if unused.
    pub async fn execute(&self, identity: &Identity) -> Result<Vec<String>, IdentityError> {
        self.totp
            .find_by_identity(identity.id)
            .await?
            .filter(|c| c.is_confirmed())
            .ok_or(IdentityError::MfaNotConfigured)?;

        let codes = generate_backup_codes(self.backup_code_count, self.backup_code_length);
        let hashes = codes
            .iter()
            .map(|c| self.hasher.hash(c))
            .collect::<Result<Vec<_>, _>>()?;
        self.backup_codes.replace_all(identity.id, &hashes).await?;
        Ok(codes.iter().map(|c| format_backup_code(c)).collect())
    }
}

// ── BackupCodesRemaining ─────────────────────────────────────────────────

pub struct BackupCodesRemainingUseCase<B: BackupCodeRepository> {
    pub backup_codes: B,
}

impl<B: BackupCodeRepository> BackupCodesRemainingUseCase<B> {
    pub async fn execute(&self, identity: &Identity) -> Result<u64, IdentityError> {
        self.backup_codes.count_unused(identity.id).await
    }
}
