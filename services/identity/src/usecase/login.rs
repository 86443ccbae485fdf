use gatehouse_auth_types::token::MfaMethod;

use crate::domain::repository::{
    BackupCodeRepository, IdentityRepository, PasswordHasher, TotpRepository,
};
use crate::error::IdentityError;
use crate::usecase::token::{TokenPair, TokenSigner};

/// How many wrong second-factor codes one MFA session tolerates.
pub const MFA_SESSION_ATTEMPTS: u8 = 5;

/// Result of a password check: either a full session or an MFA challenge.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(TokenPair),
    MfaRequired {
        mfa_token: String,
        methods: Vec<MfaMethod>,
    },
}

pub struct LoginInput {
    pub email: String,
    pub password: String,
}

pub struct LoginUseCase<I, T, B, H>
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
    pub signer: TokenSigner,
}

impl<I, T, B, H> LoginUseCase<I, T, B, H>
where
    I: IdentityRepository,
    T: TotpRepository,
    B: BackupCodeRepository,
    H: PasswordHasher,
{
    /// Password login. Unknown addresses and wrong passwords are the same
    /// `InvalidCredentials` so the endpoint cannot be used to enumerate
    /// accounts.
    pub async fn execute(&self, input: LoginInput) -> Result<LoginOutcome, IdentityError> {
        let email = input.email.trim().to_lowercase();
        let identity = match self.identities.find_by_email(&email).await? {
            Some(identity) => identity,
            None => {
                // Burn a hash anyway so the timing of the reject does not
                // separate unknown addresses from wrong passwords.
                let _ = self.hasher.verify(&input.password, DUMMY_HASH);
                return Err(IdentityError::InvalidCredentials);
            }
        };

        if !self.hasher.verify(&input.password, &identity.password_hash) {
            return Err(IdentityError::InvalidCredentials);
        }
        if !identity.email_verified {
            return Err(IdentityError::EmailNotVerified);
        }

        let totp = self.totp.find_by_identity(identity.id).await?;
        if totp.is_some_and(|c| c.is_confirmed()) {
            let mut methods = vec![MfaMethod::Totp];
            if self.backup_codes.count_unused(identity.id).await? > 0 {
                methods.push(MfaMethod::BackupCode);
            }
            let mfa_token =
                self.signer
                    .issue_mfa_session(&identity, methods.clone(), MFA_SESSION_ATTEMPTS)?;
            return Ok(LoginOutcome::MfaRequired { mfa_token, methods });
        }

        let name = match self.identities.display_name(identity.id).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(error = %e, "display name lookup failed");
                None
            }
        };
        Ok(LoginOutcome::Authenticated(
            self.signer.issue_pair(&identity, name)?,
        ))
    }
}

/// Argon2id hash of a throwaway string, verified against when the address
/// is unknown to keep reject timing uniform.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$\
c29tZXNhbHRzb21lc2FsdA$RdescudvJCsgt3ub+b+dWRWJTmaaJObG";
