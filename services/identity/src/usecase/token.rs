use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use gatehouse_auth_types::token::{
    AccessClaims, MfaMethod, MfaSessionClaims, ReauthClaims, ReauthPurpose, RefreshClaims,
    TokenKind, parse_subject, validate_access_token, validate_refresh_token,
    validate_reauth_token,
};

use crate::domain::repository::IdentityRepository;
use crate::domain::types::Identity;
use crate::error::IdentityError;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_secs()
}

/// Access + refresh tokens issued together.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub access_token_exp: u64,
    pub refresh_token: String,
}

/// Signs all four token kinds with the service secret and configured TTLs.
#[derive(Clone)]
pub struct TokenSigner {
    pub secret: String,
    pub issuer: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub reauth_ttl_secs: u64,
    pub mfa_session_ttl_secs: u64,
}

impl TokenSigner {
    fn sign<C: serde::Serialize>(&self, claims: &C) -> Result<String, IdentityError> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| IdentityError::Internal(e.into()))
    }

    pub fn issue_access(
        &self,
        identity: &Identity,
        name: Option<String>,
    ) -> Result<(String, u64), IdentityError> {
        let iat = now_secs();
        let exp = iat + self.access_ttl_secs;
        let claims = AccessClaims {
            kind: TokenKind::Access,
            iss: self.issuer.clone(),
            sub: identity.id.to_string(),
            email: identity.email.clone(),
            name,
            sv: identity.session_version,
            iat,
            exp,
        };
        Ok((self.sign(&claims)?, exp))
    }

    pub fn issue_refresh(&self, identity: &Identity) -> Result<String, IdentityError> {
        let iat = now_secs();
        let claims = RefreshClaims {
            kind: TokenKind::Refresh,
            iss: self.issuer.clone(),
            sub: identity.id.to_string(),
            sv: identity.session_version,
            jti: Uuid::new_v4().to_string(),
            iat,
            exp: iat + self.refresh_ttl_secs,
        };
        self.sign(&claims)
    }

    pub fn issue_pair(
        &self,
        identity: &Identity,
        name: Option<String>,
    ) -> Result<TokenPair, IdentityError> {
        let (access_token, access_token_exp) = self.issue_access(identity, name)?;
        let refresh_token = self.issue_refresh(identity)?;
        Ok(TokenPair {
            access_token,
            access_token_exp,
            refresh_token,
        })
    }

    /// Reauthorization token. Returns (token, jti); the caller persists the
    /// jti as a one-time row so the token can be consumed exactly once.
    pub fn issue_reauthorization(
        &self,
        identity: &Identity,
        scope: Vec<ReauthPurpose>,
    ) -> Result<(String, String), IdentityError> {
        let iat = now_secs();
        let jti = Uuid::new_v4().to_string();
        let claims = ReauthClaims {
            kind: TokenKind::Reauthorization,
            iss: self.issuer.clone(),
            sub: identity.id.to_string(),
            sv: identity.session_version,
            jti: jti.clone(),
            scope,
            iat,
            exp: iat + self.reauth_ttl_secs,
        };
        Ok((self.sign(&claims)?, jti))
    }

    pub fn issue_mfa_session(
        &self,
        identity: &Identity,
        methods: Vec<MfaMethod>,
        attempts_remaining: u8,
    ) -> Result<String, IdentityError> {
        let iat = now_secs();
        let claims = MfaSessionClaims {
            kind: TokenKind::MfaSession,
            iss: self.issuer.clone(),
            sub: identity.id.to_string(),
            sv: identity.session_version,
            attempts_remaining,
            methods,
            iat,
            exp: iat + self.mfa_session_ttl_secs,
        };
        self.sign(&claims)
    }
}

/// Validate a reauthorization token for one purpose and load its identity.
///
/// Checks signature/expiry/kind, the scope, and that the identity's session
/// version still matches. The one-time jti row is consumed later, inside
/// the gated transition's transaction.
pub async fn verify_reauthorization<I: IdentityRepository>(
    identities: &I,
    token: &str,
    purpose: ReauthPurpose,
    secret: &str,
) -> Result<(Identity, ReauthClaims), IdentityError> {
    let claims = validate_reauth_token(token, secret)?;
    if !claims.permits(purpose) {
        return Err(IdentityError::InvalidToken);
    }
    let id = parse_subject(&claims.sub)?;
    let identity = identities
        .find_by_id(id)
        .await?
        .ok_or(IdentityError::InvalidToken)?;
    if claims.sv != identity.session_version {
        return Err(IdentityError::SessionStale);
    }
    Ok((identity, claims))
}

// ── CheckAccess ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CheckAccessOutput {
    pub identity_id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

/// Validates an access token, including the live session-version check.
pub struct CheckAccessUseCase<I: IdentityRepository> {
    pub identities: I,
    pub secret: String,
}

impl<I: IdentityRepository> CheckAccessUseCase<I> {
    pub async fn execute(&self, token: &str) -> Result<CheckAccessOutput, IdentityError> {
        let claims = validate_access_token(token, &self.secret)?;
        let id = parse_subject(&claims.sub)?;
        let identity = self
            .identities
            .find_by_id(id)
            .await?
            .ok_or(IdentityError::InvalidToken)?;
        if claims.sv != identity.session_version {
            return Err(IdentityError::SessionStale);
        }
        Ok(CheckAccessOutput {
            identity_id: identity.id,
            email: identity.email,
            name: claims.name,
        })
    }
}

// ── RefreshToken ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RefreshTokenOutput {
    pub identity_id: Uuid,
    pub pair: TokenPair,
}

pub struct RefreshTokenUseCase<I: IdentityRepository> {
    pub identities: I,
    pub signer: TokenSigner,
}

impl<I: IdentityRepository> RefreshTokenUseCase<I> {
    /// Exchange a refresh token for a fresh pair.
    ///
    /// `expected` pins the refresh token to the identity from an
    /// accompanying access token, when one was presented.
    pub async fn execute(
        &self,
        refresh_token: &str,
        expected: Option<Uuid>,
    ) -> Result<RefreshTokenOutput, IdentityError> {
        let claims = validate_refresh_token(refresh_token, &self.signer.secret)?;
        let id = parse_subject(&claims.sub)?;
        if expected.is_some_and(|expected| expected != id) {
            return Err(IdentityError::IdentityMismatch);
        }
        let identity = self
            .identities
            .find_by_id(id)
            .await?
            .ok_or(IdentityError::InvalidToken)?;
        if claims.sv != identity.session_version {
            return Err(IdentityError::SessionStale);
        }
        let name = match self.identities.display_name(id).await {
            Ok(name) => name,
            Err(e) => {
                // Display name is a convenience claim; refresh still works.
                tracing::warn!(error = %e, "display name lookup failed");
                None
            }
        };
        let pair = self.signer.issue_pair(&identity, name)?;
        Ok(RefreshTokenOutput {
            identity_id: id,
            pair,
        })
    }
}

// ── Reauthorize ──────────────────────────────────────────────────────────

use crate::domain::repository::{OneTimeTokenRepository, PasswordHasher};
use crate::domain::types::{OneTimeToken, OneTimeTokenKind};

pub struct ReauthorizeUseCase<I, T, H>
where
    I: IdentityRepository,
    T: OneTimeTokenRepository,
    H: PasswordHasher,
{
    pub identities: I,
    pub tokens: T,
    pub hasher: H,
    pub signer: TokenSigner,
}

impl<I, T, H> ReauthorizeUseCase<I, T, H>
where
    I: IdentityRepository,
    T: OneTimeTokenRepository,
    H: PasswordHasher,
{
    /// Prove the current password and mint a single-use reauthorization
    /// token scoped to the requested purposes.
    pub async fn execute(
        &self,
        identity: &Identity,
        password: &str,
        scope: Vec<ReauthPurpose>,
    ) -> Result<String, IdentityError> {
        if scope.is_empty() {
            return Err(IdentityError::Validation(
                "reauthorization scope must not be empty".to_owned(),
            ));
        }
        if !self.hasher.verify(password, &identity.password_hash) {
            return Err(IdentityError::InvalidCredentials);
        }
        let (token, jti) = self.signer.issue_reauthorization(identity, scope)?;
        self.tokens
            .create(&OneTimeToken::with_value(
                identity.id,
                OneTimeTokenKind::Reauthorization,
                jti,
                self.signer.reauth_ttl_secs,
            ))
            .await?;
        Ok(token)
    }
}

// ── Logout ───────────────────────────────────────────────────────────────

/// Bumps the session version, invalidating every outstanding token of the
/// identity at once.
pub struct LogoutUseCase<I: IdentityRepository> {
    pub identities: I,
}

impl<I: IdentityRepository> LogoutUseCase<I> {
    pub async fn execute(&self, identity_id: Uuid) -> Result<(), IdentityError> {
        self.identities.bump_session_version(identity_id).await
    }
}
