//! JWT claim types and validation for the four Gatehouse token kinds.
//!
//! Every token embeds the issuing identity (`sub`), the identity's session
//! version (`sv`) at issuance, `iat`/`exp`, and a `kind` discriminator so a
//! token of one kind can never pass validation as another.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
#[cfg(any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test))]
use serde::Serialize;
use uuid::Uuid;

/// Discriminator claim carried by every Gatehouse token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test), derive(Serialize))]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    Reauthorization,
    MfaSession,
}

/// Sensitive operations a reauthorization token may gate.
///
/// A reauthorization obtained for one purpose is rejected for any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test), derive(Serialize))]
#[serde(rename_all = "snake_case")]
pub enum ReauthPurpose {
    ChangeEmail,
    ChangePassword,
    DeleteAccount,
    DisableMfa,
}

/// Second factors an MFA-session token allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test), derive(Serialize))]
#[serde(rename_all = "snake_case")]
pub enum MfaMethod {
    Totp,
    BackupCode,
}

/// Errors returned by token validation.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("wrong token kind")]
    WrongKind,
}

/// Claims of a short-lived access token.
///
/// `email` and `name` are convenience claims for display; `name` is
/// non-authoritative and may be absent.
#[derive(Debug, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test), derive(Serialize))]
pub struct AccessClaims {
    pub kind: TokenKind,
    pub iss: String,
    /// Identity ID (UUID string).
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Session version at issuance.
    pub sv: i64,
    pub iat: u64,
    pub exp: u64,
}

/// Claims of a refresh token. `jti` is unique per token.
#[derive(Debug, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test), derive(Serialize))]
pub struct RefreshClaims {
    pub kind: TokenKind,
    pub iss: String,
    pub sub: String,
    pub sv: i64,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

/// Claims of a reauthorization token proving a fresh password check.
///
/// The `jti` is also persisted as a one-time row by the identity service so
/// a reauthorization can be consumed exactly once.
#[derive(Debug, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test), derive(Serialize))]
pub struct ReauthClaims {
    pub kind: TokenKind,
    pub iss: String,
    pub sub: String,
    pub sv: i64,
    pub jti: String,
    pub scope: Vec<ReauthPurpose>,
    pub iat: u64,
    pub exp: u64,
}

impl ReauthClaims {
    /// Whether this token was issued for the given purpose.
    pub fn permits(&self, purpose: ReauthPurpose) -> bool {
        self.scope.contains(&purpose)
    }
}

/// Claims of an MFA-session token issued after a correct password when a
/// second factor is still required.
#[derive(Debug, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test), derive(Serialize))]
pub struct MfaSessionClaims {
    pub kind: TokenKind,
    pub iss: String,
    pub sub: String,
    pub sv: i64,
    pub attempts_remaining: u8,
    pub methods: Vec<MfaMethod>,
    pub iat: u64,
    pub exp: u64,
}

// ── Core decode (private) ────────────────────────────────────────────────

trait KindTagged: serde::de::DeserializeOwned {
    const KIND: TokenKind;
    fn kind(&self) -> TokenKind;
}

macro_rules! kind_tagged {
    ($ty:ty, $kind:expr) => {
        impl KindTagged for $ty {
            const KIND: TokenKind = $kind;
            fn kind(&self) -> TokenKind {
                self.kind
            }
        }
    };
}

kind_tagged!(AccessClaims, TokenKind::Access);
kind_tagged!(RefreshClaims, TokenKind::Refresh);
kind_tagged!(ReauthClaims, TokenKind::Reauthorization);
kind_tagged!(MfaSessionClaims, TokenKind::MfaSession);

fn classify(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::InvalidEcdsaKey
        | jsonwebtoken::errors::ErrorKind::InvalidRsaKey(_) => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    }
}

/// Decode and validate a JWT of a specific kind.
///
/// Validation: HS256, exp checked with the library's default 60s leeway,
/// required claims `exp` + `sub`. A structurally valid token of another
/// kind fails with [`TokenError::WrongKind`].
fn decode_kind<C: KindTagged>(token: &str, secret: &str) -> Result<C, TokenError> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;
    validation.required_spec_claims.clear();
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<C>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(classify)?;

    if data.claims.kind() != C::KIND {
        return Err(TokenError::WrongKind);
    }
    Ok(data.claims)
}

/// Minimal claims for kind/expiry inspection without an exp check.
#[derive(Deserialize)]
struct InspectClaims {
    kind: TokenKind,
    exp: u64,
}

fn decode_inspect(token: &str, secret: &str) -> Result<InspectClaims, TokenError> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    validation.set_required_spec_claims(&["exp"]);

    decode::<InspectClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|d| d.claims)
    .map_err(classify)
}

// ── Public validation API ────────────────────────────────────────────────

/// Validate an access token (signature + expiry + kind).
///
/// The session-version check against the store is the identity service's
/// responsibility; this function is pure in key material and clock.
pub fn validate_access_token(token: &str, secret: &str) -> Result<AccessClaims, TokenError> {
    decode_kind(token, secret)
}

/// Validate a refresh token (signature + expiry + kind).
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<RefreshClaims, TokenError> {
    decode_kind(token, secret)
}

/// Validate a reauthorization token (signature + expiry + kind).
pub fn validate_reauth_token(token: &str, secret: &str) -> Result<ReauthClaims, TokenError> {
    decode_kind(token, secret)
}

/// Validate an MFA-session token (signature + expiry + kind).
pub fn validate_mfa_session_token(
    token: &str,
    secret: &str,
) -> Result<MfaSessionClaims, TokenError> {
    decode_kind(token, secret)
}

/// Identify the kind of a signed token without checking expiry.
pub fn identify_token_kind(token: &str, secret: &str) -> Result<TokenKind, TokenError> {
    decode_inspect(token, secret).map(|c| c.kind)
}

/// Whether a signed token's `exp` lies in the past.
pub fn is_expired(token: &str, secret: &str, now_secs: u64) -> Result<bool, TokenError> {
    decode_inspect(token, secret).map(|c| c.exp <= now_secs)
}

/// Parse the `sub` claim of any validated claims struct into a [`Uuid`].
pub fn parse_subject(sub: &str) -> Result<Uuid, TokenError> {
    sub.parse::<Uuid>().map_err(|_| TokenError::Malformed)
}
