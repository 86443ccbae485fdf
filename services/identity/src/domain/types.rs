use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use rand::distr::Alphanumeric;
use uuid::Uuid;

use crate::error::IdentityError;

/// An account as the lifecycle and token machinery sees it.
///
/// `session_version` starts at 0 and only ever increases; every signed token
/// carries the version current at issuance.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub session_version: i64,
    pub pending_deletion_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            email_verified: false,
            session_version: 0,
            pending_deletion_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kinds of one-time tokens, each consumable by exactly one confirm step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneTimeTokenKind {
    EmailVerification,
    PasswordReset,
    EmailChange,
    Reauthorization,
}

impl OneTimeTokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
            Self::EmailChange => "email_change",
            Self::Reauthorization => "reauthorization",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "email_verification" => Some(Self::EmailVerification),
            "password_reset" => Some(Self::PasswordReset),
            "email_change" => Some(Self::EmailChange),
            "reauthorization" => Some(Self::Reauthorization),
            _ => None,
        }
    }
}

/// Length of random one-time token values sent out in mail links.
pub const ONE_TIME_TOKEN_LEN: usize = 48;

/// One-time token row. The `value` is what travels in a confirmation link
/// (or, for reauthorization, the JWT's `jti`); it is unique store-wide.
#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub kind: OneTimeTokenKind,
    pub value: String,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OneTimeToken {
    /// New token with a fresh random value, valid for `ttl_secs` from now.
    pub fn issue(identity_id: Uuid, kind: OneTimeTokenKind, ttl_secs: u64) -> Self {
        Self::with_value(identity_id, kind, random_token_value(), ttl_secs)
    }

    /// New token carrying a caller-chosen value (reauthorization uses the
    /// JWT `jti` here so the row and the signed token stay linked).
    pub fn with_value(
        identity_id: Uuid,
        kind: OneTimeTokenKind,
        value: String,
        ttl_secs: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            identity_id,
            kind,
            value,
            valid_until: now + Duration::seconds(ttl_secs as i64),
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }
}

fn random_token_value() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(ONE_TIME_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Pending email change, tied to the one-time token that confirms it.
#[derive(Debug, Clone)]
pub struct EmailChangeRequest {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub new_email: String,
    pub token_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl EmailChangeRequest {
    pub fn new(identity_id: Uuid, new_email: String, token_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_id,
            new_email,
            token_id,
            created_at: Utc::now(),
        }
    }
}

/// TOTP credential. Unconfirmed rows are setup attempts; only a confirmed
/// credential makes login demand a second factor.
#[derive(Debug, Clone)]
pub struct TotpCredential {
    pub identity_id: Uuid,
    /// Base32, no padding.
    pub secret: String,
    pub algorithm: String,
    pub digits: u32,
    pub step_seconds: u64,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TotpCredential {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

/// Stored backup code (argon2 hash only; plaintext is shown exactly once).
#[derive(Debug, Clone)]
pub struct BackupCode {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub code_hash: String,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Minimal shape check before the expensive MX-less validation a mail relay
/// would do anyway: one `@`, non-empty local and domain parts, a dot in the
/// domain, no whitespace.
pub fn validate_email(email: &str) -> Result<(), IdentityError> {
    let ok = email.len() <= 254
        && !email.contains(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
    if ok {
        Ok(())
    } else {
        Err(IdentityError::Validation("invalid email address".to_owned()))
    }
}

pub const PASSWORD_MIN_LEN: usize = 10;
pub const PASSWORD_MAX_LEN: usize = 128;

/// Length-only password policy; composition rules push users toward
/// predictable patterns and are deliberately absent.
pub fn validate_password(password: &str) -> Result<(), IdentityError> {
    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(IdentityError::Validation(format!(
            "password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }
    if len > PASSWORD_MAX_LEN {
        return Err(IdentityError::Validation(format!(
            "password must be at most {PASSWORD_MAX_LEN} characters"
        )));
    }
    Ok(())
}
