use serde::Deserialize;

use gatehouse_core::config::Config;

/// Identity service configuration loaded from environment variables.
///
/// Field names map to uppercased env var names (`DATABASE_URL`, …).
/// Expiry and MFA knobs all have production defaults.
#[derive(Debug, Deserialize)]
pub struct IdentityConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL. When set, rate-limit counters live in Redis and
    /// are shared across instances; otherwise they are process-local.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// HMAC secret for signing all token kinds.
    pub token_secret: String,
    /// Issuer embedded in every signed token.
    pub token_issuer: String,
    /// Cookie domain attribute (root domain, e.g. "example.com").
    pub cookie_domain: String,
    /// Mail relay endpoint; mail sends are JSON POSTs to this URL.
    pub mail_relay_url: String,
    /// From-address handed to the relay.
    pub mail_sender: String,
    /// TCP port to listen on (default 3110). Env var: `IDENTITY_PORT`.
    #[serde(default = "default_port")]
    pub identity_port: u16,

    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
    #[serde(default = "default_reauth_ttl")]
    pub reauth_token_ttl_secs: u64,
    #[serde(default = "default_mfa_session_ttl")]
    pub mfa_session_ttl_secs: u64,
    #[serde(default = "default_verification_ttl")]
    pub verification_token_ttl_secs: u64,
    #[serde(default = "default_password_reset_ttl")]
    pub password_reset_ttl_secs: u64,
    #[serde(default = "default_email_change_ttl")]
    pub email_change_ttl_secs: u64,

    /// Issuer name shown in authenticator apps.
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    #[serde(default = "default_totp_digits")]
    pub totp_digits: u16,
    #[serde(default = "default_totp_step")]
    pub totp_step_secs: u16,
    /// Accepted clock drift in time steps on either side of now.
    #[serde(default = "default_totp_skew")]
    pub totp_skew: u8,

    #[serde(default = "default_backup_code_count")]
    pub backup_code_count: u8,
    #[serde(default = "default_backup_code_length")]
    pub backup_code_length: u8,

    /// Days between a deletion request and the earliest irreversible confirm.
    #[serde(default = "default_deletion_grace_days")]
    pub deletion_grace_days: u16,
}

impl Config for IdentityConfig {}

fn default_port() -> u16 {
    3110
}

fn default_access_ttl() -> u64 {
    900
}

fn default_refresh_ttl() -> u64 {
    604_800
}

fn default_reauth_ttl() -> u64 {
    300
}

fn default_mfa_session_ttl() -> u64 {
    300
}

fn default_verification_ttl() -> u64 {
    86_400
}

fn default_password_reset_ttl() -> u64 {
    3_600
}

fn default_email_change_ttl() -> u64 {
    3_600
}

fn default_totp_issuer() -> String {
    "Gatehouse".to_owned()
}

fn default_totp_digits() -> u16 {
    6
}

fn default_totp_step() -> u16 {
    30
}

fn default_totp_skew() -> u8 {
    1
}

fn default_backup_code_count() -> u8 {
    8
}

fn default_backup_code_length() -> u8 {
    10
}

fn default_deletion_grace_days() -> u16 {
    7
}
