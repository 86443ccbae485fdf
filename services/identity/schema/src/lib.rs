//! sea-orm entities for the identity service.

pub mod backup_codes;
pub mod email_change_requests;
pub mod identities;
pub mod one_time_tokens;
pub mod totp_credentials;
pub mod user_profiles;
