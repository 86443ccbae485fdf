pub mod deletion;
pub mod email_change;
pub mod login;
pub mod mfa;
pub mod password;
pub mod signup;
pub mod token;
