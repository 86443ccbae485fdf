pub mod accounts;
pub mod deletion;
pub mod email;
pub mod mfa;
pub mod password;
pub mod token;

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;

use gatehouse_auth_types::cookie::{ACCESS_TOKEN_COOKIE, bearer_or_cookie};
use gatehouse_auth_types::token::{parse_subject, validate_access_token};

use crate::domain::repository::IdentityRepository;
use crate::domain::types::Identity;
use crate::error::IdentityError;
use crate::state::AppState;

/// Resolve the caller from a bearer header or the access cookie, including
/// the live session-version check.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Result<Identity, IdentityError> {
    let token =
        bearer_or_cookie(headers, jar, ACCESS_TOKEN_COOKIE).ok_or(IdentityError::InvalidToken)?;
    let claims = validate_access_token(&token, &state.signer.secret)?;
    let id = parse_subject(&claims.sub)?;
    let identity = state
        .identity_repo()
        .find_by_id(id)
        .await?
        .ok_or(IdentityError::InvalidToken)?;
    if claims.sv != identity.session_version {
        return Err(IdentityError::SessionStale);
    }
    Ok(identity)
}

/// IPv6 textual maximum; anything longer is garbage and gets cut so it
/// cannot blow up limiter keys.
const MAX_IP_LEN: usize = 45;

/// Client address for rate-limit keys: first `x-forwarded-for` hop.
pub fn client_ip(headers: &HeaderMap) -> String {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown");
    let ip = if ip.len() > MAX_IP_LEN {
        &ip[..MAX_IP_LEN]
    } else {
        ip
    };
    format!("ip:{ip}")
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email.trim().to_lowercase())
}

pub fn identity_key(id: uuid::Uuid) -> String {
    format!("id:{id}")
}

/// Count a failure toward the pool unless the error came from the limiter
/// itself or an internal fault. Recording is best-effort; the original
/// error always wins.
pub async fn record_attempt<S, T>(
    limiter: &crate::ratelimit::RateLimiter<S>,
    keys: &[&str],
    result: Result<T, IdentityError>,
) -> Result<T, IdentityError>
where
    S: crate::ratelimit::RateLimitStore,
{
    match result {
        Ok(value) => {
            if let Err(e) = limiter.record_success(keys).await {
                tracing::warn!(error = %e, "rate-limit success record failed");
            }
            Ok(value)
        }
        Err(e) => {
            if e.counts_as_attempt() {
                if let Err(re) = limiter.record_failure(keys).await {
                    tracing::warn!(error = %re, "rate-limit failure record failed");
                }
            }
            Err(e)
        }
    }
}
