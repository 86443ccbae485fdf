//! Cookie builders for token transport.
//!
//! Tokens travel either as a `Bearer` header or as an HttpOnly cookie scoped
//! per token kind. The refresh cookie is path-restricted to the refresh
//! endpoint so it is not replayed on every request.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use http::HeaderMap;
use time::Duration;

/// Cookie name for the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Cookie name for the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Cookie name for the reauthorization token.
pub const REAUTH_TOKEN_COOKIE: &str = "reauthorization_token";

/// Max-Age for the access/refresh cookies in seconds (7 days).
///
/// The access JWT itself expires much earlier; the cookie lives as long as
/// the refresh token so the browser keeps presenting it.
pub const SESSION_COOKIE_MAX_AGE_SECS: i64 = 604_800;

/// Max-Age for the reauthorization cookie in seconds (5 minutes).
pub const REAUTH_COOKIE_MAX_AGE_SECS: i64 = 300;

fn token_cookie(
    name: &'static str,
    value: String,
    domain: String,
    path: &'static str,
    max_age_secs: i64,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(path)
        .domain(domain)
        .max_age(Duration::seconds(max_age_secs))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Set the access-token cookie on the jar.
pub fn set_access_token_cookie(jar: CookieJar, value: String, domain: String) -> CookieJar {
    jar.add(token_cookie(
        ACCESS_TOKEN_COOKIE,
        value,
        domain,
        "/",
        SESSION_COOKIE_MAX_AGE_SECS,
    ))
}

/// Set the refresh-token cookie on the jar (scoped to the refresh endpoint).
pub fn set_refresh_token_cookie(jar: CookieJar, value: String, domain: String) -> CookieJar {
    jar.add(token_cookie(
        REFRESH_TOKEN_COOKIE,
        value,
        domain,
        "/auth/token",
        SESSION_COOKIE_MAX_AGE_SECS,
    ))
}

/// Set the reauthorization-token cookie on the jar.
pub fn set_reauth_token_cookie(jar: CookieJar, value: String, domain: String) -> CookieJar {
    jar.add(token_cookie(
        REAUTH_TOKEN_COOKIE,
        value,
        domain,
        "/",
        REAUTH_COOKIE_MAX_AGE_SECS,
    ))
}

/// Clear the session cookies by setting Max-Age to 0.
pub fn clear_session_cookies(jar: CookieJar, domain: String) -> CookieJar {
    let access = token_cookie(ACCESS_TOKEN_COOKIE, String::new(), domain.clone(), "/", 0);
    let refresh = token_cookie(
        REFRESH_TOKEN_COOKIE,
        String::new(),
        domain,
        "/auth/token",
        0,
    );
    jar.add(access).add(refresh)
}

/// Extract a token from the `Authorization: Bearer` header, falling back to
/// the named cookie.
pub fn bearer_or_cookie(headers: &HeaderMap, jar: &CookieJar, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    bearer.or_else(|| jar.get(cookie_name).map(|c| c.value().to_owned()))
}
