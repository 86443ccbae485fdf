use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use gatehouse_auth_types::cookie::{
    ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, bearer_or_cookie, clear_session_cookies,
    set_access_token_cookie, set_reauth_token_cookie, set_refresh_token_cookie,
};
use gatehouse_auth_types::token::{MfaMethod, ReauthPurpose, parse_subject, validate_access_token};

use crate::error::IdentityError;
use crate::handlers::{authenticate, client_ip, email_key, identity_key, record_attempt};
use crate::state::AppState;
use crate::usecase::login::{LoginInput, LoginOutcome, LoginUseCase};
use crate::usecase::token::{
    CheckAccessUseCase, LogoutUseCase, ReauthorizeUseCase, RefreshTokenUseCase, TokenPair,
};

const X_ACCESS_TOKEN_EXPIRES: &str = "x-access-token-expires";

fn token_expires_header(exp: u64) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(X_ACCESS_TOKEN_EXPIRES),
        HeaderValue::from_str(&exp.to_string()).unwrap_or(HeaderValue::from_static("0")),
    )
}

#[derive(Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub access_token_exp: u64,
    pub refresh_token: String,
}

pub(super) fn session_response(
    state: &AppState,
    jar: CookieJar,
    pair: TokenPair,
    status: StatusCode,
) -> impl IntoResponse + use<> {
    let jar = set_access_token_cookie(jar, pair.access_token.clone(), state.cookie_domain.clone());
    let jar =
        set_refresh_token_cookie(jar, pair.refresh_token.clone(), state.cookie_domain.clone());
    let mut headers = HeaderMap::new();
    let (name, value) = token_expires_header(pair.access_token_exp);
    headers.insert(name, value);
    (
        status,
        jar,
        headers,
        Json(TokenPairResponse {
            access_token: pair.access_token,
            access_token_exp: pair.access_token_exp,
            refresh_token: pair.refresh_token,
        }),
    )
}

// ── GET /auth/token ──────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct CheckTokenResponse {
    pub identity_id: uuid::Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub async fn check_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    state.limits.token_access.check(&[&ip]).await?;

    let token = bearer_or_cookie(&headers, &jar, ACCESS_TOKEN_COOKIE)
        .ok_or(IdentityError::InvalidToken)?;
    let usecase = CheckAccessUseCase {
        identities: state.identity_repo(),
        secret: state.signer.secret.clone(),
    };
    let result = usecase.execute(&token).await;
    let out = record_attempt(&state.limits.token_access, &[&ip], result).await?;

    Ok(Json(CheckTokenResponse {
        identity_id: out.identity_id,
        email: out.email,
        name: out.name,
    }))
}

// ── POST /auth/token (login) ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateTokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct MfaRequiredResponse {
    pub mfa_required: bool,
    pub mfa_token: String,
    pub methods: Vec<MfaMethod>,
}

pub async fn create_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<CreateTokenRequest>,
) -> Result<axum::response::Response, IdentityError> {
    let ip = client_ip(&headers);
    let email = email_key(&body.email);
    let limiter = &state.limits.credentials;
    limiter.check(&[&ip, &email]).await?;

    let usecase = LoginUseCase {
        identities: state.identity_repo(),
        totp: state.totp_repo(),
        backup_codes: state.backup_code_repo(),
        hasher: state.hasher.clone(),
        signer: state.signer.clone(),
    };
    let result = usecase
        .execute(LoginInput {
            email: body.email,
            password: body.password,
        })
        .await;
    let outcome = record_attempt(limiter, &[&ip, &email], result).await?;

    Ok(match outcome {
        LoginOutcome::Authenticated(pair) => {
            session_response(&state, jar, pair, StatusCode::CREATED).into_response()
        }
        LoginOutcome::MfaRequired { mfa_token, methods } => (
            StatusCode::OK,
            Json(MfaRequiredResponse {
                mfa_required: true,
                mfa_token,
                methods,
            }),
        )
            .into_response(),
    })
}

// ── PATCH /auth/token (refresh) ──────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Option<Json<RefreshTokenRequest>>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let limiter = &state.limits.token_refresh;
    limiter.check(&[&ip]).await?;

    let refresh_value = body
        .and_then(|Json(b)| b.refresh_token)
        .or_else(|| jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_owned()))
        .ok_or(IdentityError::InvalidToken)?;

    // When a still-valid access token accompanies the call, pin the
    // refresh to the same identity.
    let expected = bearer_or_cookie(&headers, &jar, ACCESS_TOKEN_COOKIE)
        .and_then(|t| validate_access_token(&t, &state.signer.secret).ok())
        .and_then(|claims| parse_subject(&claims.sub).ok());

    let usecase = RefreshTokenUseCase {
        identities: state.identity_repo(),
        signer: state.signer.clone(),
    };
    let result = usecase.execute(&refresh_value, expected).await;
    let out = record_attempt(limiter, &[&ip], result).await?;

    Ok(session_response(&state, jar, out.pair, StatusCode::CREATED))
}

// ── DELETE /auth/token (logout everywhere) ───────────────────────────────

pub async fn revoke_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    state.limits.logout.check(&[&ip]).await?;

    let identity = authenticate(&state, &headers, &jar).await?;
    let usecase = LogoutUseCase {
        identities: state.identity_repo(),
    };
    usecase.execute(identity.id).await?;

    let jar = clear_session_cookies(jar, state.cookie_domain.clone());
    Ok((StatusCode::NO_CONTENT, jar))
}

// ── POST /auth/reauthorization ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct ReauthorizeRequest {
    pub password: String,
    pub scope: Vec<ReauthPurpose>,
}

#[derive(Serialize)]
pub struct ReauthorizeResponse {
    pub reauthorization_token: String,
}

pub async fn reauthorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<ReauthorizeRequest>,
) -> Result<impl IntoResponse, IdentityError> {
    let ip = client_ip(&headers);
    let identity = authenticate(&state, &headers, &jar).await?;
    let id_key = identity_key(identity.id);
    let limiter = &state.limits.reauthorization;
    limiter.check(&[&ip, &id_key]).await?;

    let usecase = ReauthorizeUseCase {
        identities: state.identity_repo(),
        tokens: state.token_repo(),
        hasher: state.hasher.clone(),
        signer: state.signer.clone(),
    };
    let result = usecase.execute(&identity, &body.password, body.scope).await;
    let token = record_attempt(limiter, &[&ip, &id_key], result).await?;

    let jar = set_reauth_token_cookie(jar, token.clone(), state.cookie_domain.clone());
    Ok((
        StatusCode::CREATED,
        jar,
        Json(ReauthorizeResponse {
            reauthorization_token: token,
        }),
    ))
}
