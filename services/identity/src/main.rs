use std::sync::Arc;

use sea_orm::Database;
use tracing::info;

use gatehouse_core::config::Config;
use gatehouse_core::tracing::init_tracing;
use gatehouse_identity::config::IdentityConfig;
use gatehouse_identity::infra::mail::HttpMailer;
use gatehouse_identity::infra::password::ArgonPasswordHasher;
use gatehouse_identity::ratelimit::{
    MemoryRateLimitStore, RateLimits, RedisRateLimitStore, SharedRateStore,
};
use gatehouse_identity::router::build_router;
use gatehouse_identity::state::AppState;
use gatehouse_identity::totp::TotpProvisioner;
use gatehouse_identity::usecase::token::TokenSigner;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = IdentityConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let store = match &config.redis_url {
        Some(url) => {
            let redis = deadpool_redis::Config::from_url(url)
                .create_pool(Some(deadpool_redis::Runtime::Tokio1))
                .expect("failed to create Redis pool");
            SharedRateStore::Redis(RedisRateLimitStore { pool: redis })
        }
        None => {
            info!("REDIS_URL not set, rate-limit counters are process-local");
            SharedRateStore::Memory(MemoryRateLimitStore::new())
        }
    };
    let limits = Arc::new(RateLimits::new(Arc::new(store)));

    let signer = TokenSigner {
        secret: config.token_secret,
        issuer: config.token_issuer,
        access_ttl_secs: config.access_token_ttl_secs,
        refresh_ttl_secs: config.refresh_token_ttl_secs,
        reauth_ttl_secs: config.reauth_token_ttl_secs,
        mfa_session_ttl_secs: config.mfa_session_ttl_secs,
    };
    let provisioner = TotpProvisioner {
        issuer: config.totp_issuer,
        digits: config.totp_digits as usize,
        step_seconds: config.totp_step_secs as u64,
        skew: config.totp_skew,
    };
    let mailer = HttpMailer {
        client: reqwest::Client::new(),
        relay_url: config.mail_relay_url,
        sender: config.mail_sender,
    };

    let state = AppState {
        db,
        signer,
        hasher: ArgonPasswordHasher,
        mailer,
        limits,
        provisioner,
        cookie_domain: config.cookie_domain,
        verification_ttl_secs: config.verification_token_ttl_secs,
        password_reset_ttl_secs: config.password_reset_ttl_secs,
        email_change_ttl_secs: config.email_change_ttl_secs,
        deletion_grace_days: config.deletion_grace_days,
        backup_code_count: config.backup_code_count,
        backup_code_length: config.backup_code_length,
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.identity_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("identity service listening on {addr}");
    axum::serve(listener, router).await.expect("server error");
}
