//! Multi-window rate limiting over pluggable counter stores.
//!
//! A pool names one protected surface (credential checks, account creation,
//! …) and carries a policy of one or more windows. Keys inside a pool are
//! caller-scoped (client IP, email, identity ID); a request is allowed only
//! if every key passes every window. Failed attempts are recorded, and a
//! success clears the caller's counters so one mistyped password an hour
//! does not accumulate toward a lockout.

mod memory;
mod redis;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::IdentityError;

pub use memory::MemoryRateLimitStore;
pub use redis::RedisRateLimitStore;

/// One counting window: at most `max` recorded attempts per `secs` seconds.
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub secs: u64,
    pub max: u32,
}

/// A pool's policy. Windows are checked independently; the tightest one
/// that is exhausted decides the retry delay.
#[derive(Debug, Clone)]
pub struct RatePolicy {
    pub windows: Vec<RateWindow>,
}

impl RatePolicy {
    pub fn new(windows: &[(u64, u32)]) -> Self {
        Self {
            windows: windows
                .iter()
                .map(|&(secs, max)| RateWindow { secs, max })
                .collect(),
        }
    }

    /// Longest window in the policy; counters older than this are garbage.
    pub fn horizon_secs(&self) -> u64 {
        self.windows.iter().map(|w| w.secs).max().unwrap_or(0)
    }
}

/// Outcome of a limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    /// When the next attempt would pass, for the Retry-After header.
    pub next_allowed_at: Option<DateTime<Utc>>,
}

impl RateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            next_allowed_at: None,
        }
    }

    pub fn deny(next_allowed_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            next_allowed_at: Some(next_allowed_at),
        }
    }
}

/// Counter storage backing the limiter.
///
/// `now` is explicit so stores are testable without a clock shim; callers
/// on the request path pass `Utc::now()`.
#[allow(async_fn_in_trait)]
pub trait RateLimitStore: Send + Sync {
    async fn check(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, IdentityError>;

    async fn record_failure(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<(), IdentityError>;

    /// Clear the key's counters across all of the pool's windows.
    async fn record_success(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
    ) -> Result<(), IdentityError>;
}

/// Store chosen at startup: process-local unless `REDIS_URL` is set.
pub enum SharedRateStore {
    Memory(MemoryRateLimitStore),
    Redis(RedisRateLimitStore),
}

impl RateLimitStore for SharedRateStore {
    async fn check(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, IdentityError> {
        match self {
            Self::Memory(s) => s.check(pool, key, policy, now).await,
            Self::Redis(s) => s.check(pool, key, policy, now).await,
        }
    }

    async fn record_failure(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<(), IdentityError> {
        match self {
            Self::Memory(s) => s.record_failure(pool, key, policy, now).await,
            Self::Redis(s) => s.record_failure(pool, key, policy, now).await,
        }
    }

    async fn record_success(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
    ) -> Result<(), IdentityError> {
        match self {
            Self::Memory(s) => s.record_success(pool, key, policy).await,
            Self::Redis(s) => s.record_success(pool, key, policy).await,
        }
    }
}

/// One pool's limiter: a name, a policy, and the shared store.
pub struct RateLimiter<S> {
    pool: &'static str,
    policy: RatePolicy,
    store: Arc<S>,
}

impl<S: RateLimitStore> RateLimiter<S> {
    pub fn new(pool: &'static str, policy: RatePolicy, store: Arc<S>) -> Self {
        Self {
            pool,
            policy,
            store,
        }
    }

    /// Reject with `TooManyRequests` if any key is over any window.
    pub async fn check(&self, keys: &[&str]) -> Result<(), IdentityError> {
        let now = Utc::now();
        for key in keys {
            let decision = self.store.check(self.pool, key, &self.policy, now).await?;
            if !decision.allowed {
                let retry_after_secs = decision
                    .next_allowed_at
                    .map(|at| (at - now).num_seconds().max(1) as u64)
                    .unwrap_or(1);
                tracing::warn!(pool = self.pool, "rate limit exceeded");
                return Err(IdentityError::TooManyRequests { retry_after_secs });
            }
        }
        Ok(())
    }

    /// Count a failed attempt against every key.
    pub async fn record_failure(&self, keys: &[&str]) -> Result<(), IdentityError> {
        let now = Utc::now();
        for key in keys {
            self.store
                .record_failure(self.pool, key, &self.policy, now)
                .await?;
        }
        Ok(())
    }

    /// Clear every key's counters after a successful attempt.
    pub async fn record_success(&self, keys: &[&str]) -> Result<(), IdentityError> {
        for key in keys {
            self.store
                .record_success(self.pool, key, &self.policy)
                .await?;
        }
        Ok(())
    }
}

/// All pool limiters, constructed once at startup.
pub struct RateLimits<S> {
    pub credentials: RateLimiter<S>,
    pub token_access: RateLimiter<S>,
    pub token_refresh: RateLimiter<S>,
    pub account_creation: RateLimiter<S>,
    pub deletion: RateLimiter<S>,
    pub email_change: RateLimiter<S>,
    pub password: RateLimiter<S>,
    pub reauthorization: RateLimiter<S>,
    pub logout: RateLimiter<S>,
}

impl<S: RateLimitStore> RateLimits<S> {
    pub fn new(store: Arc<S>) -> Self {
        let pool = |name, windows: &[(u64, u32)]| {
            RateLimiter::new(name, RatePolicy::new(windows), store.clone())
        };
        Self {
            // Password and MFA guesses: tight burst window plus an hourly cap.
            credentials: pool("credentials", &[(60, 5), (3_600, 20)]),
            token_access: pool("token_access", &[(60, 120)]),
            token_refresh: pool("token_refresh", &[(60, 30)]),
            account_creation: pool("account_creation", &[(3_600, 10), (86_400, 30)]),
            deletion: pool("deletion", &[(3_600, 5)]),
            email_change: pool("email_change", &[(3_600, 5)]),
            password: pool("password", &[(60, 5), (3_600, 15)]),
            reauthorization: pool("reauthorization", &[(60, 5), (3_600, 20)]),
            logout: pool("logout", &[(60, 30)]),
        }
    }
}

pub(crate) fn window_reset_at(window: RateWindow, from: DateTime<Utc>) -> DateTime<Utc> {
    from + Duration::seconds(window.secs as i64)
}
