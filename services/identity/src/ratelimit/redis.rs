use chrono::{DateTime, Utc};
use deadpool_redis::Pool;
use deadpool_redis::redis::AsyncCommands;

use super::{RateDecision, RateLimitStore, RatePolicy, RateWindow};
use crate::error::IdentityError;

/// Redis-backed store for multi-instance deployments.
///
/// Uses fixed windows: each (pool, key, window) maps to a counter keyed by
/// the current bucket number, INCRed on failure with the window length as
/// TTL. Fixed windows admit up to 2x the cap across a bucket boundary,
/// which is acceptable slack for abuse ceilings.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    pub pool: Pool,
}

fn bucket(window: RateWindow, now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(window.secs as i64)
}

fn counter_key(pool: &str, key: &str, window: RateWindow, now: DateTime<Utc>) -> String {
    format!("rl:{}:{}:{}:{}", pool, key, window.secs, bucket(window, now))
}

impl RateLimitStore for RedisRateLimitStore {
    async fn check(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, IdentityError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| IdentityError::Internal(e.into()))?;
        let mut worst: Option<DateTime<Utc>> = None;
        for &window in &policy.windows {
            let count: Option<u32> = conn
                .get(counter_key(pool, key, window, now))
                .await
                .map_err(|e| IdentityError::Internal(e.into()))?;
            if count.unwrap_or(0) >= window.max {
                let reset_ts = (bucket(window, now) + 1) * window.secs as i64;
                if let Some(reset) = DateTime::from_timestamp(reset_ts, 0) {
                    worst = Some(worst.map_or(reset, |w: DateTime<Utc>| w.max(reset)));
                }
            }
        }
        Ok(match worst {
            Some(at) => RateDecision::deny(at),
            None => RateDecision::allow(),
        })
    }

    async fn record_failure(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<(), IdentityError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| IdentityError::Internal(e.into()))?;
        for &window in &policy.windows {
            let counter = counter_key(pool, key, window, now);
            let count: u32 = conn
                .incr(&counter, 1)
                .await
                .map_err(|e| IdentityError::Internal(e.into()))?;
            if count == 1 {
                let (): () = conn
                    .expire(&counter, window.secs as i64)
                    .await
                    .map_err(|e| IdentityError::Internal(e.into()))?;
            }
        }
        Ok(())
    }

    async fn record_success(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
    ) -> Result<(), IdentityError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| IdentityError::Internal(e.into()))?;
        let now = Utc::now();
        for &window in &policy.windows {
            // Only the live bucket matters; expired buckets age out on TTL.
            let (): () = conn
                .del(counter_key(pool, key, window, now))
                .await
                .map_err(|e| IdentityError::Internal(e.into()))?;
        }
        Ok(())
    }
}
