use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::{RateDecision, RateLimitStore, RatePolicy, window_reset_at};
use crate::error::IdentityError;

/// Process-local sliding-window store.
///
/// Keeps the raw attempt timestamps per (pool, key) and prunes anything
/// older than the policy's longest window on every touch. Suitable for a
/// single instance; multi-instance deployments configure Redis instead.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<(String, String), Vec<DateTime<Utc>>>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn prune(attempts: &mut Vec<DateTime<Utc>>, horizon_secs: u64, now: DateTime<Utc>) {
    let cutoff = now - Duration::seconds(horizon_secs as i64);
    attempts.retain(|&at| at > cutoff);
}

impl RateLimitStore for MemoryRateLimitStore {
    async fn check(
        &self,
        pool: &str,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, IdentityError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("rate-limit store poisoned"))?;
        let Some(attempts) = entries.get_mut(&(pool.to_owned(), key.to_owned())) else {
            return Ok(RateDecision::allow());
        };
        prune(attempts, policy.horizon_secs(), now);

        let mut worst: Option<DateTime<Utc>> = None;
        for window in &policy.windows {
            let start = now - Duration::seconds(window.secs as i64);
            let in_window: Vec<_> = attempts.iter().filter(|&&at| at > start).collect();
            if in_window.len() >= window.max as usize {
                // The window frees up when its oldest attempt ages out.
                if let Some(&&oldest) = in_window.first() {
                    let reset = window_reset_at(*window, oldest);
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
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("rate-limit store poisoned"))?;
        let attempts = entries.entry((pool.to_owned(), key.to_owned())).or_default();
        prune(attempts, policy.horizon_secs(), now);
        attempts.push(now);
        Ok(())
    }

    async fn record_success(
        &self,
        pool: &str,
        key: &str,
        _policy: &RatePolicy,
    ) -> Result<(), IdentityError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("rate-limit store poisoned"))?;
        entries.remove(&(pool.to_owned(), key.to_owned()));
        Ok(())
    }
}
