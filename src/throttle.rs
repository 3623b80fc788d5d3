//! Quota-derived pacing for the news-search API.
//!
//! The upstream counts every request against a daily quota, successful or
//! not. [`Throttle`] spaces calls at least `86400 / calls_per_day + 1`
//! seconds apart and persists the time of the last call, so a restarted
//! process keeps honouring the spacing of the previous one.
//!
//! # Usage
//!
//! ```ignore
//! let mut throttle = Throttle::new(SubscriptionPlan::Developer, store);
//! throttle.init().await?;
//!
//! throttle.acquire().await;           // sleeps if the last call was too recent
//! let outcome = api.everything(&query).await;
//! throttle.release().await?;          // always, even when `outcome` is an error
//! ```

use crate::error::Result;
use crate::store::KeyValueStore;
use crate::utils::epoch_seconds;
use clap::ValueEnum;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Store key holding the epoch seconds of the last upstream call.
pub const LAST_CALL_AT_KEY: &str = "newsapi:throttle:last_call_at";

const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;

/// News-search API subscription tiers and their daily request quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SubscriptionPlan {
    Developer,
    Business,
    Enterprise,
}

impl SubscriptionPlan {
    pub fn calls_per_day(&self) -> u32 {
        match self {
            SubscriptionPlan::Developer => 100,
            SubscriptionPlan::Business => 250_000,
            SubscriptionPlan::Enterprise => 250_000,
        }
    }
}

#[derive(Debug)]
pub struct Throttle<S> {
    store: S,
    /// Minimum spacing between two calls, in seconds.
    interval: f64,
    calls_per_hour: usize,
    last_call_at: Option<f64>,
}

impl<S: KeyValueStore> Throttle<S> {
    pub fn new(plan: SubscriptionPlan, store: S) -> Self {
        Self::with_calls_per_day(plan.calls_per_day(), store)
    }

    pub fn with_calls_per_day(calls_per_day: u32, store: S) -> Self {
        let calls_per_day = calls_per_day.max(1);
        Self {
            store,
            interval: SECONDS_PER_DAY / calls_per_day as f64 + 1.0,
            calls_per_hour: (calls_per_day / 24).max(1) as usize,
            last_call_at: None,
        }
    }

    /// Load the persisted last-call timestamp, if any.
    ///
    /// An unreadable value is discarded with a warning: the first call then
    /// proceeds immediately, exactly as after a fresh install.
    #[instrument(level = "info", skip_all)]
    pub async fn init(&mut self) -> Result<()> {
        self.last_call_at = match self.store.get(LAST_CALL_AT_KEY).await? {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(ts) => Some(ts),
                Err(e) => {
                    warn!(value = %raw, error = %e, "Ignoring unparseable throttle state");
                    None
                }
            },
            None => None,
        };
        info!(
            last_call_at = ?self.last_call_at,
            interval_secs = self.interval,
            calls_per_hour = self.calls_per_hour,
            "Throttle initialized"
        );
        Ok(())
    }

    /// Seconds between two calls.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Number of calls that fit into one hour of quota; at least 1.
    pub fn calls_per_hour(&self) -> usize {
        self.calls_per_hour
    }

    pub fn last_call_at(&self) -> Option<f64> {
        self.last_call_at
    }

    /// How long a call attempted at `now` has to wait, if at all.
    pub fn wait_for(&self, now: f64) -> Option<Duration> {
        let last = self.last_call_at?;
        let wait = (self.interval + last) - now;
        (wait > 0.0).then(|| Duration::from_secs_f64(wait))
    }

    /// Suspend until the next call is allowed.
    pub async fn acquire(&self) {
        if let Some(wait) = self.wait_for(epoch_seconds()) {
            debug!(?wait, "Throttling");
            tokio::time::sleep(wait).await;
        }
    }

    /// Record that a call was made just now, whatever its outcome.
    pub async fn release(&mut self) -> Result<()> {
        let now = epoch_seconds();
        self.last_call_at = Some(now);
        self.store.set(LAST_CALL_AT_KEY, &now.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_interval_from_plan() {
        let throttle = Throttle::new(SubscriptionPlan::Developer, MemoryStore::new());
        assert!(approx(throttle.interval(), 865.0));
        assert_eq!(throttle.calls_per_hour(), 4);

        let business = Throttle::new(SubscriptionPlan::Business, MemoryStore::new());
        assert!(approx(business.interval(), 86400.0 / 250_000.0 + 1.0));
        assert_eq!(business.calls_per_hour(), 10_416);
    }

    #[test]
    fn test_tiny_quota_still_yields_one_call_per_hour() {
        let throttle = Throttle::with_calls_per_day(10, MemoryStore::new());
        assert_eq!(throttle.calls_per_hour(), 1);
    }

    #[test]
    fn test_no_history_means_no_wait() {
        let throttle = Throttle::new(SubscriptionPlan::Developer, MemoryStore::new());
        assert_eq!(throttle.wait_for(1_700_000_000.0), None);
    }

    #[test]
    fn test_half_interval_elapsed_waits_remaining_half() {
        let mut throttle = Throttle::new(SubscriptionPlan::Developer, MemoryStore::new());
        let t0 = 1_700_000_000.0;
        let interval = throttle.interval();
        throttle.last_call_at = Some(t0);

        let wait = throttle.wait_for(t0 + 0.5 * interval).unwrap();
        assert!(approx(wait.as_secs_f64(), 0.5 * interval));
    }

    #[test]
    fn test_two_intervals_elapsed_proceeds_immediately() {
        let mut throttle = Throttle::new(SubscriptionPlan::Developer, MemoryStore::new());
        let t0 = 1_700_000_000.0;
        throttle.last_call_at = Some(t0);

        assert_eq!(throttle.wait_for(t0 + 2.0 * throttle.interval()), None);
    }

    #[tokio::test]
    async fn test_release_persists_and_init_restores() {
        let store = MemoryStore::new();
        let mut first = Throttle::new(SubscriptionPlan::Developer, store.clone());
        first.init().await.unwrap();
        assert_eq!(first.last_call_at(), None);

        first.release().await.unwrap();
        let persisted = first.last_call_at().unwrap();

        let mut second = Throttle::new(SubscriptionPlan::Developer, store);
        second.init().await.unwrap();
        assert!(approx(second.last_call_at().unwrap(), persisted));
    }

    #[tokio::test]
    async fn test_garbage_state_is_ignored() {
        let store = MemoryStore::new();
        store.set(LAST_CALL_AT_KEY, "not-a-number").await.unwrap();

        let mut throttle = Throttle::new(SubscriptionPlan::Developer, store);
        throttle.init().await.unwrap();
        assert_eq!(throttle.last_call_at(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_sleeps_after_recent_call() {
        let mut throttle = Throttle::with_calls_per_day(86_400, MemoryStore::new());
        // interval = 2s
        throttle.release().await.unwrap();

        let start = tokio::time::Instant::now();
        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_without_history_is_immediate() {
        let throttle = Throttle::new(SubscriptionPlan::Developer, MemoryStore::new());
        let start = tokio::time::Instant::now();
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
