//! Exponential backoff around the news-search call.
//!
//! # Retry Strategy
//!
//! - Only errors where [`IngestError::is_transient`] holds are retried
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second, capped at 30 seconds
//! - Random jitter (0-250ms) added to every delay
//!
//! [`IngestError::is_transient`]: crate::error::IngestError::is_transient

use crate::error::Result;
use crate::models::SearchResponse;
use crate::newsapi::{EverythingQuery, NewsSearch};
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

pub const DEFAULT_MAX_RETRIES: usize = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Decorator adding retries with exponential backoff to any [`NewsSearch`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetrySearch<T> {
    inner: T,
    max_retries: usize,
    /// Doubles with each attempt.
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: NewsSearch> RetrySearch<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Five retries starting at one second.
    pub fn with_defaults(inner: T) -> Self {
        Self::new(inner, DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetrySearch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySearch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: NewsSearch> NewsSearch for RetrySearch<T> {
    #[instrument(level = "info", skip_all)]
    async fn everything(&self, query: &EverythingQuery) -> Result<SearchResponse> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            let e = match self.inner.everything(query).await {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };

            attempt += 1;
            if attempt > self.max_retries {
                error!(
                    attempt,
                    max = self.max_retries,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %e,
                    "everything() exhausted retries"
                );
                return Err(e);
            }

            let delay = self.delay_for(attempt);
            warn!(
                attempt,
                max = self.max_retries,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                ?delay,
                error = %e,
                "everything() attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}
