//! The long-running ingestion loop.
//!
//! # Phases
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!            v                                          │
//!   SweepStart ──reshuffle──> Chunk(0) ─> Chunk(1) ─> … ┘
//!        │                       │
//!        └────── shutdown ───────┴──────> Stopped
//! ```
//!
//! Each chunk runs: throttle → collect stored URLs → query → eligibility
//! filter → AMP lookup → classify → persist. A chunk that fails for any
//! reason, including a panic, is logged and skipped; the loop itself only
//! ends on shutdown.
//!
//! Shutdown is observed while waiting on the throttle, during the upstream
//! query and during the AMP lookup. Persisting is never interrupted, so a
//! chunk is either fully written or not written at all.

use crate::amp::{AmpLookup, create_amp_lookup};
use crate::classify::Classifier;
use crate::config::Settings;
use crate::error::{IngestError, Result};
use crate::filter::EligibilityFilter;
use crate::models::Bucket;
use crate::newsapi::{EverythingQuery, NewsSearch, SortBy};
use crate::partition::DomainPartitioner;
use crate::persist::PersistenceGateway;
use crate::store::{KeyValueStore, ListStore};
use crate::throttle::{SubscriptionPlan, Throttle};
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    /// Constructed, `run` not called yet.
    Idle,
    SweepStart { sweep: u64 },
    Chunk { sweep: u64, index: usize, of: usize },
    Stopped,
}

/// What one chunk produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    pub fetched: usize,
    pub eligible: usize,
    pub persisted: BTreeMap<Bucket, usize>,
}

#[derive(Debug)]
enum ChunkOutcome {
    Completed(ChunkReport),
    Skipped,
    Cancelled,
}

/// Resolves once shutdown has been requested; never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

pub struct Ingester<N, A, S> {
    search: N,
    amp: A,
    throttle: Throttle<S>,
    partitioner: DomainPartitioner,
    classifier: Classifier,
    gateway: PersistenceGateway<S>,
    page_size: u32,
    language: String,
    sort_by: Option<SortBy>,
    phase: IngestPhase,
}

impl<N, A, S> Ingester<N, A, S>
where
    N: NewsSearch,
    A: AmpLookup,
    S: ListStore + KeyValueStore + Clone,
{
    /// Wire the pipeline stages together.
    ///
    /// # Arguments
    ///
    /// * `settings` - Buckets, monitored domains and per-bucket cap
    /// * `search` - News-search client, usually wrapped in a retry decorator
    /// * `amp` - AMP lookup client (`None` disables enrichment)
    /// * `plan` - Subscription plan driving throttle spacing and chunk count
    /// * `store` - Backend for both the bucket lists and the throttle state
    pub fn new(settings: &Settings, search: N, amp: A, plan: SubscriptionPlan, store: S) -> Self {
        let throttle = Throttle::new(plan, store.clone());
        let partitioner =
            DomainPartitioner::new(settings.monitored_domains(), throttle.calls_per_hour());
        Self {
            search,
            amp,
            throttle,
            partitioner,
            classifier: Classifier::from_settings(settings),
            gateway: PersistenceGateway::new(store, settings.max_articles),
            page_size: settings.page_size,
            language: settings.language.clone(),
            sort_by: settings.sort_by,
            phase: IngestPhase::Idle,
        }
    }

    pub fn with_partitioner(mut self, partitioner: DomainPartitioner) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn phase(&self) -> IngestPhase {
        self.phase
    }

    /// Run sweeps until `shutdown` turns `true`.
    ///
    /// # Errors
    ///
    /// Only setup failures: unreadable throttle state, or no domains to poll.
    #[instrument(level = "info", skip_all, fields(domains = self.partitioner.domain_count()))]
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.throttle.init().await?;
        info!("Ingestion loop running");

        let mut sweep = 0u64;
        loop {
            sweep += 1;
            self.phase = IngestPhase::SweepStart { sweep };
            if *shutdown.borrow() {
                break;
            }

            let chunks = self.partitioner.reshuffle();
            if chunks.is_empty() {
                self.phase = IngestPhase::Stopped;
                return Err(IngestError::Config("no domains to poll".to_string()));
            }
            info!(sweep, chunks = chunks.len(), "Starting sweep");

            let (mut persisted, mut skipped) = (0usize, 0usize);
            for (index, domains) in chunks.iter().enumerate() {
                if *shutdown.borrow() {
                    break;
                }
                self.phase = IngestPhase::Chunk {
                    sweep,
                    index,
                    of: chunks.len(),
                };
                match self.guarded_chunk(domains, &mut shutdown).await {
                    ChunkOutcome::Completed(report) => {
                        persisted += report.persisted.values().sum::<usize>()
                    }
                    ChunkOutcome::Skipped => skipped += 1,
                    ChunkOutcome::Cancelled => break,
                }
            }
            info!(sweep, persisted, skipped, "Sweep finished");
        }

        self.phase = IngestPhase::Stopped;
        info!(sweeps = sweep, "Ingestion loop stopped");
        Ok(())
    }

    /// The per-chunk failure boundary: errors and panics become a skipped chunk.
    async fn guarded_chunk(
        &mut self,
        domains: &[String],
        shutdown: &mut watch::Receiver<bool>,
    ) -> ChunkOutcome {
        let t0 = Instant::now();
        let outcome = AssertUnwindSafe(self.process_chunk(domains, shutdown))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(report)) => {
                info!(
                    fetched = report.fetched,
                    eligible = report.eligible,
                    persisted = ?report.persisted,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Chunk processed"
                );
                ChunkOutcome::Completed(report)
            }
            Ok(Err(IngestError::Cancelled)) => {
                warn!(?domains, "Chunk abandoned on shutdown");
                ChunkOutcome::Cancelled
            }
            Ok(Err(e)) => {
                error!(?domains, error = %e, "Chunk failed; skipping");
                ChunkOutcome::Skipped
            }
            Err(payload) => {
                error!(?domains, panic = %panic_message(&*payload), "Chunk panicked; skipping");
                ChunkOutcome::Skipped
            }
        }
    }

    /// Process one chunk of domains end to end.
    pub async fn process_chunk(
        &mut self,
        domains: &[String],
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ChunkReport> {
        debug!(?domains, "Processing chunk");

        tokio::select! {
            biased;
            _ = self.throttle.acquire() => {}
            _ = shutdown_requested(shutdown) => return Err(IngestError::Cancelled),
        }

        let query = EverythingQuery {
            sort_by: self.sort_by,
            ..EverythingQuery::for_domains(domains, self.page_size, &self.language)
        };
        let gated = AssertUnwindSafe(async {
            tokio::select! {
                biased;
                res = async {
                    let seen = self.gateway.seen_urls().await?;
                    let response = self.search.everything(&query).await?;
                    Ok::<_, IngestError>((seen, response))
                } => res,
                _ = shutdown_requested(shutdown) => Err(IngestError::Cancelled),
            }
        })
        .catch_unwind()
        .await;

        // The upstream counts the request whatever happened to it, panics included.
        if let Err(e) = self.throttle.release().await {
            warn!(error = %e, "Cannot persist throttle state");
        }
        let (seen, response) = match gated {
            Ok(fetched) => fetched?,
            Err(payload) => std::panic::resume_unwind(payload),
        };

        let fetched = response.articles.len();
        debug!(fetched, total_results = ?response.total_results, "Query answered");
        let filter = EligibilityFilter::new(seen);
        let eligible = filter.retain_eligible(response.articles);
        debug!(
            fetched,
            eligible = eligible.len(),
            seen = filter.seen_count(),
            "Filtered articles"
        );

        let urls = eligible.iter().map(|a| a.url.clone()).collect::<Vec<_>>();
        let amp_lookup = tokio::select! {
            biased;
            mapping = create_amp_lookup(&self.amp, &urls) => mapping,
            _ = shutdown_requested(shutdown) => return Err(IngestError::Cancelled),
        };

        let eligible_count = eligible.len();
        let pending = self.classifier.classify(eligible, &amp_lookup);
        let persisted = self.gateway.persist(&pending).await?;

        Ok(ChunkReport {
            fetched,
            eligible: eligible_count,
            persisted,
        })
    }
}
