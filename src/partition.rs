//! Splits the monitored domain set into query-sized chunks.
//!
//! A single search response is capped by the upstream (100 articles), so a
//! chunk that pairs a high-volume outlet with a quiet one can starve the
//! quiet one. Reshuffling before every sweep changes which domains share a
//! chunk, spreading the per-call capacity across different combinations
//! over time.
//!
//! For example, with domains A, B, C, D and two chunks, one sweep may query
//! `[A, B]` and `[C, D]` while the next queries `[B, C]` and `[D, A]`.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

#[derive(Debug)]
pub struct DomainPartitioner {
    domains: Vec<String>,
    n_chunks: usize,
    rng: StdRng,
}

impl DomainPartitioner {
    /// `n_chunks` is clamped to at least 1.
    pub fn new(domains: Vec<String>, n_chunks: usize) -> Self {
        Self::with_rng(domains, n_chunks, StdRng::from_os_rng())
    }

    pub fn with_rng(domains: Vec<String>, n_chunks: usize, rng: StdRng) -> Self {
        Self {
            domains,
            n_chunks: n_chunks.max(1),
            rng,
        }
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Shuffle the domains and deal them round-robin into the chunks.
    ///
    /// Chunk sizes differ by at most one. When there are more chunks than
    /// domains the trailing chunks are empty and are omitted from the result.
    pub fn reshuffle(&mut self) -> Vec<Vec<String>> {
        self.domains.shuffle(&mut self.rng);

        let mut chunks: Vec<Vec<String>> = vec![Vec::new(); self.n_chunks.min(self.domains.len())];
        if chunks.is_empty() {
            return chunks;
        }
        let n = chunks.len();
        for (index, domain) in self.domains.iter().enumerate() {
            chunks[index % n].push(domain.clone());
        }

        debug!(chunks = chunks.len(), domains = self.domains.len(), "Reshuffled domain chunks");
        chunks
    }
}
