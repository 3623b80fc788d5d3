//! Error taxonomy for the ingestion pipeline.
//!
//! Every stage returns [`Result`]. The ingestion loop decides what each
//! variant means for a chunk: upstream rejections, malformed payloads and
//! store failures skip the chunk, enrichment failures degrade to "no AMP
//! URL", normalization failures drop a single article, and only
//! [`IngestError::Cancelled`] ends the loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The news-search API rejected the request (4xx, or a non-`ok` status).
    #[error("upstream API error {code} (status {status}): {message}")]
    UpstreamApi {
        status: String,
        code: String,
        message: String,
    },

    /// Timeout, connection failure or 5xx. Retried with backoff before surfacing.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("malformed upstream response: {source} (body: {preview})")]
    MalformedResponse {
        #[source]
        source: serde_json::Error,
        preview: String,
    },

    #[error("AMP enrichment failed: {0}")]
    Enrichment(String),

    #[error("cannot normalize article: {0}")]
    Normalization(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ingestion cancelled")]
    Cancelled,
}

impl IngestError {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::Transient(_) => true,
            IngestError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
