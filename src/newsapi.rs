//! Client for the news-search API's `/v2/everything` endpoint.
//!
//! # Error mapping
//!
//! | Response | Error |
//! |---|---|
//! | 5xx, timeout, connection failure | [`IngestError::Transient`] / [`IngestError::Http`] (retryable) |
//! | 4xx | [`IngestError::UpstreamApi`] with the body's `code`/`message` |
//! | 2xx with `status != "ok"` | [`IngestError::UpstreamApi`] |
//! | 2xx with an undecodable body | [`IngestError::MalformedResponse`] |

use crate::error::{IngestError, Result};
use crate::models::SearchResponse;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, error, instrument};

pub const NEWSAPI_BASE_URL: &str = "https://newsapi.org/v2";

/// `status` value of a successful response.
pub const RESPONSE_OK: &str = "ok";

/// One search against the news-search API.
pub trait NewsSearch {
    async fn everything(&self, query: &EverythingQuery) -> Result<SearchResponse>;
}

/// Result ordering; `sort_by` in the settings file uses the API's names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    Relevancy,
    Popularity,
    PublishedAt,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevancy => "relevancy",
            SortBy::Popularity => "popularity",
            SortBy::PublishedAt => "publishedAt",
        }
    }
}

/// Parameters of `/v2/everything`. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EverythingQuery {
    /// Keywords or phrases searched in title and body.
    pub q: Option<String>,
    /// Keywords or phrases searched in the title only.
    pub q_in_title: Option<String>,
    pub sources: Option<Vec<String>>,
    pub domains: Option<Vec<String>>,
    pub exclude_domains: Option<Vec<String>>,
    /// Oldest publication time allowed, ISO 8601.
    pub from: Option<String>,
    /// Newest publication time allowed, ISO 8601.
    pub to: Option<String>,
    /// Two-letter ISO 639-1 code.
    pub language: Option<String>,
    pub sort_by: Option<SortBy>,
    /// Results per page; the API allows at most 100.
    pub page_size: Option<u32>,
    pub page: Option<u32>,
}

impl EverythingQuery {
    /// The query used for one chunk of monitored domains.
    pub fn for_domains(domains: &[String], page_size: u32, language: &str) -> Self {
        Self {
            domains: Some(domains.to_vec()),
            page_size: Some(page_size),
            language: Some(language.to_string()),
            ..Default::default()
        }
    }

    /// Query-string pairs in the API's parameter names; lists are comma-joined.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        let mut text = |name: &'static str, value: &Option<String>| {
            if let Some(v) = value {
                params.push((name, v.clone()));
            }
        };
        text("q", &self.q);
        text("qInTitle", &self.q_in_title);

        let list = |value: &Option<Vec<String>>| value.as_ref().map(|v| v.join(","));
        for (name, value) in [
            ("sources", list(&self.sources)),
            ("domains", list(&self.domains)),
            ("excludeDomains", list(&self.exclude_domains)),
            ("from", self.from.clone()),
            ("to", self.to.clone()),
            ("language", self.language.clone()),
            ("sortBy", self.sort_by.map(|s| s.as_str().to_string())),
            ("pageSize", self.page_size.map(|n| n.to_string())),
            ("page", self.page.map(|n| n.to_string())),
        ] {
            if let Some(v) = value {
                params.push((name, v));
            }
        }
        params
    }
}

/// Error body of a rejected request.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewsApiClient {
    http: Client,
    api_key: String,
}

impl NewsApiClient {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }
}

impl NewsSearch for NewsApiClient {
    #[instrument(level = "info", skip_all, fields(domains = query.domains.as_ref().map_or(0, Vec::len)))]
    async fn everything(&self, query: &EverythingQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let resp = self
            .http
            .get(format!("{NEWSAPI_BASE_URL}/everything"))
            .header("X-Api-Key", &self.api_key)
            .query(&query.to_params())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!(
            %status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "everything() responded"
        );
        decode_response(status, &body)
    }
}

/// Map an HTTP status and body to a search response or a typed error.
pub(crate) fn decode_response(status: reqwest::StatusCode, body: &str) -> Result<SearchResponse> {
    if status.is_server_error() {
        return Err(IngestError::Transient(format!(
            "{status}: {}",
            truncate_for_log(body, 200)
        )));
    }
    if status.is_client_error() {
        let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
        return Err(IngestError::UpstreamApi {
            status: status.as_u16().to_string(),
            code: parsed.code.unwrap_or_else(|| status.as_u16().to_string()),
            message: parsed.message.unwrap_or_else(|| truncate_for_log(body, 500)),
        });
    }

    let response: SearchResponse = serde_json::from_str(body).map_err(|source| {
        error!(%status, error = %source, body = %truncate_for_log(body, 2_000), "Malformed JSON returned");
        IngestError::MalformedResponse {
            source,
            preview: truncate_for_log(body, 200),
        }
    })?;

    if response.status != RESPONSE_OK {
        return Err(IngestError::UpstreamApi {
            status: response.status,
            code: response.code.unwrap_or_default(),
            message: response.message.unwrap_or_default(),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_chunk_query_params() {
        let domains = vec!["apnews.com".to_string(), "bbc.com".to_string()];
        let params = EverythingQuery::for_domains(&domains, 100, "en").to_params();
        assert_eq!(
            params,
            vec![
                ("domains", "apnews.com,bbc.com".to_string()),
                ("language", "en".to_string()),
                ("pageSize", "100".to_string()),
            ]
        );
    }

    #[test]
    fn test_all_params_use_api_names() {
        let query = EverythingQuery {
            q: Some("election".into()),
            q_in_title: Some("senate".into()),
            sources: Some(vec!["bbc-news".into()]),
            exclude_domains: Some(vec!["a.com".into(), "b.com".into()]),
            from: Some("2024-03-01".into()),
            to: Some("2024-03-04".into()),
            sort_by: Some(SortBy::PublishedAt),
            page: Some(2),
            ..Default::default()
        };
        let names = query.to_params().into_iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["q", "qInTitle", "sources", "excludeDomains", "from", "to", "sortBy", "page"]
        );
        assert!(query.to_params().contains(&("excludeDomains", "a.com,b.com".to_string())));
        assert!(query.to_params().contains(&("sortBy", "publishedAt".to_string())));
    }

    #[test]
    fn test_ok_response_decodes() {
        let body = r#"{"status":"ok","totalResults":1,"articles":[{"url":"https://apnews.com/a","publishedAt":"2024-03-04T21:15:00Z"}]}"#;
        let resp = decode_response(StatusCode::OK, body).unwrap();
        assert_eq!(resp.articles.len(), 1);
        assert_eq!(resp.total_results, Some(1));
    }

    #[test]
    fn test_server_error_is_transient() {
        let err = decode_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_client_error_carries_code_and_message() {
        let body = r#"{"status":"error","code":"rateLimited","message":"You have made too many requests."}"#;
        match decode_response(StatusCode::TOO_MANY_REQUESTS, body).unwrap_err() {
            IngestError::UpstreamApi { status, code, message } => {
                assert_eq!(status, "429");
                assert_eq!(code, "rateLimited");
                assert!(message.contains("too many"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_client_error_with_text_body() {
        match decode_response(StatusCode::UNAUTHORIZED, "Unauthorized").unwrap_err() {
            IngestError::UpstreamApi { code, message, .. } => {
                assert_eq!(code, "401");
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_ok_status_is_upstream_error() {
        let body = r#"{"status":"error","code":"parameterInvalid","message":"bad domains"}"#;
        let err = decode_response(StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, IngestError::UpstreamApi { ref code, .. } if code == "parameterInvalid"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_garbage_body_is_malformed() {
        let err = decode_response(StatusCode::OK, "{not json").unwrap_err();
        assert!(matches!(err, IngestError::MalformedResponse { .. }));
    }
}
