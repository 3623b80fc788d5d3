//! Data models for upstream articles and their normalized representations.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`RawArticle`]: an article as returned by the news-search API, loosely typed
//! - [`SearchResponse`]: the `/v2/everything` response envelope
//! - [`Article`]: the normalized record persisted into a bucket
//! - [`Bucket`]: the fixed set of political-leaning lists
//!
//! Upstream fields use camelCase, hence the `#[serde(rename)]` attributes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix shared by every bucket list key in the store.
pub const RESULTS_KEY_PREFIX: &str = "parser:results";

/// One of the political-leaning buckets an article can be filed under.
///
/// A domain may map to zero, one or several buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Left,
    Center,
    Right,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Left, Bucket::Center, Bucket::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Left => "left",
            Bucket::Center => "center",
            Bucket::Right => "right",
        }
    }

    /// Store key of this bucket's ordered list, e.g. `parser:results:left`.
    pub fn list_key(&self) -> String {
        format!("{}:{}", RESULTS_KEY_PREFIX, self.as_str())
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Bucket::Left),
            "center" => Ok(Bucket::Center),
            "right" => Ok(Bucket::Right),
            other => Err(format!("unknown bucket `{other}` (expected left, center or right)")),
        }
    }
}

/// The `source` object attached to every upstream article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// An article exactly as the news-search API returned it.
///
/// Every field is optional: the API omits or nulls fields freely, and the
/// classifier owns all fallback rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    #[serde(default)]
    pub source: Option<RawSource>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Missing URLs deserialize to an empty string and fail the domain check.
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "urlToImage")]
    pub url_to_image: Option<String>,
    #[serde(default, rename = "publishedAt")]
    pub published_at: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Envelope of a `/v2/everything` response.
///
/// Successful responses carry `articles`; errors carry `code` and `message`.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub status: String,
    #[serde(default, rename = "totalResults")]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub articles: Vec<RawArticle>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A normalized article, immutable once created.
///
/// This is the record shape stored in every bucket list and served to the
/// read side. `domain` is only needed for bucket assignment and is never
/// serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(rename = "uuid")]
    pub id: Uuid,
    /// Upstream source name, e.g. "The New York Times".
    #[serde(default)]
    pub source: Option<String>,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub amp_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Display timestamp, e.g. "March 04, 2024 09:15 PM".
    pub published_at: String,
    pub content: String,
    #[serde(skip)]
    pub domain: String,
    pub subscription: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_keys() {
        assert_eq!(Bucket::Left.list_key(), "parser:results:left");
        assert_eq!(Bucket::Center.list_key(), "parser:results:center");
        assert_eq!(Bucket::Right.list_key(), "parser:results:right");
    }

    #[test]
    fn test_bucket_from_str() {
        assert_eq!("Left".parse::<Bucket>(), Ok(Bucket::Left));
        assert_eq!("center".parse::<Bucket>(), Ok(Bucket::Center));
        assert!("middle".parse::<Bucket>().is_err());
    }

    #[test]
    fn test_raw_article_tolerates_nulls_and_missing_fields() {
        let json = r#"{
            "source": {"id": null, "name": "Reuters"},
            "author": null,
            "title": "Markets rally",
            "url": "https://www.reuters.com/markets/rally",
            "urlToImage": null,
            "publishedAt": "2024-03-04T21:15:00Z"
        }"#;

        let article: RawArticle = serde_json::from_str(json).unwrap();
        assert_eq!(article.title.as_deref(), Some("Markets rally"));
        assert_eq!(article.source.unwrap().name.as_deref(), Some("Reuters"));
        assert!(article.description.is_none());
        assert!(article.content.is_none());
    }

    #[test]
    fn test_search_response_error_envelope() {
        let json = r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;
        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, "error");
        assert_eq!(resp.code.as_deref(), Some("apiKeyInvalid"));
        assert!(resp.articles.is_empty());
    }

    #[test]
    fn test_article_serialization_omits_domain() {
        let article = Article {
            id: Uuid::new_v4(),
            source: Some("NPR".to_string()),
            title: "Title".to_string(),
            author: None,
            description: "Description".to_string(),
            url: "https://www.npr.org/story".to_string(),
            amp_url: None,
            image_url: None,
            published_at: "March 04, 2024 09:15 PM".to_string(),
            content: "Content".to_string(),
            domain: "npr.org".to_string(),
            subscription: false,
        };

        let json = serde_json::to_string(&article).unwrap();
        assert!(json.contains("\"uuid\""));
        assert!(!json.contains("domain"));

        let back: Article = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, article.url);
        assert!(back.domain.is_empty());
    }
}
