//! 新闻分析服务
//!
//! # News Analysis Services
//!
//! Summaries, sentiment, keyword clustering, trend analysis and SEO copy,
//! each wrapped in the same cache → breaker → retry → fallback pipeline.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AiContext`] | Shared LLM client, caches, ledger and breakers |
//! | [`ServiceResponse`] | Result data plus usage/cache/fallback metadata |
//! | [`summary`] | Multi-length article summaries |
//! | [`sentiment`] | Sentiment scores, intensity and aspects |
//! | [`cluster`] | Keyword topic clusters |
//! | [`trend`] | Trending and emerging topics across a news batch |
//! | [`seo`] | Title and meta description suggestions |
//! | [`batch`] | Bounded-concurrency summaries and sentiment |

pub mod batch;
pub mod cluster;
pub mod context;
pub mod language;
pub mod sentiment;
pub mod seo;
pub mod summary;
pub mod trend;

pub use context::{AiContext, AiContextBuilder, AiStatsReport};
pub use language::{
    detect_language, detect_language_from_keywords, detect_language_from_news, Language,
};

use crate::error_code::AiError;
use crate::tokens::TokenUsage;
use serde::{Deserialize, Serialize};

/// Cache, breaker and ledger names of the built-in services.
pub mod names {
    pub const SUMMARY: &str = "summary";
    pub const SENTIMENT: &str = "sentiment";
    pub const KEYWORD_CLUSTER: &str = "keyword-cluster";
    pub const TREND_ANALYSIS: &str = "trend-analysis";
    pub const SEO: &str = "seo";
}

/// What every service call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    pub data: T,
    pub usage: TokenUsage,
    pub cached: bool,
    pub used_fallback: bool,
    pub error: Option<AiError>,
}

/// A keyword extracted upstream, with its corpus statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    #[serde(default)]
    pub frequency: u32,
    #[serde(default)]
    pub tfidf: f64,
}

impl Keyword {
    pub fn new(word: impl Into<String>, frequency: u32, tfidf: f64) -> Self {
        Self {
            word: word.into(),
            frequency,
            tfidf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(alias = "publishDate")]
    pub publish_date: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl NewsItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        publish_date: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: summary.into(),
            publish_date: publish_date.into(),
            region: None,
            source: None,
            link: None,
        }
    }
}

/// First `max` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("新闻分析", 3), "新闻分");
        assert_eq!(truncate_chars("ok", 10), "ok");
    }

    #[test]
    fn test_news_item_accepts_camel_case_date() {
        let item: NewsItem = serde_json::from_str(
            r#"{"id":"n1","title":"Rates cut","publishDate":"2024-05-01"}"#,
        )
        .unwrap();
        assert_eq!(item.publish_date, "2024-05-01");
        assert!(item.summary.is_empty());
    }
}
