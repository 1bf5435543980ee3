//! Bounded-concurrency batch helpers.

use super::context::AiContext;
use super::sentiment::{analyze_sentiment, SentimentOptions, SentimentResult};
use super::summary::{summarize, SummaryOptions, SummaryResult};
use super::{Language, ServiceResponse};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// At most this many items are in flight at once.
pub const BATCH_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub language: Option<Language>,
}

impl BatchItem {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            language: None,
        }
    }
}

/// Summaries keyed by item id. Items that fail are logged and left out.
pub async fn summarize_many(
    ctx: &AiContext,
    items: &[BatchItem],
) -> HashMap<String, ServiceResponse<SummaryResult>> {
    stream::iter(items)
        .map(|item| async move {
            let options = SummaryOptions {
                language: item.language,
                ..SummaryOptions::default()
            };
            (item.id.as_str(), summarize(ctx, &item.content, options).await)
        })
        .buffer_unordered(BATCH_CONCURRENCY)
        .filter_map(|(id, result)| async move {
            match result {
                Ok(r) => Some((id.to_string(), r)),
                Err(e) => {
                    warn!(id, error = %e, "batch summary failed");
                    None
                }
            }
        })
        .collect()
        .await
}

/// Sentiment keyed by item id. Items that fail are logged and left out.
pub async fn analyze_sentiment_many(
    ctx: &AiContext,
    items: &[BatchItem],
) -> HashMap<String, ServiceResponse<SentimentResult>> {
    stream::iter(items)
        .map(|item| async move {
            let options = SentimentOptions {
                language: item.language,
                ..SentimentOptions::default()
            };
            (item.id.as_str(), analyze_sentiment(ctx, &item.content, options).await)
        })
        .buffer_unordered(BATCH_CONCURRENCY)
        .filter_map(|(id, result)| async move {
            match result {
                Ok(r) => Some((id.to_string(), r)),
                Err(e) => {
                    warn!(id, error = %e, "batch sentiment failed");
                    None
                }
            }
        })
        .collect()
        .await
}
