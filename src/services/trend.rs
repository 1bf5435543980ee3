//! Trending and emerging topics across a batch of news items.

use super::context::{AiContext, ServiceCall};
use super::sentiment::Sentiment;
use super::{detect_language_from_news, names, truncate_chars, Language, NewsItem, ServiceResponse};
use crate::cache::{CacheConfig, EvictionStrategy};
use crate::resilience::RetryPresets;
use crate::structured::{lenient, parse_json_object};
use crate::tokens::round_to;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

const SYSTEM_PROMPT: &str =
    "You are an expert trend analyst and data scientist. Respond in valid JSON.";
const MIN_ITEMS: usize = 3;
const MAX_ITEMS: usize = 100;
const FALLBACK_TOPICS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPrediction {
    Rising,
    #[default]
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPotential {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendVelocity {
    Fast,
    #[default]
    Moderate,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicLink {
    Causes,
    #[default]
    RelatedTo,
    Opposes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    #[default]
    Week,
    Month,
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeRange::Day => "day",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendingTopic {
    pub id: String,
    pub topic: String,
    pub topic_en: String,
    pub description: String,
    #[serde(deserialize_with = "lenient")]
    pub prediction: TrendPrediction,
    pub growth_rate: f64,
    pub confidence: f64,
    pub related_news_count: u32,
    pub first_seen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_date: Option<String>,
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub sentiment: Sentiment,
    pub impact_score: f64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergingTopic {
    pub topic: String,
    pub first_appeared: String,
    pub initial_mentions: u32,
    #[serde(deserialize_with = "lenient")]
    pub potential: TrendPotential,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendInsights {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub risk_alerts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConnection {
    pub from: String,
    pub to: String,
    #[serde(deserialize_with = "lenient")]
    pub relationship: TopicLink,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicNetwork {
    pub connections: Vec<TopicConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeAnalysis {
    pub current_period: String,
    pub most_active_day: String,
    #[serde(deserialize_with = "lenient")]
    pub trend_velocity: TrendVelocity,
}

impl Default for TimeAnalysis {
    fn default() -> Self {
        Self {
            current_period: "N/A".to_string(),
            most_active_day: "N/A".to_string(),
            trend_velocity: TrendVelocity::Moderate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendAnalysisResult {
    pub trending_topics: Vec<TrendingTopic>,
    pub emerging_topics: Vec<EmergingTopic>,
    pub insights: TrendInsights,
    pub topic_network: TopicNetwork,
    pub time_analysis: TimeAnalysis,
}

#[derive(Debug, Clone)]
pub struct TrendOptions {
    pub time_range: TimeRange,
    /// `"all"` when unset.
    pub focus_area: Option<String>,
    pub language: Option<Language>,
    pub use_cache: bool,
    pub user_id: Option<String>,
}

impl Default for TrendOptions {
    fn default() -> Self {
        Self {
            time_range: TimeRange::Week,
            focus_area: None,
            language: None,
            use_cache: true,
            user_id: None,
        }
    }
}

/// 1h TTL, 100 entries, LRU.
pub fn cache_config() -> CacheConfig {
    CacheConfig::new(Duration::from_secs(3600), 100, EvictionStrategy::Lru)
}

fn parse_trends(raw: &str) -> Result<TrendAnalysisResult> {
    let mut parsed: TrendAnalysisResult = parse_json_object(raw)?;
    for (i, t) in parsed.trending_topics.iter_mut().enumerate() {
        if t.id.is_empty() {
            t.id = format!("topic_{}", i + 1);
        }
        if t.topic_en.is_empty() {
            t.topic_en = t.topic.clone();
        }
    }
    Ok(parsed)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Most frequent title words longer than three characters, ties in order of
/// first appearance.
fn top_title_words(items: &[NewsItem], limit: usize) -> Vec<(String, u32)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u32> = HashMap::new();
    for item in items {
        for word in item.title.to_lowercase().split_whitespace() {
            if word.chars().count() <= 3 {
                continue;
            }
            let count = counts.entry(word.to_string()).or_insert_with(|| {
                order.push(word.to_string());
                0
            });
            *count += 1;
        }
    }
    let mut ranked: Vec<(String, u32)> = order
        .into_iter()
        .map(|w| {
            let c = counts.get(&w).copied().unwrap_or(0);
            (w, c)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked
}

/// Title word frequency analysis. `today` stands in for a missing publish date.
pub fn fallback_trends(items: &[NewsItem], today: &str) -> TrendAnalysisResult {
    let first_date = items
        .first()
        .map(|i| i.publish_date.as_str())
        .filter(|d| !d.is_empty())
        .unwrap_or(today)
        .to_string();
    let total = items.len().max(1) as f64;

    let trending_topics: Vec<TrendingTopic> = top_title_words(items, FALLBACK_TOPICS)
        .into_iter()
        .enumerate()
        .map(|(i, (word, count))| TrendingTopic {
            id: format!("topic_{}", i + 1),
            topic: capitalize(&word),
            topic_en: capitalize(&word),
            description: format!("Topic based on keyword: {}", word),
            prediction: TrendPrediction::Stable,
            growth_rate: 0.0,
            confidence: 0.5,
            related_news_count: count,
            first_seen: first_date.clone(),
            peak_date: None,
            keywords: vec![word],
            sentiment: Sentiment::Neutral,
            impact_score: count as f64 / total,
            category: "general".to_string(),
        })
        .collect();

    TrendAnalysisResult {
        insights: TrendInsights {
            summary: "Trend analysis using rule-based fallback method".to_string(),
            key_findings: vec![
                format!("Analyzed {} news articles", items.len()),
                format!("Found {} topics", trending_topics.len()),
            ],
            recommendations: vec!["Collect more data for better analysis".to_string()],
            risk_alerts: Vec::new(),
        },
        trending_topics,
        emerging_topics: Vec::new(),
        topic_network: TopicNetwork::default(),
        time_analysis: TimeAnalysis {
            current_period: "N/A".to_string(),
            most_active_day: first_date,
            trend_velocity: TrendVelocity::Moderate,
        },
    }
}

fn build_prompt(items: &[NewsItem], options: &TrendOptions, focus: &str, language: Language) -> String {
    let shown = if items.len() > 20 { 15 } else { items.len() };
    let listing = items
        .iter()
        .take(shown)
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{}. [{}] {} - {}",
                i + 1,
                item.publish_date,
                item.title,
                truncate_chars(&item.summary, 80)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Identify trending and emerging topics in these news items.\n\
         Time range: {time_range}\nFocus area: {focus}\nLanguage: {language}\n\n{listing}\n\n\
         Reply with JSON: {{\"trending_topics\": [{{\"id\": \"topic_1\", \"topic\": \"...\", \
         \"topic_en\": \"...\", \"description\": \"...\", \"prediction\": \"rising|stable|declining\", \
         \"growth_rate\": 0.2, \"confidence\": 0.8, \"related_news_count\": 3, \
         \"first_seen\": \"YYYY-MM-DD\", \"keywords\": [\"...\"], \
         \"sentiment\": \"positive|neutral|negative\", \"impact_score\": 0.7, \"category\": \"...\"}}], \
         \"emerging_topics\": [{{\"topic\": \"...\", \"first_appeared\": \"YYYY-MM-DD\", \
         \"initial_mentions\": 1, \"potential\": \"high|medium|low\", \"reasoning\": \"...\"}}], \
         \"insights\": {{\"summary\": \"...\", \"key_findings\": [], \"recommendations\": [], \
         \"risk_alerts\": []}}, \"topic_network\": {{\"connections\": [{{\"from\": \"...\", \
         \"to\": \"...\", \"relationship\": \"causes|related_to|opposes\", \"strength\": 0.5}}]}}, \
         \"time_analysis\": {{\"current_period\": \"...\", \"most_active_day\": \"YYYY-MM-DD\", \
         \"trend_velocity\": \"fast|moderate|slow\"}}}}",
        time_range = options.time_range,
    )
}

pub async fn analyze_trends(
    ctx: &AiContext,
    items: &[NewsItem],
    options: TrendOptions,
) -> Result<ServiceResponse<TrendAnalysisResult>> {
    if !(MIN_ITEMS..=MAX_ITEMS).contains(&items.len()) {
        let message = if items.is_empty() {
            "news items must not be empty".to_string()
        } else {
            format!(
                "trend analysis needs between {} and {} news items",
                MIN_ITEMS, MAX_ITEMS
            )
        };
        return Err(Error::validation_with_context(
            message,
            ErrorContext::new()
                .with_field_path("news_items")
                .with_details(format!("got {}", items.len()))
                .with_source("trend_analysis"),
        ));
    }

    let focus = options.focus_area.clone().unwrap_or_else(|| "all".to_string());
    let language = options.language.unwrap_or_else(|| {
        detect_language_from_news(items.iter().map(|i| (i.title.as_str(), i.summary.as_str())))
    });
    let news_ids = items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>().join(",");

    let call = ServiceCall {
        service: names::TREND_ANALYSIS,
        operation: "analyze",
        cache: Some(cache_config()),
        cache_params: json!({
            "news_ids": news_ids,
            "time_range": options.time_range,
            "focus_area": focus,
            "language": language,
        }),
        use_cache: options.use_cache,
        retry: ctx.retry_config(RetryPresets::trend()),
        request: ctx
            .chat(SYSTEM_PROMPT, build_prompt(items, &options, &focus, language))
            .temperature(0.7)
            .max_tokens(1500),
        user_id: options.user_id.clone(),
    };

    let today = ctx.clock().now().format("%Y-%m-%d").to_string();
    ctx.run(call, parse_trends, || fallback_trends(items, &today))
        .await
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendStats {
    pub total_topics: usize,
    pub rising_topics: usize,
    pub declining_topics: usize,
    pub emerging_topics: usize,
    /// 3 decimals
    pub average_growth_rate: f64,
    /// Topics with `impact_score > 0.7`.
    pub high_impact_topics: usize,
}

pub fn trend_stats(result: &TrendAnalysisResult) -> TrendStats {
    let trending = &result.trending_topics;
    let count = |p: TrendPrediction| trending.iter().filter(|t| t.prediction == p).count();
    let growth: f64 = trending.iter().map(|t| t.growth_rate).sum();
    TrendStats {
        total_topics: trending.len(),
        rising_topics: count(TrendPrediction::Rising),
        declining_topics: count(TrendPrediction::Declining),
        emerging_topics: result.emerging_topics.len(),
        average_growth_rate: round_to(growth / trending.len().max(1) as f64, 3),
        high_impact_topics: trending.iter().filter(|t| t.impact_score > 0.7).count(),
    }
}
