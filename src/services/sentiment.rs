//! Sentiment polarity, intensity and per-aspect scores.

use super::context::{AiContext, ServiceCall};
use super::{detect_language, names, truncate_chars, Language, ServiceResponse};
use crate::cache::{CacheConfig, EvictionStrategy};
use crate::resilience::RetryPresets;
use crate::structured::{lenient, parse_json_object};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const SYSTEM_PROMPT: &str =
    "You are an expert sentiment analysis assistant. Respond in valid JSON.";

const POSITIVE_KEYWORDS: &[&str] = &[
    "good", "great", "excellent", "success", "win", "gain", "improve", "growth", "positive",
    "好", "优秀", "成功", "增长", "提升", "积极",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "bad", "poor", "fail", "loss", "decline", "crisis", "problem", "negative",
    "坏", "差", "失败", "下降", "危机", "问题", "消极",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    /// Lenient label parsing; anything unrecognized is neutral.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Strong,
    #[default]
    Moderate,
    Mild,
}

impl Intensity {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "strong" => Intensity::Strong,
            "mild" => Intensity::Mild,
            _ => Intensity::Moderate,
        }
    }

    fn from_difference(diff: usize) -> Self {
        match diff {
            d if d >= 3 => Intensity::Strong,
            2 => Intensity::Moderate,
            _ => Intensity::Mild,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScores {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl Default for SentimentScores {
    fn default() -> Self {
        Self {
            positive: 0.33,
            neutral: 0.34,
            negative: 0.33,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectSentiment {
    pub aspect: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub scores: SentimentScores,
    pub keywords: Vec<String>,
    pub reasoning: String,
    pub intensity: Intensity,
    pub aspects: Vec<AspectSentiment>,
}

#[derive(Debug, Clone)]
pub struct SentimentOptions {
    pub language: Option<Language>,
    pub use_cache: bool,
    pub user_id: Option<String>,
}

impl Default for SentimentOptions {
    fn default() -> Self {
        Self {
            language: None,
            use_cache: true,
            user_id: None,
        }
    }
}

/// 6h TTL, 500 entries, LRU.
pub fn cache_config() -> CacheConfig {
    CacheConfig::new(Duration::from_secs(6 * 3600), 500, EvictionStrategy::Lru)
}

#[derive(Deserialize)]
#[serde(default)]
struct RawAspect {
    #[serde(deserialize_with = "lenient")]
    aspect: String,
    #[serde(deserialize_with = "lenient")]
    sentiment: String,
    confidence: f64,
}

impl Default for RawAspect {
    fn default() -> Self {
        Self {
            aspect: String::new(),
            sentiment: String::new(),
            confidence: 0.5,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSentiment {
    #[serde(deserialize_with = "lenient")]
    sentiment: String,
    confidence: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    scores: Option<SentimentScores>,
    #[serde(deserialize_with = "lenient")]
    keywords: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    reasoning: String,
    #[serde(deserialize_with = "lenient")]
    intensity: String,
    #[serde(deserialize_with = "lenient")]
    aspects: Vec<RawAspect>,
}

fn parse_sentiment(raw: &str) -> Result<SentimentResult> {
    let parsed: RawSentiment = parse_json_object(raw)?;
    Ok(SentimentResult {
        sentiment: Sentiment::from_label(&parsed.sentiment),
        confidence: parsed.confidence.filter(|c| *c > 0.0).unwrap_or(0.5),
        scores: parsed.scores.unwrap_or_default(),
        keywords: parsed.keywords,
        reasoning: parsed.reasoning,
        intensity: Intensity::from_label(&parsed.intensity),
        aspects: parsed
            .aspects
            .into_iter()
            .map(|a| AspectSentiment {
                sentiment: Sentiment::from_label(&a.sentiment),
                aspect: a.aspect,
                confidence: a.confidence,
            })
            .collect(),
    })
}

fn build_prompt(content: &str, language: Language) -> String {
    format!(
        "Analyze the sentiment of the content below. News reporting is usually neutral, so \
         separate factual statements from opinion and watch for irony.\n\
         Language: {language}\n\nContent:\n{content}\n\n\
         Reply with JSON: {{\"sentiment\": \"positive|neutral|negative\", \"confidence\": 0.85, \
         \"scores\": {{\"positive\": 0.15, \"neutral\": 0.70, \"negative\": 0.15}}, \
         \"keywords\": [\"...\"], \"reasoning\": \"...\", \"intensity\": \"strong|moderate|mild\", \
         \"aspects\": [{{\"aspect\": \"...\", \"sentiment\": \"positive|neutral|negative\", \
         \"confidence\": 0.8}}]}}",
        language = language,
        content = truncate_chars(content, 2000),
    )
}

/// Keyword counting over a fixed English/Chinese lexicon.
pub fn fallback_sentiment(content: &str) -> SentimentResult {
    let text = content.to_lowercase();
    let positive = POSITIVE_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
    let negative = NEGATIVE_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
    let diff = positive.abs_diff(negative);

    let (sentiment, intensity) = match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => (Sentiment::Positive, Intensity::from_difference(diff)),
        std::cmp::Ordering::Less => (Sentiment::Negative, Intensity::from_difference(diff)),
        std::cmp::Ordering::Equal => (Sentiment::Neutral, Intensity::Mild),
    };

    let total = (positive + negative + 1) as f64;
    SentimentResult {
        sentiment,
        confidence: ((diff as f64 + 1.0) / (total + 1.0)).min(0.9),
        scores: SentimentScores {
            positive: positive as f64 / total,
            neutral: 1.0 / total,
            negative: negative as f64 / total,
        },
        keywords: Vec::new(),
        reasoning: "Sentiment analyzed using rule-based fallback method".to_string(),
        intensity,
        aspects: Vec::new(),
    }
}

pub async fn analyze_sentiment(
    ctx: &AiContext,
    content: &str,
    options: SentimentOptions,
) -> Result<ServiceResponse<SentimentResult>> {
    if content.trim().is_empty() {
        return Err(Error::validation_with_context(
            "content must not be empty",
            ErrorContext::new()
                .with_field_path("content")
                .with_source("sentiment"),
        ));
    }
    let language = options.language.unwrap_or_else(|| detect_language(content));

    let call = ServiceCall {
        service: names::SENTIMENT,
        operation: "analyze",
        cache: Some(cache_config()),
        cache_params: json!({ "content": content, "language": language }),
        use_cache: options.use_cache,
        retry: ctx.retry_config(RetryPresets::standard()),
        request: ctx
            .chat(SYSTEM_PROMPT, build_prompt(content, language))
            .temperature(0.3)
            .max_tokens(800),
        user_id: options.user_id,
    };

    ctx.run(call, parse_sentiment, || fallback_sentiment(content))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::context::testing::{context, ScriptedLlm};
    use std::sync::Arc;

    #[test]
    fn test_fallback_strong_positive() {
        let r = fallback_sentiment("Great quarter: excellent growth and a big win");
        assert_eq!(r.sentiment, Sentiment::Positive);
        assert_eq!(r.intensity, Intensity::Strong);
        // 4 positive, 0 negative: total = 5
        assert!((r.scores.positive - 0.8).abs() < 1e-9);
        assert!((r.scores.neutral - 0.2).abs() < 1e-9);
        assert!((r.confidence - 5.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_mild_negative_and_chinese() {
        let r = fallback_sentiment("市场出现危机");
        assert_eq!(r.sentiment, Sentiment::Negative);
        assert_eq!(r.intensity, Intensity::Mild);
        assert!((r.scores.negative - 0.5).abs() < 1e-9);
        assert!((r.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_neutral_when_balanced() {
        let r = fallback_sentiment("A good start, then a bad finish");
        assert_eq!(r.sentiment, Sentiment::Neutral);
        assert_eq!(r.intensity, Intensity::Mild);
        assert!((r.confidence - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_capped() {
        let r = fallback_sentiment("good great excellent success win gain improve growth positive");
        assert_eq!(r.confidence, 0.9);
    }

    #[test]
    fn test_parse_defaults() {
        let r = parse_sentiment(r#"{"sentiment": "Positive", "aspects": [{"aspect": "rates"}]}"#)
            .unwrap();
        assert_eq!(r.sentiment, Sentiment::Positive);
        assert_eq!(r.confidence, 0.5);
        assert_eq!(r.scores, SentimentScores::default());
        assert_eq!(r.intensity, Intensity::Moderate);
        assert_eq!(r.aspects[0].sentiment, Sentiment::Neutral);
    }

    #[test]
    fn test_parse_tolerates_null_fields() {
        let r = parse_sentiment(
            r#"{"sentiment": null, "confidence": 0.8, "keywords": null,
                "reasoning": null, "intensity": 3, "scores": "n/a"}"#,
        )
        .unwrap();
        assert_eq!(r.sentiment, Sentiment::Neutral);
        assert_eq!(r.confidence, 0.8);
        assert!(r.keywords.is_empty());
        assert_eq!(r.intensity, Intensity::Moderate);
        assert_eq!(r.scores, SentimentScores::default());
    }

    #[tokio::test]
    async fn test_analyze_request_shape_and_cache() {
        let llm = Arc::new(ScriptedLlm::replying(
            r#"{"sentiment":"negative","confidence":0.8,"intensity":"strong"}"#,
        ));
        let (ctx, _) = context(llm.clone());
        let r = analyze_sentiment(&ctx, "Stocks plunge", SentimentOptions::default())
            .await
            .unwrap();
        assert_eq!(r.data.sentiment, Sentiment::Negative);
        let req = llm.requests.lock().unwrap()[0].clone();
        assert_eq!(req.temperature, 0.3);
        assert_eq!(req.max_tokens, 800);

        let cache = ctx.caches().get(names::SENTIMENT).unwrap();
        assert_eq!(cache.config().max_entries, 500);
        assert_eq!(cache.len(), 1);
    }
}
