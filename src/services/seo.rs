//! SEO title and meta description suggestions.
//!
//! These calls are neither cached nor substituted: a failure reaches the
//! caller as an error.

use super::context::{AiContext, ServiceCall};
use super::{names, Keyword, ServiceResponse};
use crate::resilience::RetryPresets;
use crate::structured::parse_json_object;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TOP_KEYWORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatedCtr {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTitle {
    pub text: String,
    pub reasoning: String,
    pub keywords_used: Vec<String>,
    pub estimated_ctr: EstimatedCtr,
    /// 0..=100, see [`title_score`].
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleSuggestions {
    pub titles: Vec<GeneratedTitle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDescription {
    pub text: String,
    pub keywords_count: u32,
    pub has_cta: bool,
    pub tone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaSuggestions {
    pub descriptions: Vec<MetaDescription>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTitle {
    text: Option<String>,
    title: Option<String>,
    reasoning: Option<String>,
    explanation: Option<String>,
    keywords_used: Vec<String>,
    #[serde(deserialize_with = "crate::structured::lenient")]
    estimated_ctr: EstimatedCtr,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTitles {
    titles: Vec<RawTitle>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMeta {
    text: String,
    keywords_count: u32,
    has_cta: bool,
    tone: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMetas {
    descriptions: Vec<RawMeta>,
}

/// Heuristic title quality score.
///
/// | Rule | Points |
/// |------|--------|
/// | 50-60 characters | 30 |
/// | otherwise 40-69 characters | 20 |
/// | each of the top three keywords present | 25 |
/// | contains a digit | 10 |
///
/// Capped at 100.
pub fn title_score(title: &str, keywords: &[Keyword]) -> u32 {
    if title.is_empty() {
        return 0;
    }
    let len = title.chars().count();
    let mut score = match len {
        50..=60 => 30,
        40..=69 => 20,
        _ => 0,
    };
    let lower = title.to_lowercase();
    score += keywords
        .iter()
        .take(TOP_KEYWORDS)
        .filter(|k| lower.contains(&k.word.to_lowercase()))
        .count() as u32
        * 25;
    if title.chars().any(|c| c.is_ascii_digit()) {
        score += 10;
    }
    score.min(100)
}

fn top_keywords(keywords: &[Keyword]) -> String {
    keywords
        .iter()
        .take(TOP_KEYWORDS)
        .map(|k| k.word.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_titles(raw: &str, keywords: &[Keyword]) -> Result<TitleSuggestions> {
    let parsed: RawTitles = parse_json_object(raw)?;
    let titles = parsed
        .titles
        .into_iter()
        .map(|t| {
            let text = t.text.or(t.title).unwrap_or_default();
            GeneratedTitle {
                score: title_score(&text, keywords),
                text,
                reasoning: t.reasoning.or(t.explanation).unwrap_or_default(),
                keywords_used: t.keywords_used,
                estimated_ctr: t.estimated_ctr,
            }
        })
        .collect();
    Ok(TitleSuggestions { titles })
}

fn parse_meta(raw: &str) -> Result<MetaSuggestions> {
    let parsed: RawMetas = parse_json_object(raw)?;
    Ok(MetaSuggestions {
        descriptions: parsed
            .descriptions
            .into_iter()
            .map(|d| MetaDescription {
                text: d.text,
                keywords_count: d.keywords_count,
                has_cta: d.has_cta,
                tone: d.tone.unwrap_or_else(|| "informative".to_string()),
            })
            .collect(),
    })
}

fn seo_call(
    ctx: &AiContext,
    operation: &'static str,
    system: &str,
    prompt: String,
    temperature: f32,
) -> ServiceCall {
    ServiceCall {
        service: names::SEO,
        operation,
        cache: None,
        cache_params: Value::Null,
        use_cache: false,
        retry: ctx.retry_config(RetryPresets::fast()),
        request: ctx.chat(system, prompt).temperature(temperature).max_tokens(800),
        user_id: None,
    }
}

/// Suggests search-friendly headlines built around the top keywords.
pub async fn generate_titles(
    ctx: &AiContext,
    keywords: &[Keyword],
    summary: &str,
) -> Result<ServiceResponse<TitleSuggestions>> {
    if keywords.is_empty() {
        return Err(Error::validation_with_context(
            "at least one keyword is required",
            ErrorContext::new()
                .with_field_path("keywords")
                .with_source("seo_titles"),
        ));
    }
    let prompt = format!(
        "Write 5 SEO-optimized news headlines of 50-60 characters that feature these keywords: \
         {keywords}.\n\nSummary:\n{summary}\n\n\
         Reply with JSON: {{\"titles\": [{{\"text\": \"...\", \"reasoning\": \"...\", \
         \"keywords_used\": [\"...\"], \"estimated_ctr\": \"high|medium|low\"}}]}}",
        keywords = top_keywords(keywords),
    );
    let call = seo_call(
        ctx,
        "titles",
        "You are an expert SEO specialist. Respond in valid JSON.",
        prompt,
        0.7,
    );
    ctx.run_without_fallback(call, |raw| parse_titles(raw, keywords))
        .await
}

/// Suggests meta descriptions for `content`.
pub async fn generate_meta(
    ctx: &AiContext,
    keywords: &[Keyword],
    content: &str,
) -> Result<ServiceResponse<MetaSuggestions>> {
    let prompt = format!(
        "Write 3 meta descriptions of 150-160 characters for the content below, using these \
         keywords naturally: {keywords}. End at least one with a call to action.\n\n\
         Content:\n{content}\n\n\
         Reply with JSON: {{\"descriptions\": [{{\"text\": \"...\", \"keywords_count\": 2, \
         \"has_cta\": true, \"tone\": \"informative\"}}]}}",
        keywords = top_keywords(keywords),
    );
    let call = seo_call(
        ctx,
        "meta",
        "You are an expert SEO copywriter. Respond in valid JSON.",
        prompt,
        0.6,
    );
    ctx.run_without_fallback(call, parse_meta).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::context::testing::{context, ScriptedLlm};
    use std::sync::Arc;

    fn kws() -> Vec<Keyword> {
        vec![
            Keyword::new("Bitcoin", 10, 0.9),
            Keyword::new("ETF", 5, 0.6),
            Keyword::new("halving", 3, 0.4),
            Keyword::new("miners", 2, 0.3),
        ]
    }

    #[test]
    fn test_title_score_rules() {
        // 55 chars, two keywords, one digit
        let title = "Bitcoin ETF inflows hit 3 week high as traders pile in!";
        assert_eq!(title.chars().count(), 55);
        assert_eq!(title_score(title, &kws()), 30 + 50 + 10);

        // 45 chars, no keywords, no digit
        let medium = "A quiet session on the markets ends the week.";
        assert_eq!(medium.chars().count(), 45);
        assert_eq!(title_score(medium, &kws()), 20);

        assert_eq!(title_score("", &kws()), 0);
        // only the top three keywords count
        assert_eq!(title_score("miners", &kws()), 0);
    }

    #[test]
    fn test_title_score_caps_at_100() {
        let title = "Bitcoin ETF halving 2024: what the 4 year cycle means now";
        assert!((50..=60).contains(&title.chars().count()));
        assert_eq!(title_score(title, &kws()), 100);
    }

    #[test]
    fn test_parse_titles_aliases() {
        let raw = r#"{"titles":[{"title":"Bitcoin rallies","explanation":"short","estimated_ctr":"viral"}]}"#;
        let t = &parse_titles(raw, &kws()).unwrap().titles[0];
        assert_eq!(t.text, "Bitcoin rallies");
        assert_eq!(t.reasoning, "short");
        assert_eq!(t.estimated_ctr, EstimatedCtr::Medium);
        assert_eq!(t.score, 25);
    }

    #[test]
    fn test_parse_meta_defaults() {
        let m = parse_meta(r#"{"descriptions":[{"text":"Read more"}]}"#).unwrap();
        assert_eq!(m.descriptions[0].tone, "informative");
        assert!(!m.descriptions[0].has_cta);
    }

    #[tokio::test]
    async fn test_titles_require_keywords() {
        let llm = Arc::new(ScriptedLlm::replying("{}"));
        let (ctx, _) = context(llm.clone());
        let err = generate_titles(&ctx, &[], "summary").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_titles_errors_propagate() {
        let llm = Arc::new(ScriptedLlm::failing(503, "unavailable"));
        let (ctx, _) = context(llm.clone());
        let err = generate_titles(&ctx, &kws(), "summary").await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(llm.calls(), 2, "fast preset makes two attempts");
        assert_eq!(ctx.tracker().stats(&crate::usage::StatsFilter::new()).failed_calls, 1);
    }

    #[tokio::test]
    async fn test_meta_request_shape() {
        let llm = Arc::new(ScriptedLlm::replying(
            r#"{"descriptions":[{"text":"Bitcoin ETF flows explained. Read more.","has_cta":true}]}"#,
        ));
        let (ctx, _) = context(llm.clone());
        let r = generate_meta(&ctx, &kws(), "Bitcoin ETF inflows").await.unwrap();
        assert!(r.data.descriptions[0].has_cta);
        assert!(!r.cached);
        let req = llm.requests.lock().unwrap()[0].clone();
        assert_eq!(req.temperature, 0.6);
        assert_eq!(req.max_tokens, 800);
        assert!(req.messages[1].content.contains("Bitcoin, ETF, halving"));
    }
}
