//! Short/medium/long article summaries.

use super::context::{AiContext, ServiceCall};
use super::{detect_language, names, truncate_chars, Language, ServiceResponse};
use crate::cache::CachePresets;
use crate::resilience::RetryPresets;
use crate::structured::parse_json_object;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

const SYSTEM_PROMPT: &str =
    "You are an expert content summarization assistant. Respond in valid JSON.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    Medium,
    Long,
}

impl SummaryLength {
    pub const ALL: [SummaryLength; 3] = [Self::Short, Self::Medium, Self::Long];

    /// Sentence count and character cap of the rule-based summary.
    fn fallback_shape(&self) -> (usize, usize) {
        match self {
            SummaryLength::Short => (1, 80),
            SummaryLength::Medium => (3, 200),
            SummaryLength::Long => (7, 400),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "type")]
    pub kind: SummaryLength,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub char_count: usize,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summaries: Vec<Summary>,
    pub main_topic: String,
    pub entities: Vec<String>,
    pub language: Language,
}

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    /// Detected from the content when unset.
    pub language: Option<Language>,
    /// All three lengths when unset.
    pub lengths: Option<Vec<SummaryLength>>,
    pub use_cache: bool,
    pub user_id: Option<String>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            language: None,
            lengths: None,
            use_cache: true,
            user_id: None,
        }
    }
}

#[derive(Deserialize)]
struct RawSummaryResult {
    #[serde(default)]
    summaries: Vec<Summary>,
    #[serde(default)]
    main_topic: String,
    #[serde(default)]
    entities: Vec<String>,
    language: Option<Language>,
}

fn build_prompt(content: &str, language: Language) -> String {
    format!(
        "Summarize the news content below at three lengths:\n\
         - short: 50-80 characters, the core point\n\
         - medium: 150-200 characters, main facts and context\n\
         - long: 300-400 characters, a full overview with details\n\
         Stay faithful to the text and keep dates and figures. Write in language \"{language}\".\n\n\
         Content:\n{content}\n\n\
         Reply with JSON: {{\"summaries\": [{{\"type\": \"short|medium|long\", \"text\": \"...\", \
         \"char_count\": 0, \"key_points\": [\"...\"]}}], \"main_topic\": \"...\", \
         \"entities\": [\"...\"], \"language\": \"en|zh\"}}",
        language = language,
        content = truncate_chars(content, 2000),
    )
}

fn parse_summary(raw: &str, lengths: &[SummaryLength], language: Language) -> Result<SummaryResult> {
    let parsed: RawSummaryResult = parse_json_object(raw)?;
    let summaries: Vec<Summary> = parsed
        .summaries
        .into_iter()
        .filter(|s| lengths.contains(&s.kind))
        .map(|mut s| {
            if s.char_count == 0 {
                s.char_count = s.text.chars().count();
            }
            s
        })
        .collect();
    if summaries.is_empty() {
        return Err(Error::parse("model returned none of the requested summary lengths"));
    }
    Ok(SummaryResult {
        summaries,
        main_topic: parsed.main_topic,
        entities: parsed.entities,
        language: parsed.language.unwrap_or(language),
    })
}

fn sentences(content: &str) -> Vec<&str> {
    content
        .split(|c| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'))
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Rule-based summaries built from the leading sentences.
pub fn fallback_summaries(content: &str, lengths: &[SummaryLength]) -> Vec<Summary> {
    let sentences = sentences(content);
    lengths
        .iter()
        .map(|&kind| {
            let (count, cap) = kind.fallback_shape();
            let text = if kind == SummaryLength::Short {
                match sentences.first() {
                    Some(first) => truncate_chars(first.trim(), cap).to_string(),
                    None => truncate_chars(content, cap).to_string(),
                }
            } else {
                let joined = sentences
                    .iter()
                    .take(count)
                    .copied()
                    .collect::<Vec<_>>()
                    .join(". ");
                truncate_chars(joined.trim(), cap).to_string()
            };
            Summary {
                kind,
                char_count: text.chars().count(),
                text,
                key_points: Vec::new(),
            }
        })
        .collect()
}

/// Summarizes `content` at the requested lengths.
pub async fn summarize(
    ctx: &AiContext,
    content: &str,
    options: SummaryOptions,
) -> Result<ServiceResponse<SummaryResult>> {
    if content.trim().is_empty() {
        return Err(Error::validation_with_context(
            "content must not be empty",
            ErrorContext::new()
                .with_field_path("content")
                .with_source("summary"),
        ));
    }

    let language = options.language.unwrap_or_else(|| detect_language(content));
    let lengths = options
        .lengths
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| SummaryLength::ALL.to_vec());

    let call = ServiceCall {
        service: names::SUMMARY,
        operation: "generate",
        cache: Some(CachePresets::standard()),
        cache_params: json!({ "content": content, "language": language, "lengths": lengths }),
        use_cache: options.use_cache,
        retry: ctx.retry_config(RetryPresets::standard()),
        request: ctx
            .chat(SYSTEM_PROMPT, build_prompt(content, language))
            .temperature(0.5)
            .max_tokens(1200),
        user_id: options.user_id,
    };

    let lengths_ref = &lengths;
    ctx.run(
        call,
        |raw| parse_summary(raw, lengths_ref, language),
        || SummaryResult {
            summaries: fallback_summaries(content, lengths_ref),
            main_topic: "Summary generated using fallback method".to_string(),
            entities: Vec::new(),
            language,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_code::AiErrorKind;
    use crate::services::context::testing::{context, ScriptedLlm};
    use std::sync::Arc;

    const ARTICLE: &str = "Central bank cuts rates. Markets rallied on the news! \
        Bond yields fell sharply? Analysts expect more cuts. Housing stocks jumped. \
        The dollar weakened. Gold hit a record. Oil was flat.";

    #[test]
    fn test_fallback_lengths() {
        let s = fallback_summaries(ARTICLE, &SummaryLength::ALL);
        assert_eq!(s[0].text, "Central bank cuts rates");
        assert_eq!(
            s[1].text,
            "Central bank cuts rates.  Markets rallied on the news.  Bond yields fell sharply"
        );
        assert!(s[2].text.chars().count() <= 400);
        assert!(s[2].text.contains("Gold hit a record"));
        assert!(!s[2].text.contains("Oil"));
        assert_eq!(s[0].char_count, s[0].text.chars().count());
    }

    #[test]
    fn test_fallback_caps_characters() {
        let long = "x".repeat(500);
        let s = fallback_summaries(&long, &[SummaryLength::Short, SummaryLength::Medium]);
        assert_eq!(s[0].char_count, 80);
        assert_eq!(s[1].char_count, 200);
    }

    #[test]
    fn test_fallback_chinese_punctuation() {
        let s = fallback_summaries("央行宣布降息。市场大涨！", &[SummaryLength::Short]);
        assert_eq!(s[0].text, "央行宣布降息");
    }

    #[test]
    fn test_parse_filters_requested_lengths() {
        let raw = r#"{"summaries":[{"type":"short","text":"Rates cut"},
            {"type":"long","text":"Long text","char_count":9}],
            "main_topic":"rates","entities":["Fed"]}"#;
        let r = parse_summary(raw, &[SummaryLength::Short], Language::En).unwrap();
        assert_eq!(r.summaries.len(), 1);
        assert_eq!(r.summaries[0].char_count, 9);
        assert_eq!(r.language, Language::En);
        assert!(parse_summary(raw, &[SummaryLength::Medium], Language::En).is_err());
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let llm = Arc::new(ScriptedLlm::replying("{}"));
        let (ctx, _) = context(llm.clone());
        let err = summarize(&ctx, "   ", SummaryOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_summarize_uses_cache() {
        let llm = Arc::new(ScriptedLlm::replying(
            r#"{"summaries":[{"type":"short","text":"Rates cut","key_points":["rates"]}],"main_topic":"rates"}"#,
        ));
        let (ctx, _) = context(llm.clone());
        let opts = || SummaryOptions {
            lengths: Some(vec![SummaryLength::Short]),
            ..SummaryOptions::default()
        };
        let first = summarize(&ctx, ARTICLE, opts()).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.data.summaries[0].text, "Rates cut");
        let request = llm.requests.lock().unwrap()[0].clone();
        assert_eq!(request.temperature, 0.5);
        assert_eq!(request.max_tokens, 1200);

        let second = summarize(&ctx, ARTICLE, opts()).await.unwrap();
        assert!(second.cached);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_summarize_falls_back_on_bad_json() {
        let llm = Arc::new(ScriptedLlm::replying("not json at all"));
        let (ctx, _) = context(llm);
        let r = summarize(&ctx, ARTICLE, SummaryOptions::default()).await.unwrap();
        assert!(r.used_fallback);
        assert_eq!(r.data.summaries.len(), 3);
        assert_eq!(r.error.unwrap().kind, AiErrorKind::ParseError);
        assert_eq!(ctx.caches().get(names::SUMMARY).unwrap().len(), 0);
    }
}
