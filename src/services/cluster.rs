//! Keyword topic clustering.

use super::context::{AiContext, ServiceCall};
use super::{detect_language_from_keywords, names, Keyword, Language, ServiceResponse};
use crate::cache::{CacheConfig, EvictionStrategy};
use crate::resilience::RetryPresets;
use crate::structured::parse_json_object;
use crate::tokens::round_to;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are an expert in NLP and topic modeling. Respond in valid JSON.";
const MIN_KEYWORDS: usize = 3;
const PROMPT_KEYWORDS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterKeyword {
    pub word: String,
    pub frequency: u32,
    pub tfidf: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_to_theme: Option<f64>,
}

impl From<&Keyword> for ClusterKeyword {
    fn from(k: &Keyword) -> Self {
        Self {
            word: k.word.clone(),
            frequency: k.frequency,
            tfidf: k.tfidf,
            relevance_to_theme: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCluster {
    pub id: String,
    pub theme: String,
    pub theme_en: String,
    pub keywords: Vec<ClusterKeyword>,
    pub size: usize,
    pub cohesion_score: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    #[default]
    Related,
    Opposed,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRelationship {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub relationship: Relationship,
    #[serde(default)]
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInsights {
    pub main_topics: Vec<String>,
    pub topic_relationships: Vec<TopicRelationship>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub avg_cohesion: f64,
    pub separation_score: f64,
    pub coverage: f64,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            avg_cohesion: 0.5,
            separation_score: 0.5,
            coverage: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordClusterResult {
    pub clusters: Vec<KeywordCluster>,
    pub insights: ClusterInsights,
    pub quality_metrics: QualityMetrics,
}

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// `min(max(3, ceil(n / 5)), 8)` when unset.
    pub num_clusters: Option<usize>,
    pub language: Option<Language>,
    pub use_cache: bool,
    pub user_id: Option<String>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            num_clusters: None,
            language: None,
            use_cache: true,
            user_id: None,
        }
    }
}

/// 1h TTL, 200 entries, LRU.
pub fn cache_config() -> CacheConfig {
    CacheConfig::new(Duration::from_secs(3600), 200, EvictionStrategy::Lru)
}

pub fn default_num_clusters(keyword_count: usize) -> usize {
    keyword_count.div_ceil(5).clamp(3, 8)
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawKeyword {
    word: String,
    frequency: Option<u32>,
    tfidf: Option<f64>,
    relevance_to_theme: Option<f64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCluster {
    id: Option<String>,
    theme: Option<String>,
    theme_en: Option<String>,
    keywords: Vec<RawKeyword>,
    size: Option<usize>,
    cohesion_score: Option<f64>,
    description: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawInsights {
    main_topics: Option<Vec<String>>,
    topic_relationships: Vec<TopicRelationship>,
    summary: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawQuality {
    avg_cohesion: Option<f64>,
    separation_score: Option<f64>,
    coverage: Option<f64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawClusterResult {
    clusters: Vec<RawCluster>,
    insights: RawInsights,
    quality_metrics: RawQuality,
}

fn positive(v: Option<f64>, default: f64) -> f64 {
    v.filter(|x| *x > 0.0).unwrap_or(default)
}

fn parse_clusters(raw: &str) -> Result<KeywordClusterResult> {
    let parsed: RawClusterResult = parse_json_object(raw)?;
    let clusters: Vec<KeywordCluster> = parsed
        .clusters
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let theme = c.theme.unwrap_or_else(|| "Unnamed Theme".to_string());
            let keywords: Vec<ClusterKeyword> = c
                .keywords
                .into_iter()
                .map(|k| ClusterKeyword {
                    word: k.word,
                    frequency: k.frequency.unwrap_or(0),
                    tfidf: k.tfidf.unwrap_or(0.0),
                    relevance_to_theme: Some(positive(k.relevance_to_theme, 0.5)),
                })
                .collect();
            KeywordCluster {
                id: c.id.unwrap_or_else(|| format!("cluster_{}", i + 1)),
                theme_en: c.theme_en.unwrap_or_else(|| theme.clone()),
                theme,
                size: c.size.filter(|s| *s > 0).unwrap_or(keywords.len()),
                keywords,
                cohesion_score: positive(c.cohesion_score, 0.5),
                description: c.description,
            }
        })
        .collect();

    let defaults = QualityMetrics::default();
    let q = parsed.quality_metrics;
    Ok(KeywordClusterResult {
        insights: ClusterInsights {
            main_topics: parsed
                .insights
                .main_topics
                .unwrap_or_else(|| clusters.iter().map(|c| c.theme.clone()).collect()),
            topic_relationships: parsed.insights.topic_relationships,
            summary: parsed
                .insights
                .summary
                .unwrap_or_else(|| "Keywords clustered by semantic similarity".to_string()),
        },
        quality_metrics: QualityMetrics {
            avg_cohesion: positive(q.avg_cohesion, defaults.avg_cohesion),
            separation_score: positive(q.separation_score, defaults.separation_score),
            coverage: positive(q.coverage, defaults.coverage),
        },
        clusters,
    })
}

/// Equal-size buckets over keywords ranked by TF-IDF.
pub fn fallback_clusters(keywords: &[Keyword], num_clusters: usize) -> KeywordClusterResult {
    let mut sorted: Vec<&Keyword> = keywords.iter().collect();
    sorted.sort_by(|a, b| b.tfidf.total_cmp(&a.tfidf));

    let per_cluster = keywords.len().div_ceil(num_clusters.max(1)).max(1);
    let clusters: Vec<KeywordCluster> = sorted
        .chunks(per_cluster)
        .take(num_clusters)
        .enumerate()
        .map(|(i, chunk)| {
            let n = i + 1;
            KeywordCluster {
                id: format!("cluster_{}", n),
                theme: format!("Topic {}", n),
                theme_en: format!("Topic {}", n),
                keywords: chunk.iter().map(|k| ClusterKeyword::from(*k)).collect(),
                size: chunk.len(),
                cohesion_score: 0.5,
                description: format!("Cluster {} based on keyword importance", n),
            }
        })
        .collect();

    KeywordClusterResult {
        insights: ClusterInsights {
            main_topics: clusters.iter().map(|c| c.theme.clone()).collect(),
            topic_relationships: Vec::new(),
            summary: "Keywords clustered using rule-based fallback method".to_string(),
        },
        quality_metrics: QualityMetrics::default(),
        clusters,
    }
}

fn build_prompt(keywords: &[Keyword], num_clusters: usize, language: Language) -> String {
    let list = keywords
        .iter()
        .take(PROMPT_KEYWORDS)
        .map(|k| format!("{} (freq: {}, tfidf: {:.2})", k.word, k.frequency, k.tfidf))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Group these keywords into {num_clusters} semantically coherent topic clusters.\n\
         Language: {language}\n\nKeywords: {list}\n\n\
         Reply with JSON: {{\"clusters\": [{{\"id\": \"cluster_1\", \"theme\": \"...\", \
         \"theme_en\": \"...\", \"keywords\": [{{\"word\": \"...\", \"frequency\": 0, \"tfidf\": 0.0, \
         \"relevance_to_theme\": 0.9}}], \"size\": 0, \"cohesion_score\": 0.8, \
         \"description\": \"...\"}}], \"insights\": {{\"main_topics\": [\"...\"], \
         \"topic_relationships\": [{{\"from\": \"...\", \"to\": \"...\", \
         \"relationship\": \"related|opposed|contains\", \"strength\": 0.5}}], \"summary\": \"...\"}}, \
         \"quality_metrics\": {{\"avg_cohesion\": 0.8, \"separation_score\": 0.7, \"coverage\": 1.0}}}}",
    )
}

pub async fn cluster_keywords(
    ctx: &AiContext,
    keywords: &[Keyword],
    options: ClusterOptions,
) -> Result<ServiceResponse<KeywordClusterResult>> {
    if keywords.len() < MIN_KEYWORDS {
        let message = if keywords.is_empty() {
            "keywords must not be empty".to_string()
        } else {
            format!("at least {} keywords are required for clustering", MIN_KEYWORDS)
        };
        return Err(Error::validation_with_context(
            message,
            ErrorContext::new()
                .with_field_path("keywords")
                .with_details(format!("got {}", keywords.len()))
                .with_source("keyword_cluster"),
        ));
    }

    let num_clusters = options
        .num_clusters
        .filter(|n| *n > 0)
        .unwrap_or_else(|| default_num_clusters(keywords.len()));
    let language = options
        .language
        .unwrap_or_else(|| detect_language_from_keywords(keywords.iter().map(|k| k.word.as_str())));
    let words: Vec<&str> = keywords.iter().map(|k| k.word.as_str()).collect();

    let call = ServiceCall {
        service: names::KEYWORD_CLUSTER,
        operation: "cluster",
        cache: Some(cache_config()),
        cache_params: json!({ "keywords": words, "num_clusters": num_clusters, "language": language }),
        use_cache: options.use_cache,
        retry: ctx.retry_config(RetryPresets::standard()),
        request: ctx
            .chat(SYSTEM_PROMPT, build_prompt(keywords, num_clusters, language))
            .temperature(0.6)
            .max_tokens(1500),
        user_id: options.user_id,
    };

    ctx.run(call, parse_clusters, || fallback_clusters(keywords, num_clusters))
        .await
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStats {
    pub total_keywords: usize,
    /// 2 decimals
    pub average_cluster_size: f64,
    pub largest_cluster: Option<KeywordCluster>,
    pub smallest_cluster: Option<KeywordCluster>,
}

/// Size summary; ties keep the earliest cluster.
pub fn cluster_stats(result: &KeywordClusterResult) -> ClusterStats {
    let clusters = &result.clusters;
    let total_keywords: usize = clusters.iter().map(|c| c.size).sum();
    let average = if clusters.is_empty() {
        0.0
    } else {
        total_keywords as f64 / clusters.len() as f64
    };

    let mut largest: Option<&KeywordCluster> = None;
    let mut smallest: Option<&KeywordCluster> = None;
    for c in clusters {
        if largest.map_or(true, |l| c.size > l.size) {
            largest = Some(c);
        }
        if smallest.map_or(true, |s| c.size < s.size) {
            smallest = Some(c);
        }
    }

    ClusterStats {
        total_keywords,
        average_cluster_size: round_to(average, 2),
        largest_cluster: largest.cloned(),
        smallest_cluster: smallest.cloned(),
    }
}
