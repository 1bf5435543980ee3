//! JSON object extraction from free-form model output.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;

static FENCED: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").ok());

/// Parses model output into `T`.
///
/// Attempts, in order:
/// 1. the whole text
/// 2. the body of a fenced code block
/// 3. the first balanced `{...}` substring
///
/// Fails with [`Error::Parse`] when no attempt yields a valid `T`.
pub fn parse_json_object<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    let first_err = match serde_json::from_str::<T>(trimmed) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    if let Some(body) = fenced_block(trimmed) {
        if let Ok(v) = serde_json::from_str::<T>(body) {
            return Ok(v);
        }
    }

    let mut rest = trimmed;
    while let Some((start, candidate)) = extract_balanced_object(rest) {
        if let Ok(v) = serde_json::from_str::<T>(candidate) {
            return Ok(v);
        }
        rest = &rest[start + 1..];
    }

    Err(Error::parse(format!("no JSON object found in model output ({})", first_err)))
}

fn fenced_block(text: &str) -> Option<&str> {
    FENCED
        .as_ref()?
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// First balanced `{...}` substring, with its byte offset.
///
/// Braces inside JSON string literals (including escaped quotes) do not count.
pub fn extract_balanced_object(text: &str) -> Option<(usize, &str)> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + i + c.len_utf8();
                    return Some((start, &text[start..end]));
                }
            }
            _ => {}
        }
    }
    None
}

/// `deserialize_with` helper: a value that does not fit `T` becomes
/// `T::default()` instead of failing the whole document.
pub fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Summary {
        summary: String,
    }

    #[test]
    fn test_plain_json() {
        let s: Summary = parse_json_object(r#"{"summary": "ok"}"#).unwrap();
        assert_eq!(s.summary, "ok");
    }

    #[test]
    fn test_prose_around_object() {
        let raw = "Sure! Here is the result:\n{\"summary\": \"markets rallied\"}\nHope it helps.";
        let s: Summary = parse_json_object(raw).unwrap();
        assert_eq!(s.summary, "markets rallied");
    }

    #[test]
    fn test_fenced_block() {
        let raw = "```json\n{\"summary\": \"fenced\"}\n```";
        let s: Summary = parse_json_object(raw).unwrap();
        assert_eq!(s.summary, "fenced");
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = r#"note {"summary": "uses {braces} and \"quotes\" }"} trailing }"#;
        let (_, obj) = extract_balanced_object(raw).unwrap();
        assert_eq!(obj, r#"{"summary": "uses {braces} and \"quotes\" }"}"#);
        let s: Summary = parse_json_object(raw).unwrap();
        assert!(s.summary.contains("{braces}"));
    }

    #[test]
    fn test_skips_objects_of_wrong_shape() {
        let raw = r#"{"other": 1} then {"summary": "second"}"#;
        let s: Summary = parse_json_object(raw).unwrap();
        assert_eq!(s.summary, "second");
    }

    #[test]
    fn test_lenient_field_defaults_on_mismatch() {
        #[derive(Debug, Default, Deserialize, PartialEq)]
        #[serde(rename_all = "lowercase")]
        enum Mood {
            #[default]
            Calm,
            Angry,
        }
        #[derive(Deserialize)]
        struct Doc {
            #[serde(default, deserialize_with = "lenient")]
            mood: Mood,
        }
        let d: Doc = parse_json_object(r#"{"mood": "angry"}"#).unwrap();
        assert_eq!(d.mood, Mood::Angry);
        let d: Doc = parse_json_object(r#"{"mood": "furious"}"#).unwrap();
        assert_eq!(d.mood, Mood::Calm);
        let d: Doc = parse_json_object("{}").unwrap();
        assert_eq!(d.mood, Mood::Calm);
    }

    #[test]
    fn test_unbalanced_is_parse_error() {
        let err = parse_json_object::<Summary>("{\"summary\": \"cut off").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
