//! Structured output parsing for LLM responses.
//!
//! Models are asked to answer with a JSON object but often wrap it in prose
//! or code fences. [`parse_json_object`] tries a strict parse first and then
//! falls back to extracting the first balanced object.
//!
//! # Examples
//!
//! ```
//! use newslens_ai::structured::parse_json_object;
//! use serde_json::Value;
//!
//! let raw = "Here you go: {\"sentiment\": \"positive\", \"score\": 0.7}";
//! let parsed: Value = parse_json_object(raw).unwrap();
//! assert_eq!(parsed["sentiment"], "positive");
//! ```

mod extract;

pub use extract::{extract_balanced_object, lenient, parse_json_object};
