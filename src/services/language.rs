use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

fn detect_with_threshold(text: &str, threshold: usize) -> Language {
    if text.chars().filter(|c| is_cjk(*c)).count() > threshold {
        Language::Zh
    } else {
        Language::En
    }
}

/// Chinese when the text has more than 20 CJK ideographs.
pub fn detect_language(content: &str) -> Language {
    detect_with_threshold(content, 20)
}

/// Keyword lists are short, so the bar is lower (more than 10).
pub fn detect_language_from_keywords<'a>(words: impl IntoIterator<Item = &'a str>) -> Language {
    let joined = words.into_iter().collect::<Vec<_>>().join(" ");
    detect_with_threshold(&joined, 10)
}

/// Titles plus summaries of a news batch; more than 50 ideographs.
pub fn detect_language_from_news<'a>(
    items: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Language {
    let joined = items
        .into_iter()
        .map(|(title, summary)| format!("{} {}", title, summary))
        .collect::<Vec<_>>()
        .join(" ");
    detect_with_threshold(&joined, 50)
}
