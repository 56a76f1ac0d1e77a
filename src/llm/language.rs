//! Target language of generated lines.
//!
//! The language decides the single second-person pronoun the lines may use
//! to address the user and the script restriction stated in the prompt.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Output language for a run.
///
/// Parsed leniently from display names (`中文`, `日本語`), English names and
/// ISO-639-1 codes; anything unrecognised is kept verbatim as
/// [`Language::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    Chinese,
    English,
    Japanese,
    Other(String),
}

impl Language {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_lowercase().as_str() {
            "中文" | "chinese" | "zh" | "zh-cn" | "zh_cn" | "zh-hans" => Language::Chinese,
            "english" | "en" | "en-us" | "en_us" => Language::English,
            "日本語" | "japanese" | "ja" | "ja-jp" | "ja_jp" => Language::Japanese,
            _ => Language::Other(trimmed.to_string()),
        }
    }

    /// English name used inside prompts.
    pub fn name(&self) -> &str {
        match self {
            Language::Chinese => "Chinese",
            Language::English => "English",
            Language::Japanese => "Japanese",
            Language::Other(name) => name,
        }
    }

    /// The only form of address the generated lines may use for the user.
    pub fn second_person_pronoun(&self) -> &'static str {
        match self {
            Language::Chinese => "你",
            Language::Japanese => "あなた",
            Language::English | Language::Other(_) => "you",
        }
    }

    /// Script restriction appended to the strict language rule.
    pub fn script_rule(&self) -> String {
        match self {
            Language::Chinese => {
                "Use Chinese characters only; no pinyin or any other romanisation.".to_string()
            }
            Language::Japanese => {
                "Use Japanese script (ひらがな/カタカナ/漢字) only; no romaji.".to_string()
            }
            Language::English => "Use English letters only.".to_string(),
            Language::Other(name) => format!(
                "Use only the native script of {name}; no romanised transliteration."
            ),
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Chinese
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        Language::parse(&value)
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.name().to_string()
    }
}
