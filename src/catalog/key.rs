//! Task keys and the category inferred from them.
//!
//! A [`TaskKey`] is an opaque identifier such as `greeting_3` or
//! `P4_B3_B4_LTit_long_1`.  Identity is the full string; the [`Category`] is
//! only a hint for prompt-side length and tone policy.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TaskKey
// ---------------------------------------------------------------------------

/// Immutable identifier naming one required line of generated text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    /// Wrap `key`, trimming surrounding whitespace.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(key.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Category inferred from substrings of the key, if any.
    pub fn category(&self) -> Option<Category> {
        Category::infer(&self.0)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for TaskKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Scenario family a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Greeting,
    Reaction,
    Tease,
    Impact,
    Touch,
    Breath,
}

/// Touch-sensor part codes that mark a key as [`Category::Touch`] even when
/// the word `touch` is absent.
const TOUCH_PART_CODES: &[&str] = &["LTit", "RTit", "LButt", "RButt"];

impl Category {
    /// Every category, in the order the prompt lists them.
    pub const ALL: [Category; 6] = [
        Category::Greeting,
        Category::Reaction,
        Category::Tease,
        Category::Impact,
        Category::Touch,
        Category::Breath,
    ];

    /// Lower-case name; also the substring that identifies the category.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Greeting => "greeting",
            Category::Reaction => "reaction",
            Category::Tease => "tease",
            Category::Impact => "impact",
            Category::Touch => "touch",
            Category::Breath => "breath",
        }
    }

    /// Parse a category name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Infer the category of `key` by substring.
    ///
    /// Category words win over part codes so that `touch_greeting_1` style
    /// keys still resolve deterministically (first match in [`Self::ALL`]).
    pub fn infer(key: &str) -> Option<Self> {
        let lower = key.to_ascii_lowercase();
        if let Some(cat) = Self::ALL.into_iter().find(|c| lower.contains(c.as_str())) {
            return Some(cat);
        }
        if TOUCH_PART_CODES.iter().any(|code| key.contains(code)) {
            return Some(Category::Touch);
        }
        None
    }

    /// One-line description used in the prompt taxonomy.
    pub fn description(self) -> &'static str {
        match self {
            Category::Greeting => "Greeting lines: the character greets the user after startup",
            Category::Reaction => {
                "Reaction lines: feedback while the user keeps interacting for a period"
            }
            Category::Tease => "Tease lines: playful prompt when the user's activity pauses",
            Category::Impact => {
                "Impact lines: the user resumes activity after more than 20 seconds idle"
            }
            Category::Touch => {
                "Touch lines: response to a touch sensor, by part, duration, posture and intensity"
            }
            Category::Breath => "Breath sounds: a single exhale sound, no words",
        }
    }

    /// Extra guidance added when a prompt is compiled for one category.
    pub fn guidelines(self) -> &'static [&'static str] {
        match self {
            Category::Greeting => &[
                "Triggered at startup or first interaction.",
                "Tone: welcoming and warm; establish personality and relationship.",
                "Keep it short and natural.",
            ],
            Category::Reaction => &[
                "Triggered during sustained interaction.",
                "Use the posture (P) and intensity (B) codes to modulate the line.",
                "Higher B means breathier, more intense responses; keep variety.",
            ],
            Category::Tease => &[
                "Triggered when the user's activity pauses for a while.",
                "Encourage re-engagement; playful, not repetitive.",
                "Respect the character's personality and current intensity level.",
            ],
            Category::Impact => &[
                "Triggered after a long idle period when activity resumes.",
                "Capture surprise or renewed excitement; concise lines.",
            ],
            Category::Touch => &[
                "Triggered by touch sensors with part and duration.",
                "Reflect differences across LTit/RTit/LButt/RButt and long/short.",
                "Combine with posture (P) and intensity (B) for nuance.",
            ],
            Category::Breath => &[
                "Generate breathing sounds only, no words or sentences.",
                "B1/B2 calm and soft, B3/B4 heavier, B5 intense panting.",
                "Each sound represents one exhale cycle.",
            ],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_trimmed() {
        assert_eq!(TaskKey::new("  greeting_1\n").as_str(), "greeting_1");
    }

    #[test]
    fn infers_word_categories() {
        assert_eq!(Category::infer("greeting_1"), Some(Category::Greeting));
        assert_eq!(
            Category::infer("P0_B4_B5_reaction_3"),
            Some(Category::Reaction)
        );
        assert_eq!(Category::infer("P0_B1_tease_2"), Some(Category::Tease));
        assert_eq!(Category::infer("P5_B0_impact_4"), Some(Category::Impact));
        assert_eq!(Category::infer("P0_B2_breath_1"), Some(Category::Breath));
    }

    #[test]
    fn part_codes_infer_touch() {
        assert_eq!(Category::infer("P4_B5_LTit_long_1"), Some(Category::Touch));
        assert_eq!(
            Category::infer("P1_B1_B2_RButt_short_1"),
            Some(Category::Touch)
        );
    }

    #[test]
    fn unknown_keys_have_no_category() {
        assert_eq!(TaskKey::new("custom_line_7").category(), None);
    }

    #[test]
    fn parse_round_trips_names() {
        for cat in Category::ALL {
            assert_eq!(Category::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(Category::parse("TOUCH"), Some(Category::Touch));
        assert_eq!(Category::parse("unknown"), None);
    }
}
