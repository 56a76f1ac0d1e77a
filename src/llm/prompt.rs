//! Prompt compiler for batched line generation.
//!
//! [`PromptCompiler`] turns a set of task keys into a [`Prompt`]: a
//! `(system, user)` message pair for any OpenAI-compatible
//! `/chat/completions` endpoint.  The user message embeds a serialised
//! [`PromptDocument`] with the fixed policy sections (taxonomy, tone,
//! length rules, addressing and language rules) and the variable key list.
//!
//! Compilation is pure: the same character, language, policy, keys and
//! category hint always produce the same `Prompt`, and key order is kept.

use indexmap::IndexMap;
use serde::Serialize;

use crate::catalog::{Category, TaskKey};
use crate::config::PromptConfig;
use crate::llm::character::CharacterContext;
use crate::llm::language::Language;

// ---------------------------------------------------------------------------
// Fixed policy tables
// ---------------------------------------------------------------------------

const POSTURE_CODES: &[(&str, &str)] = &[
    ("P0", "Any posture (applies to all)"),
    ("P1", "Face-to-face"),
    ("P2", "Side-by-side, user on the left"),
    ("P3", "Side-by-side, user on the right"),
    ("P4", "Rear-facing"),
    ("P5", "Character on top, in control of the rhythm"),
    ("P6", "Character pinned down, passive"),
];

const INTENSITY_CODES: &[(&str, &str)] = &[
    ("B0", "Baseline, steady breathing"),
    ("B1", "Slight excitement (20 breaths/min)"),
    ("B2", "Moderate excitement (40 breaths/min)"),
    ("B3", "High excitement (60 breaths/min)"),
    ("B4", "Extreme excitement (80 breaths/min)"),
    ("B5", "Peak state (100 breaths/min)"),
];

const TOUCH_PARTS: &[(&str, &str)] = &[
    ("LTit", "Left chest sensor"),
    ("RTit", "Right chest sensor"),
    ("LButt", "Left thigh sensor"),
    ("RButt", "Right thigh sensor"),
];

const TOUCH_DURATIONS: &[(&str, &str)] = &[
    ("long", "Continuous contact over 200 ms"),
    ("short", "Quick contact under 200 ms, e.g. a tap"),
];

const LENGTH_NOTES: &[&str] = &[
    "Apply the category length when the parameter key contains the category name.",
    "Characters means glyphs in the target language; keep outputs concise and single-line.",
    "Do not pad with filler words.",
    "Breath sounds are onomatopoeia only, never full sentences.",
];

const TONE: &str = "Authentic and emotionally appropriate to the situation";

// ---------------------------------------------------------------------------
// PromptDocument
// ---------------------------------------------------------------------------

/// Structured body of a prompt, serialised as pretty JSON into the user
/// message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptDocument {
    pub task_description: String,
    pub character_profile: CharacterProfile,
    pub taxonomy: Taxonomy,
    pub generation_requirements: GenerationRequirements,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_context: Option<EventContext>,
    pub batch_parameters: Vec<TaskKey>,
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterProfile {
    pub name: String,
    pub description: String,
    pub personality_requirements: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Taxonomy {
    pub overview: &'static str,
    pub categories: IndexMap<&'static str, &'static str>,
    pub posture_codes: IndexMap<&'static str, &'static str>,
    pub intensity_codes: IndexMap<&'static str, &'static str>,
    pub touch_parts: IndexMap<&'static str, &'static str>,
    pub touch_durations: IndexMap<&'static str, &'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequirements {
    pub language: String,
    pub tone: &'static str,
    pub length_policy: LengthPolicy,
    pub content_guidelines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LengthPolicy {
    pub global_default: String,
    pub length_by_category: IndexMap<String, String>,
    pub notes: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventContext {
    pub category: Category,
    pub description: &'static str,
    pub guidelines: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub structure: &'static str,
    pub requirements: Vec<String>,
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// A compiled, immutable request: the chat message pair plus the keys it
/// asks for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    system: String,
    user: String,
    keys: Vec<TaskKey>,
}

impl Prompt {
    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Keys requested by this prompt, in request order.
    pub fn keys(&self) -> &[TaskKey] {
        &self.keys
    }

    /// Total characters across both messages.
    pub fn char_len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

// ---------------------------------------------------------------------------
// PromptCompiler
// ---------------------------------------------------------------------------

/// Builds [`Prompt`]s for one character and language.
///
/// # Example
/// ```rust
/// use line_forge::catalog::TaskKey;
/// use line_forge::config::PromptConfig;
/// use line_forge::llm::{CharacterContext, Language, PromptCompiler};
///
/// let compiler = PromptCompiler::new(
///     CharacterContext::new("Mira", "A cheerful librarian."),
///     Language::English,
///     PromptConfig::default(),
/// );
/// let prompt = compiler.compile(&[TaskKey::new("greeting_1")], None);
/// assert!(prompt.system().contains("STRICT ADDRESSING RULE"));
/// assert!(prompt.user().contains("greeting_1"));
/// ```
#[derive(Debug, Clone)]
pub struct PromptCompiler {
    character: CharacterContext,
    language: Language,
    policy: PromptConfig,
}

impl PromptCompiler {
    /// Create a compiler.  Description placeholders are resolved once here.
    pub fn new(character: CharacterContext, language: Language, policy: PromptConfig) -> Self {
        let character = character.resolve_placeholders(language.second_person_pronoun());
        Self {
            character,
            language,
            policy,
        }
    }

    /// Compile a prompt for `keys`, optionally focused on one category.
    pub fn compile(&self, keys: &[TaskKey], category_hint: Option<Category>) -> Prompt {
        let document = self.document(keys, category_hint);
        // Serialising a tree of strings and maps cannot fail.
        let body = serde_json::to_string_pretty(&document).unwrap_or_default();

        let lang = self.language.name();
        let user = format!(
            "Please generate character lines based on this detailed specification:\n\n\
             {body}\n\n\
             Important:\n\
             - Output must be strictly in {lang} only. Do not include any words or characters in other languages.\n\
             - Return ONLY a valid JSON object where each key is an action parameter and each value is the corresponding line. \
             Do not include any explanatory text outside the JSON."
        );

        Prompt {
            system: self.system_message(),
            user,
            keys: keys.to_vec(),
        }
    }

    /// Build the structured document for `keys`.
    pub fn document(&self, keys: &[TaskKey], category_hint: Option<Category>) -> PromptDocument {
        let lang = self.language.name().to_string();

        PromptDocument {
            task_description: format!(
                "You are writing short spoken lines for a character in an interactive companion product. \
                 Sensors detect the user's actions and the product plays the matching line. \
                 Generate authentic, character-appropriate lines in {lang}."
            ),
            character_profile: CharacterProfile {
                name: self.character.name.clone(),
                description: self.character.description.clone(),
                personality_requirements: "Keep personality, speech patterns and emotional responses consistent across all lines",
            },
            taxonomy: Taxonomy {
                overview: "Action parameters encode situations with a structured naming system: \
                           category word, posture code (P), intensity code (B), touch part and duration",
                categories: Category::ALL
                    .into_iter()
                    .map(|c| (c.as_str(), c.description()))
                    .collect(),
                posture_codes: POSTURE_CODES.iter().copied().collect(),
                intensity_codes: INTENSITY_CODES.iter().copied().collect(),
                touch_parts: TOUCH_PARTS.iter().copied().collect(),
                touch_durations: TOUCH_DURATIONS.iter().copied().collect(),
            },
            generation_requirements: GenerationRequirements {
                language: lang.clone(),
                tone: TONE,
                length_policy: LengthPolicy {
                    global_default: self.policy.default_length.to_string(),
                    length_by_category: self
                        .policy
                        .length_by_category
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_string()))
                        .collect(),
                    notes: LENGTH_NOTES.to_vec(),
                },
                content_guidelines: self.content_guidelines(),
            },
            event_context: category_hint.map(|category| EventContext {
                category,
                description: category.description(),
                guidelines: category.guidelines().to_vec(),
            }),
            batch_parameters: keys.to_vec(),
            output_format: OutputFormat {
                kind: "JSON object",
                structure: "{\"parameter_name\": \"line_text\", ...}",
                requirements: vec![
                    "Return ONLY the JSON object, no additional text".to_string(),
                    "Use the exact parameter names as keys".to_string(),
                    format!("All lines must be in {lang}"),
                    format!(
                        "Do not include any non-{lang} words, characters, translations or romanisation"
                    ),
                    "Ensure the JSON is properly formatted and parseable".to_string(),
                ],
            },
        }
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn content_guidelines(&self) -> Vec<String> {
        let pronoun = self.language.second_person_pronoun();
        vec![
            "Reflect the character's personality and current emotional state".to_string(),
            "Integrate posture (P) and intensity (B) into every line; higher B is more breathless, lower B calmer".to_string(),
            "Vary lines across similar parameters to avoid repetition".to_string(),
            format!(
                "Never address the user by name; use ONLY the second-person pronoun '{pronoun}'"
            ),
            "If any name or title for the user appears in the description or context, ignore it and use the pronoun instead".to_string(),
            "Do not use nicknames, titles or placeholders to address the user".to_string(),
        ]
    }

    fn system_message(&self) -> String {
        let pronoun = self.language.second_person_pronoun();
        let lang = self.language.name();

        let mut msg = String::with_capacity(2048);
        msg.push_str(
            "You are a specialised character line writer. You create authentic lines based on:\n\
             1. Character personality and description\n\
             2. Situational context (posture, intensity level, event type)\n\
             3. Action parameter interpretation\n\n",
        );
        msg.push_str(&format!(
            "STRICT ADDRESSING RULE: Always address the user ONLY with the second-person pronoun '{pronoun}'. \
             Ignore any names, titles, nicknames, placeholders or honorifics present in the character description \
             or anywhere in the prompt. Never use a name when addressing the user.\n\n"
        ));
        msg.push_str(&format!(
            "STRICT LANGUAGE RULE: Write ALL output exclusively in {lang}. Do not mix in any other language, \
             translations or romanisation. {}\n\n",
            self.language.script_rule()
        ));
        msg.push_str(&self.length_rules());
        msg.push_str(
            "\nWrite lines that feel natural and consistent with the character while reflecting the specified conditions.",
        );
        msg
    }

    fn length_rules(&self) -> String {
        let default = self.policy.default_length;
        if self.policy.length_by_category.is_empty() {
            return format!("STRICT LENGTH: Keep each line concise and within {default}.\n");
        }

        let rules = self
            .policy
            .length_by_category
            .iter()
            .map(|(cat, range)| format!("{cat}: {range}"))
            .collect::<Vec<_>>()
            .join(", ");
        let names = self
            .policy
            .length_by_category
            .keys()
            .map(|k| format!("'{k}'"))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "STRICT LENGTH BY CATEGORY: When the parameter key indicates a category (contains {names}), \
             enforce these character ranges: {rules}. If no category applies, use the default {default}. \
             Characters means glyphs in the target language; keep outputs concise and single-line.\n"
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
