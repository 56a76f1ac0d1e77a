//! Character context consumed by the prompt compiler.
//!
//! The pipeline does not own character records; it asks a
//! [`CharacterProvider`] for a display name and a free-text description.
//! [`FileCharacterProvider`] reads the description from a text file, which
//! is how the CLI supplies it.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Placeholder for the character's own name in description templates.
pub const CHAR_PLACEHOLDER: &str = "{{char}}";
/// Placeholder for the user in description templates.
pub const USER_PLACEHOLDER: &str = "{{user}}";

// ---------------------------------------------------------------------------
// CharacterContext
// ---------------------------------------------------------------------------

/// Display name plus free-text description of the speaking character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterContext {
    pub name: String,
    pub description: String,
}

impl CharacterContext {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Return a copy with `{{char}}` replaced by the character name and
    /// `{{user}}` replaced by `user`.
    pub fn resolve_placeholders(&self, user: &str) -> Self {
        let description = self
            .description
            .replace(CHAR_PLACEHOLDER, &self.name)
            .replace(USER_PLACEHOLDER, user);
        Self {
            name: self.name.clone(),
            description,
        }
    }
}

// ---------------------------------------------------------------------------
// CharacterProvider
// ---------------------------------------------------------------------------

/// Source of the character context for a run.
pub trait CharacterProvider {
    fn character(&self) -> Result<CharacterContext>;
}

impl CharacterProvider for CharacterContext {
    fn character(&self) -> Result<CharacterContext> {
        Ok(self.clone())
    }
}

/// Reads the description from a UTF-8 text file.
///
/// A missing or blank file is not an error: the character is used with
/// `fallback_description` instead.
pub struct FileCharacterProvider {
    name: String,
    path: PathBuf,
    fallback_description: String,
}

impl FileCharacterProvider {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            fallback_description: String::new(),
        }
    }

    pub fn with_fallback(mut self, description: impl Into<String>) -> Self {
        self.fallback_description = description.into();
        self
    }
}

impl CharacterProvider for FileCharacterProvider {
    fn character(&self) -> Result<CharacterContext> {
        let description = if self.path.exists() {
            std::fs::read_to_string(&self.path).with_context(|| {
                format!(
                    "failed to read character description {}",
                    self.path.display()
                )
            })?
        } else {
            log::warn!(
                "character: description file {} not found, using fallback",
                self.path.display()
            );
            String::new()
        };

        let description = if description.trim().is_empty() {
            self.fallback_description.clone()
        } else {
            description.trim().to_string()
        };

        Ok(CharacterContext::new(self.name.clone(), description))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted() {
        let ctx = CharacterContext::new("Mira", "{{char}} adores {{user}}. {{char}} is shy.");
        let resolved = ctx.resolve_placeholders("你");
        assert_eq!(resolved.description, "Mira adores 你. Mira is shy.");
        assert_eq!(resolved.name, "Mira");
    }

    #[test]
    fn file_provider_reads_trimmed_description() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("description.txt");
        std::fs::write(&path, "\n  A cheerful librarian.  \n").unwrap();

        let ctx = FileCharacterProvider::new("Mira", &path)
            .character()
            .unwrap();
        assert_eq!(ctx.description, "A cheerful librarian.");
    }

    #[test]
    fn file_provider_falls_back_when_missing_or_blank() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = FileCharacterProvider::new("Mira", dir.path().join("none.txt"))
            .with_fallback("stored description")
            .character()
            .unwrap();
        assert_eq!(missing.description, "stored description");

        let blank_path = dir.path().join("blank.txt");
        std::fs::write(&blank_path, "   \n").unwrap();
        let blank = FileCharacterProvider::new("Mira", &blank_path)
            .with_fallback("stored description")
            .character()
            .unwrap();
        assert_eq!(blank.description, "stored description");
    }
}
