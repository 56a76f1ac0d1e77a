//! Catalog loading from key files.
//!
//! Two layouts are accepted:
//!
//! * **Plain list**: one key per line.  Blank lines and lines starting with
//!   `#` are skipped.
//! * **Delimited table**: the first line is a comma-separated header.  The
//!   key column is the one named `key`, `action`, `parameter` or `动作参数`;
//!   otherwise the second column (the template layout stores a line number
//!   in the first), or the first column when there is only one.

use std::path::Path;

use super::{Catalog, CatalogError};

/// Header names recognised as the key column (compared case-insensitively).
const KEY_COLUMN_NAMES: &[&str] = &[
    "key",
    "action",
    "parameter",
    "action_parameter",
    "动作参数",
];

impl Catalog {
    /// Read and parse a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::parse(&text);
        log::info!(
            "catalog: loaded {} keys from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse catalog text in either supported layout.
    pub fn parse(text: &str) -> Self {
        let text = text.trim_start_matches('\u{feff}');
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let Some(first) = lines.next() else {
            return Self::default();
        };

        if !first.contains(',') {
            return std::iter::once(first).chain(lines).collect();
        }

        let header: Vec<String> = split_fields(first);
        let column = key_column(&header);
        log::debug!("catalog: delimited input, key column {column} of {header:?}");

        lines
            .filter_map(|line| split_fields(line).into_iter().nth(column))
            .filter(|field| !field.is_empty())
            .collect()
    }
}

fn key_column(header: &[String]) -> usize {
    if let Some(pos) = header
        .iter()
        .position(|h| KEY_COLUMN_NAMES.contains(&h.to_lowercase().as_str()))
    {
        return pos;
    }
    if header.len() >= 2 {
        1
    } else {
        0
    }
}

fn split_fields(line: &str) -> Vec<String> {
    line.split(',')
        .map(|f| f.trim().trim_matches('"').trim().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
