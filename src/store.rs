//! Result stores: where resolved `(key, line)` pairs end up.
//!
//! The pipeline never reads a store back; it only hands over pairs as they
//! resolve.  [`JsonFileStore`] keeps one pretty-printed JSON object on disk
//! and rewrites it after every pair, so an interrupted run keeps everything
//! resolved so far.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use crate::catalog::TaskKey;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path} is not a JSON object of strings: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// ResultStore trait
// ---------------------------------------------------------------------------

/// Accepts resolved pairs.  A repeated key replaces the stored line.
pub trait ResultStore: Send {
    fn put(&mut self, key: &TaskKey, text: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: IndexMap<String, String>,
}

impl JsonFileStore {
    /// Open `path`, keeping any entries a previous run wrote there.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            if content.trim().is_empty() {
                IndexMap::new()
            } else {
                serde_json::from_str(&content).map_err(|source| StoreError::Format {
                    path: path.clone(),
                    source,
                })?
            }
        } else {
            IndexMap::new()
        };

        log::info!(
            "store: {} ({} existing entries)",
            path.display(),
            entries.len()
        );
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Write the whole object to a sibling temp file, then rename over the
    /// target.
    fn persist(&self) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            StoreError::Format {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, content).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl ResultStore for JsonFileStore {
    fn put(&mut self, key: &TaskKey, text: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), text.to_string());
        self.persist()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
