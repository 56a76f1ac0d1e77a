//! Task catalog: the ordered set of keys a run must resolve.
//!
//! * [`TaskKey`] / [`Category`] : key identity and inferred scenario family.
//! * [`Catalog`] : de-duplicated, ordered key list (see [`loader`] for files).
//! * [`partition`] : splits a catalog into bounded [`Batch`]es.

pub mod key;
pub mod loader;
pub mod partition;

use std::collections::HashSet;

use thiserror::Error;

pub use key::{Category, TaskKey};
pub use partition::{partition, Batch};

// ---------------------------------------------------------------------------
// CatalogError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Batch size must be at least one.
    #[error("batch size must be >= 1 (got {0})")]
    InvalidBatchSize(usize),

    /// The catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Ordered collection of unique task keys.
///
/// Built with [`FromIterator`]; repeated keys keep their first position so
/// that no key can land in two batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    keys: Vec<TaskKey>,
}

impl Catalog {
    pub fn keys(&self) -> &[TaskKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Split the catalog into batches of at most `batch_size` keys.
    pub fn batches(&self, batch_size: usize) -> Result<Vec<Batch>, CatalogError> {
        partition(&self.keys, batch_size)
    }
}

impl<K: Into<TaskKey>> FromIterator<K> for Catalog {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let keys = iter
            .into_iter()
            .map(Into::into)
            .filter(|k: &TaskKey| !k.as_str().is_empty())
            .filter(|k| seen.insert(k.clone()))
            .collect();
        Self { keys }
    }
}
