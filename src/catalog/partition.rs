//! Batch partitioner.
//!
//! Splits an ordered key list into consecutive batches of at most
//! `batch_size` keys.  Pure and deterministic: the concatenation of the
//! returned batches is exactly the input, in order.

use super::{CatalogError, TaskKey};

/// One bounded, ordered group of keys processed in a single request cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based position of the batch in the run.
    pub index: usize,
    pub keys: Vec<TaskKey>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Partition `keys` into `ceil(N / batch_size)` batches.
///
/// Returns [`CatalogError::InvalidBatchSize`] when `batch_size` is zero.
/// An empty input yields no batches.
pub fn partition(keys: &[TaskKey], batch_size: usize) -> Result<Vec<Batch>, CatalogError> {
    if batch_size == 0 {
        return Err(CatalogError::InvalidBatchSize(batch_size));
    }

    Ok(keys
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            keys: chunk.to_vec(),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
