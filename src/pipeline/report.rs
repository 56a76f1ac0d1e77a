//! Result mapping and the end-of-run report.

use indexmap::IndexMap;

use crate::catalog::TaskKey;

// ---------------------------------------------------------------------------
// ResultMapping
// ---------------------------------------------------------------------------

/// Keys resolved so far, in resolution order.
///
/// Placement is idempotent: the first line placed for a key is final and
/// later responses for the same key are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMapping {
    entries: IndexMap<TaskKey, String>,
}

impl ResultMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `text` for `key` unless it already has a line.  Returns `true`
    /// when the key was newly resolved.
    pub fn place(&mut self, key: &TaskKey, text: &str) -> bool {
        if self.entries.contains_key(key) {
            log::debug!("reconcile: ignoring repeated line for {key}");
            return false;
        }
        self.entries.insert(key.clone(), text.to_string());
        true
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &TaskKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn into_inner(self) -> IndexMap<TaskKey, String> {
        self.entries
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Outcome of a run that was not aborted by a terminal error.
///
/// `resolved`, `unresolved` and `pending` partition the catalog:
/// * `resolved` keys received a line,
/// * `unresolved` keys exhausted every retry tier,
/// * `pending` keys were never finished because the run was cancelled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub resolved: IndexMap<TaskKey, String>,
    pub unresolved: Vec<TaskKey>,
    pub pending: Vec<TaskKey>,
    pub cancelled: bool,
    pub batches_total: usize,
    pub batches_completed: usize,
    /// Network attempts made across the whole run.
    pub attempts: u32,
}

impl RunReport {
    /// Every key resolved and the run was not cancelled.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.unresolved.is_empty() && self.pending.is_empty()
    }

    pub fn total_keys(&self) -> usize {
        self.resolved.len() + self.unresolved.len() + self.pending.len()
    }

    /// One-line summary for the end of a CLI run.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} of {} keys resolved ({} unresolved, {} pending) in {}/{} batches, {} requests",
            self.resolved.len(),
            self.total_keys(),
            self.unresolved.len(),
            self.pending.len(),
            self.batches_completed,
            self.batches_total,
            self.attempts,
        );
        if self.cancelled {
            line.push_str(" [cancelled]");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_is_first_write_wins() {
        let mut mapping = ResultMapping::new();
        let key = TaskKey::new("a");
        assert!(mapping.place(&key, "first"));
        assert!(!mapping.place(&key, "second"));
        assert_eq!(mapping.get(&key), Some("first"));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn mapping_keeps_resolution_order() {
        let mut mapping = ResultMapping::new();
        for k in ["c", "a", "b"] {
            mapping.place(&TaskKey::new(k), k);
        }
        let order: Vec<_> = mapping.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn summary_mentions_counts() {
        let mut report = RunReport {
            unresolved: vec![TaskKey::new("b")],
            pending: vec![TaskKey::new("c")],
            cancelled: true,
            batches_total: 2,
            batches_completed: 1,
            attempts: 4,
            ..RunReport::default()
        };
        report.resolved.insert(TaskKey::new("a"), "x".into());

        assert_eq!(
            report.summary(),
            "1 of 3 keys resolved (1 unresolved, 1 pending) in 1/2 batches, 4 requests [cancelled]"
        );
        assert!(!report.is_complete());
    }
}
