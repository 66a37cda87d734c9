use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::path::Path;

/// Time-ordered index from expiry instant to path. Multiple paths may share
/// an instant. Entries are written when a mutation sets a TTL and removed
/// when the TTL is overwritten, the path or a subtree containing it is
/// deleted or replaced, or the store is cleared. The sweep never removes
/// entries itself; it only reports candidates so that the actual deletion
/// travels through the replicated log.
#[derive(Clone, Debug, Default)]
pub struct TtlIndex {
    entries: BTreeMap<DateTime<Utc>, Vec<Path>>,
}

impl TtlIndex {
    pub fn insert(&mut self, when: DateTime<Utc>, path: Path) {
        self.entries.entry(when).or_default().push(path);
    }

    /// Drop every entry at or below `path`, at any instant. A mutation that
    /// deletes or replaces a subtree invalidates the expiries of everything
    /// inside it, not just the entry for the path itself.
    pub fn remove_subtree(&mut self, path: &Path) {
        self.entries.retain(|_, paths| {
            paths.retain(|p| !path.subsumes(p));
            !paths.is_empty()
        });
    }

    /// The earliest expiry instant currently indexed. The sweeper derives
    /// its next wake deadline from this.
    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.entries.keys().next().copied()
    }

    /// Paths whose expiry lies strictly before `now`, in expiry order. A
    /// prefix scan of the index, not a full walk.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<Path> {
        self.entries
            .range(..now)
            .flat_map(|(_, paths)| paths.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Seconds-since-epoch per path for snapshot dumps; the minimum wins
    /// when a path is indexed more than once.
    pub fn dump_seconds(&self) -> BTreeMap<String, i64> {
        let mut out: BTreeMap<String, i64> = BTreeMap::new();
        for (when, paths) in &self.entries {
            let secs = when.timestamp();
            for path in paths {
                out.entry(path.to_string())
                    .and_modify(|existing| *existing = (*existing).min(secs))
                    .or_insert(secs);
            }
        }
        out
    }
}
