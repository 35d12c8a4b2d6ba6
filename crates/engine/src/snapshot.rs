//! Lock-free holder for the live dataset.
//!
//! Queries take a reference-counted snapshot at entry and run against it to
//! completion. A refresh swaps in a fully loaded replacement, so a query sees
//! either the old dataset or the new one and never a mix of the two.

use crate::dataset::PreparedDataset;
use arc_swap::ArcSwap;
use std::sync::Arc;

pub struct SnapshotHandle {
    current: ArcSwap<PreparedDataset>,
}

impl SnapshotHandle {
    pub fn new(dataset: PreparedDataset) -> Self {
        Self {
            current: ArcSwap::from_pointee(dataset),
        }
    }

    /// The dataset live right now. Holding the returned `Arc` keeps it alive
    /// across a concurrent replace.
    pub fn current(&self) -> Arc<PreparedDataset> {
        self.current.load_full()
    }

    /// Publish `dataset` to subsequent queries, returning the one it replaced.
    pub fn replace(&self, dataset: PreparedDataset) -> Arc<PreparedDataset> {
        self.current.swap(Arc::new(dataset))
    }
}

impl std::fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.load();
        f.debug_struct("SnapshotHandle")
            .field("stamp", &current.stamp())
            .field("rows", &current.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{AudioAttributes, FEATURE_DIM, SongRecord};
    use features::{PrepareConfig, prepare_records};

    fn dataset(ids: &[&str]) -> PreparedDataset {
        let songs = ids
            .iter()
            .enumerate()
            .map(|(i, id)| SongRecord {
                id: id.to_string(),
                name: id.to_uppercase(),
                artists: vec!["Someone".to_string()],
                year: 1990,
                popularity: 10,
                attributes: AudioAttributes::from_array([i as f64; FEATURE_DIM]),
            })
            .collect();
        prepare_records(songs, &PrepareConfig::default()).unwrap().into()
    }

    #[test]
    fn test_held_snapshot_survives_replace() {
        let handle = SnapshotHandle::new(dataset(&["a", "b"]));
        let before = handle.current();

        let previous = handle.replace(dataset(&["c", "d", "e"]));
        assert!(Arc::ptr_eq(&before, &previous));

        // The old reference still answers from the old data
        assert!(before.table().contains("a"));
        assert_eq!(before.len(), 2);

        let after = handle.current();
        assert_eq!(after.len(), 3);
        assert!(!after.table().contains("a"));
        assert_ne!(before.stamp(), after.stamp());
    }
}
