//! Change detection between the live catalog and an existing snapshot
//!
//! Pure classification, no I/O. Incremental runs fetch details only for
//! `new` and `changed` ids, which is what makes them cheap.

use std::collections::{HashMap, HashSet};

use crate::snapshot::{ItemId, Snapshot};

/// Classification of live ids against an existing snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    /// Live ids absent from the existing database
    pub new: Vec<ItemId>,
    /// Ids present in both whose remote timestamp moved past the stored one
    pub changed: Vec<ItemId>,
    /// Database ids that disappeared from the live catalog
    pub deleted: Vec<ItemId>,
}

impl CatalogDiff {
    /// Ids that need a detail fetch this run
    pub fn worklist(&self) -> Vec<ItemId> {
        self.new.iter().chain(self.changed.iter()).cloned().collect()
    }
}

/// Classify `live_ids` as new / changed / deleted relative to `existing`
///
/// An id counts as changed when the stored `time_updated` is absent or
/// zero, or when the remote stamp is strictly newer. Deleted excludes
/// platform pseudo-items and records already tombstoned.
pub fn classify(
    live_ids: &[ItemId],
    remote_stamps: &HashMap<ItemId, i64>,
    existing: &Snapshot,
) -> CatalogDiff {
    let live: HashSet<&str> = live_ids.iter().map(String::as_str).collect();
    let mut diff = CatalogDiff::default();

    for id in live_ids {
        match existing.database.get(id) {
            None => diff.new.push(id.clone()),
            Some(record) => {
                let stored = record.time_updated.unwrap_or(0);
                let moved = remote_stamps
                    .get(id)
                    .is_some_and(|remote| *remote > stored);
                if stored == 0 || moved {
                    diff.changed.push(id.clone());
                }
            }
        }
    }

    for (id, record) in &existing.database {
        if !live.contains(id.as_str()) && !record.is_platform() && !record.is_deleted() {
            diff.deleted.push(id.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ItemRecord;
    use pretty_assertions::assert_eq;

    fn snapshot_with(records: Vec<(&str, ItemRecord)>) -> Snapshot {
        let mut snapshot = Snapshot::new(0);
        for (id, record) in records {
            snapshot.database.insert(id.to_string(), record);
        }
        snapshot
    }

    fn record_updated_at(stamp: i64) -> ItemRecord {
        ItemRecord {
            time_updated: Some(stamp),
            ..Default::default()
        }
    }

    #[test]
    fn unseen_live_ids_are_new() {
        let existing = snapshot_with(vec![("1", record_updated_at(10))]);
        let live = vec!["1".to_string(), "2".to_string()];
        let stamps = HashMap::from([("1".to_string(), 10)]);

        let diff = classify(&live, &stamps, &existing);

        assert_eq!(diff.new, vec!["2"]);
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn newer_remote_stamp_marks_changed() {
        let existing = snapshot_with(vec![
            ("1", record_updated_at(10)),
            ("2", record_updated_at(10)),
        ]);
        let live = vec!["1".to_string(), "2".to_string()];
        let stamps = HashMap::from([("1".to_string(), 11), ("2".to_string(), 10)]);

        let diff = classify(&live, &stamps, &existing);

        assert_eq!(diff.changed, vec!["1"]);
    }

    #[test]
    fn missing_stored_stamp_marks_changed() {
        let existing = snapshot_with(vec![("1", ItemRecord::default())]);
        let live = vec!["1".to_string()];

        let diff = classify(&live, &HashMap::new(), &existing);

        assert_eq!(diff.changed, vec!["1"]);
    }

    #[test]
    fn vanished_ids_are_deleted_unless_platform_or_tombstoned() {
        let mut tombstoned = record_updated_at(5);
        tombstoned.tombstone(100);
        let platform = ItemRecord::platform("Base Game", "https://example.invalid/app");

        let existing = snapshot_with(vec![
            ("1", record_updated_at(5)),
            ("2", tombstoned),
            ("294100", platform),
        ]);

        let diff = classify(&[], &HashMap::new(), &existing);

        assert_eq!(diff.deleted, vec!["1"]);
    }

    #[test]
    fn worklist_is_new_union_changed() {
        let diff = CatalogDiff {
            new: vec!["a".to_string()],
            changed: vec!["b".to_string()],
            deleted: vec!["c".to_string()],
        };
        assert_eq!(diff.worklist(), vec!["a", "b"]);
    }
}
