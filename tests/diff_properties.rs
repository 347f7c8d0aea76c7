use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};

use proptest::prelude::*;
use treewatch::snapshot::{diff, PathStamp, Snapshot};
use treewatch::{ChangeKind, FileChangeEvent};

fn stamp(secs: u64, is_dir: bool) -> PathStamp {
    PathStamp {
        modified: UNIX_EPOCH + Duration::from_secs(secs),
        is_dir,
    }
}

// Entries keyed by a small name space so generated snapshots overlap.
fn entries_strategy() -> impl Strategy<Value = BTreeMap<String, (u64, bool)>> {
    proptest::collection::btree_map("[a-f]{1,2}", (0..50u64, any::<bool>()), 0..20)
}

fn snapshot_of(prefix: &str, entries: &BTreeMap<String, (u64, bool)>) -> Snapshot {
    entries
        .iter()
        .map(|(name, &(secs, is_dir))| (PathBuf::from(format!("{prefix}/{name}")), stamp(secs, is_dir)))
        .collect()
}

proptest! {
    #[test]
    fn diff_of_a_snapshot_with_itself_is_empty(entries in entries_strategy()) {
        let snap = snapshot_of("/p", &entries);
        prop_assert!(diff(&snap, &snap).is_empty());
    }

    #[test]
    fn disjoint_snapshots_yield_only_removed_then_added(
        previous in entries_strategy(),
        current in entries_strategy(),
    ) {
        // Distinct prefixes make the two path sets disjoint.
        let prev = snapshot_of("/old", &previous);
        let curr = snapshot_of("/new", &current);
        let events = diff(&prev, &curr);

        let removed: Vec<_> = events.iter().filter(|e| e.kind == ChangeKind::Removed).collect();
        let added: Vec<_> = events.iter().filter(|e| e.kind == ChangeKind::Added).collect();
        prop_assert_eq!(removed.len(), previous.len());
        prop_assert_eq!(added.len(), current.len());
        prop_assert_eq!(events.len(), previous.len() + current.len());
        prop_assert!(removed.iter().all(|e| prev.contains(&e.path)));
        prop_assert!(added.iter().all(|e| curr.contains(&e.path)));
    }

    #[test]
    fn directory_timestamp_changes_are_silent(
        entries in entries_strategy(),
        bump in 1..1000u64,
    ) {
        let prev = snapshot_of("/p", &entries);
        let touched: BTreeMap<String, (u64, bool)> = entries
            .iter()
            .map(|(name, &(secs, is_dir))| {
                let secs = if is_dir { secs + bump } else { secs };
                (name.clone(), (secs, is_dir))
            })
            .collect();
        let curr = snapshot_of("/p", &touched);

        prop_assert!(diff(&prev, &curr).is_empty());
    }

    #[test]
    fn changed_file_timestamps_are_reported_as_modified(
        entries in entries_strategy(),
        bump in 1..1000u64,
    ) {
        let prev = snapshot_of("/p", &entries);
        let touched: BTreeMap<String, (u64, bool)> = entries
            .iter()
            .map(|(name, &(secs, is_dir))| (name.clone(), (secs + bump, is_dir)))
            .collect();
        let curr = snapshot_of("/p", &touched);

        let expected: Vec<FileChangeEvent> = entries
            .iter()
            .filter(|(_, (_, is_dir))| !*is_dir)
            .map(|(name, _)| FileChangeEvent::modified(format!("/p/{name}")))
            .collect();
        prop_assert_eq!(diff(&prev, &curr), expected);
    }
}
