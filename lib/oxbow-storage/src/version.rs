//! Row version manager: per-row-group MVCC bookkeeping.
//!
//! Version stamps share one encoding: `0` means "always committed",
//! a value at or above [`TRANSACTION_ID_START`] names the still-active
//! transaction that wrote the row, and anything else is a commit id.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::txn::{Snapshot, TRANSACTION_ID_START};

#[derive(Debug, Clone, Copy)]
struct CreatedRange {
    start: u64,
    count: u64,
    stamp: u64,
    reverted: bool,
}

#[derive(Debug, Default)]
struct VersionState {
    created: Vec<CreatedRange>,
    /// row (relative to the row group) -> delete stamp
    deleted: HashMap<u64, u64>,
}

/// Tracks which transaction created and (possibly) tombstoned each row of
/// one row group.
#[derive(Debug, Default)]
pub struct RowVersionManager {
    state: Mutex<VersionState>,
}

fn stamp_visible(stamp: u64, snapshot: &Snapshot) -> bool {
    if stamp == 0 {
        return true;
    }
    if stamp >= TRANSACTION_ID_START {
        // uncommitted: visible only to its own transaction
        return stamp == snapshot.transaction_id;
    }
    stamp <= snapshot.start_time
}

impl RowVersionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` freshly appended rows starting at `start`.
    pub fn append_rows(&self, start: u64, count: u64, stamp: u64) {
        if count == 0 {
            return;
        }
        let mut state = self.state.lock();
        state.created.push(CreatedRange {
            start,
            count,
            stamp,
            reverted: false,
        });
    }

    /// Re-stamp rows appended by a transaction with its commit id.
    pub fn commit_append(&self, transaction_id: u64, commit_id: u64) {
        let mut state = self.state.lock();
        for range in &mut state.created {
            if range.stamp == transaction_id {
                range.stamp = commit_id;
            }
        }
    }

    /// Drop rows appended by an aborted transaction from visibility.
    pub fn revert_append(&self, start: u64, count: u64) {
        let mut state = self.state.lock();
        for range in &mut state.created {
            if range.start >= start && range.start + range.count <= start + count {
                range.reverted = true;
            }
        }
    }

    /// Tombstone one row. Returns false if the row already carries a
    /// tombstone (write-once until garbage collection).
    pub fn delete_row(&self, row: u64, stamp: u64) -> bool {
        let mut state = self.state.lock();
        if state.deleted.contains_key(&row) {
            return false;
        }
        state.deleted.insert(row, stamp);
        true
    }

    /// Re-stamp tombstones written by a transaction with its commit id.
    pub fn commit_deletes(&self, transaction_id: u64, commit_id: u64) {
        let mut state = self.state.lock();
        for stamp in state.deleted.values_mut() {
            if *stamp == transaction_id {
                *stamp = commit_id;
            }
        }
    }

    /// Remove tombstones written by an aborted transaction.
    pub fn revert_deletes(&self, transaction_id: u64) {
        let mut state = self.state.lock();
        state.deleted.retain(|_, stamp| *stamp != transaction_id);
    }

    /// Visibility under the snapshot: created-and-committed before the
    /// snapshot, and not tombstoned before it.
    pub fn row_is_visible(&self, row: u64, snapshot: &Snapshot) -> bool {
        let state = self.state.lock();
        let created = state.created.iter().find(|range| {
            row >= range.start && row < range.start + range.count
        });
        match created {
            Some(range) => {
                if range.reverted || !stamp_visible(range.stamp, snapshot) {
                    return false;
                }
            }
            // rows without an explicit range predate version tracking
            None => {}
        }
        match state.deleted.get(&row) {
            Some(&stamp) => !stamp_visible(stamp, snapshot),
            None => true,
        }
    }

    pub fn tombstone_count(&self) -> usize {
        self.state.lock().deleted.len()
    }

    /// Rows with a committed tombstone, for persistence at checkpoint.
    pub fn committed_tombstones(&self) -> Vec<u64> {
        let state = self.state.lock();
        let mut rows: Vec<u64> = state
            .deleted
            .iter()
            .filter(|(_, &stamp)| stamp < TRANSACTION_ID_START)
            .map(|(&row, _)| row)
            .collect();
        rows.sort_unstable();
        rows
    }

    /// Re-mark a tombstone loaded from a checkpoint; visible to no one.
    pub fn restore_tombstone(&self, row: u64) {
        self.state.lock().deleted.insert(row, 0);
    }

    /// Committed tombstones older than `oldest_active`: reclaimable rows.
    pub fn collectable_rows(&self, oldest_active: u64) -> Vec<u64> {
        let state = self.state.lock();
        let mut rows: Vec<u64> = state
            .deleted
            .iter()
            .filter(|(_, &stamp)| stamp < TRANSACTION_ID_START && stamp < oldest_active)
            .map(|(&row, _)| row)
            .collect();
        rows.sort_unstable();
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(start_time: u64) -> Snapshot {
        Snapshot {
            start_time,
            transaction_id: 0,
        }
    }

    #[test]
    fn insert_then_delete_visibility_window() {
        let versions = RowVersionManager::new();
        // T1 inserted row 0, committed at c1 = 5
        versions.append_rows(0, 1, 5);
        // T2 deleted row 0, committed at c2 = 9
        assert!(versions.delete_row(0, 9));

        // before c1: invisible
        assert!(!versions.row_is_visible(0, &snapshot(4)));
        // between c1 and c2: visible
        assert!(versions.row_is_visible(0, &snapshot(5)));
        assert!(versions.row_is_visible(0, &snapshot(8)));
        // at or after c2: deleted
        assert!(!versions.row_is_visible(0, &snapshot(9)));
        assert!(!versions.row_is_visible(0, &snapshot(100)));
    }

    #[test]
    fn uncommitted_rows_only_visible_to_their_transaction() {
        let versions = RowVersionManager::new();
        let txn_id = TRANSACTION_ID_START + 3;
        versions.append_rows(0, 10, txn_id);

        let other = snapshot(1000);
        assert!(!versions.row_is_visible(5, &other));

        let own = Snapshot {
            start_time: 1000,
            transaction_id: txn_id,
        };
        assert!(versions.row_is_visible(5, &own));

        versions.commit_append(txn_id, 1001);
        assert!(versions.row_is_visible(5, &snapshot(1001)));
        assert!(!versions.row_is_visible(5, &snapshot(1000)));
    }

    #[test]
    fn tombstones_are_write_once() {
        let versions = RowVersionManager::new();
        versions.append_rows(0, 1, 0);
        assert!(versions.delete_row(0, 7));
        assert!(!versions.delete_row(0, 8));
    }

    #[test]
    fn revert_append_hides_rows() {
        let versions = RowVersionManager::new();
        versions.append_rows(0, 5, TRANSACTION_ID_START + 1);
        versions.revert_append(0, 5);
        let own = Snapshot {
            start_time: 1,
            transaction_id: TRANSACTION_ID_START + 1,
        };
        assert!(!versions.row_is_visible(0, &own));
    }

    #[test]
    fn revert_deletes_restores_rows() {
        let versions = RowVersionManager::new();
        versions.append_rows(0, 1, 0);
        let txn_id = TRANSACTION_ID_START + 2;
        versions.delete_row(0, txn_id);
        assert!(!versions.row_is_visible(
            0,
            &Snapshot {
                start_time: 50,
                transaction_id: txn_id
            }
        ));
        versions.revert_deletes(txn_id);
        assert!(versions.row_is_visible(0, &snapshot(50)));
    }

    #[test]
    fn collectable_rows_respect_active_snapshots() {
        let versions = RowVersionManager::new();
        versions.append_rows(0, 3, 0);
        versions.delete_row(0, 5);
        versions.delete_row(1, 20);
        versions.delete_row(2, TRANSACTION_ID_START + 1);
        assert_eq!(versions.collectable_rows(10), vec![0]);
        assert_eq!(versions.collectable_rows(100), vec![0, 1]);
    }
}
