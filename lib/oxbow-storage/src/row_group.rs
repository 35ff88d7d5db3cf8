//! Row groups: fixed-capacity batches of rows stored column-wise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use oxbow_types::{DataChunk, FilterPropagation, LogicalType, TableFilter, Value};

use crate::block::BlockManager;
use crate::buffer::BufferPool;
use crate::checkpoint::PartialBlockManager;
use crate::column::{ColumnData, PersistentColumnData};
use crate::error::{Result, StorageError};
use crate::txn::Snapshot;
use crate::version::RowVersionManager;

/// Rows per row group.
pub const ROW_GROUP_CAPACITY: u64 = oxbow_types::VECTOR_CAPACITY as u64;

/// Serialized form of one row group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentRowGroup {
    pub start: u64,
    pub count: u64,
    pub columns: Vec<PersistentColumnData>,
    /// In-group rows carrying a committed tombstone at checkpoint time.
    pub deleted: Vec<u64>,
}

/// A fixed-capacity batch of rows; one column data per table column.
#[derive(Debug)]
pub struct RowGroup {
    /// Absolute row id of this group's first row.
    start: u64,
    count: AtomicU64,
    capacity: u64,
    columns: Vec<ColumnData>,
    versions: RowVersionManager,
}

impl RowGroup {
    pub fn new(pool: &Arc<BufferPool>, types: &[LogicalType], start: u64) -> Self {
        RowGroup {
            start,
            count: AtomicU64::new(0),
            capacity: ROW_GROUP_CAPACITY,
            columns: types
                .iter()
                .map(|ty| ColumnData::new(Arc::clone(pool), ty.clone()))
                .collect(),
            versions: RowVersionManager::new(),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn versions(&self) -> &RowVersionManager {
        &self.versions
    }

    /// Append rows `[chunk_offset, chunk_offset + count)` of `chunk`.
    /// Returns how many rows fit.
    pub fn append(
        &self,
        chunk: &DataChunk,
        chunk_offset: usize,
        count: usize,
        stamp: u64,
    ) -> Result<usize> {
        let current = self.count();
        let room = (self.capacity - current) as usize;
        let appended = room.min(count);
        if appended == 0 {
            return Ok(0);
        }
        for (column, vector) in self.columns.iter().zip(chunk.columns()) {
            if chunk_offset == 0 && appended == chunk.cardinality() {
                column.append(vector, appended)?;
            } else {
                // re-slice the vector so the column sees rows [0, appended)
                let mut slice = oxbow_types::Vector::new(vector.logical_type().clone());
                slice
                    .append_range(vector, chunk_offset, appended)
                    .map_err(|e| StorageError::SchemaMismatch {
                        detail: e.to_string(),
                    })?;
                column.append(&slice, appended)?;
            }
        }
        self.versions.append_rows(current, appended as u64, stamp);
        self.count.fetch_add(appended as u64, Ordering::AcqRel);
        Ok(appended)
    }

    /// Collect up to `limit` visible rows starting at in-group row
    /// `from_row`, appending to `output` (and their absolute ids to
    /// `row_ids`). Returns the next in-group row to resume from.
    pub fn scan_rows(
        &self,
        column_ids: &[usize],
        filter: Option<&TableFilter>,
        snapshot: &Snapshot,
        from_row: u64,
        limit: usize,
        output: &mut DataChunk,
        row_ids: &mut Vec<u64>,
    ) -> Result<u64> {
        let count = self.count();
        if from_row >= count {
            return Ok(count);
        }

        // segment-level zonemap gate: if every scanned column's segment
        // statistics refute the filter for this row range, skip without
        // touching data
        if let Some(filter) = filter {
            if self.prune_range(column_ids, filter, from_row) {
                return Ok(count);
            }
        }

        let mut row = from_row;
        while row < count && output.cardinality() < limit {
            if self.versions.row_is_visible(row, snapshot) {
                let values: Vec<Value> = column_ids
                    .iter()
                    .map(|&col| self.columns[col].fetch_row(row))
                    .collect::<Result<_>>()?;
                let keep = filter.map(|f| f.matches_row(&values)).unwrap_or(true);
                if keep {
                    output
                        .push_row(values)
                        .map_err(|e| StorageError::SchemaMismatch {
                            detail: e.to_string(),
                        })?;
                    row_ids.push(self.start + row);
                }
            }
            row += 1;
        }
        Ok(row)
    }

    /// Whole-range pruning check against per-segment zonemaps.
    fn prune_range(&self, column_ids: &[usize], filter: &TableFilter, row: u64) -> bool {
        for (position, &column) in column_ids.iter().enumerate() {
            let propagation =
                self.columns[column].check_segment_zonemap(row, filter, position);
            if propagation == FilterPropagation::AlwaysFalse {
                return true;
            }
        }
        false
    }

    /// Fetch one visible row by absolute row id.
    pub fn fetch_row(
        &self,
        row_id: u64,
        column_ids: &[usize],
        snapshot: &Snapshot,
    ) -> Result<Option<Vec<Value>>> {
        let row = row_id - self.start;
        if row >= self.count() {
            return Ok(None);
        }
        if !self.versions.row_is_visible(row, snapshot) {
            return Ok(None);
        }
        let values = column_ids
            .iter()
            .map(|&col| self.columns[col].fetch_row(row))
            .collect::<Result<_>>()?;
        Ok(Some(values))
    }

    /// Tombstone one row. Returns true if this call created the tombstone.
    pub fn delete_row(&self, row_id: u64, stamp: u64) -> bool {
        let row = row_id - self.start;
        if row >= self.count() {
            return false;
        }
        self.versions.delete_row(row, stamp)
    }

    /// In-place update of fixed-width columns.
    pub fn update_row(&self, row_id: u64, column: usize, value: &Value) -> Result<()> {
        let row = row_id - self.start;
        if row >= self.count() {
            return Err(StorageError::InvalidArgument {
                detail: format!("row {row_id} not in this row group"),
            });
        }
        self.columns[column].update_row(row, value)
    }

    pub fn checkpoint(&self, partial: &mut PartialBlockManager) -> Result<PersistentRowGroup> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.checkpoint(partial))
            .collect::<Result<_>>()?;
        Ok(PersistentRowGroup {
            start: self.start,
            count: self.count(),
            columns,
            deleted: self.versions.committed_tombstones(),
        })
    }

    pub fn load(
        pool: &Arc<BufferPool>,
        manager: &Arc<BlockManager>,
        types: &[LogicalType],
        persistent: &PersistentRowGroup,
    ) -> Result<Self> {
        let columns = types
            .iter()
            .zip(&persistent.columns)
            .map(|(ty, persisted)| {
                ColumnData::load(
                    Arc::clone(pool),
                    manager,
                    ty.clone(),
                    crate::column::DEFAULT_SEGMENT_SIZE,
                    persisted,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let versions = RowVersionManager::new();
        for &row in &persistent.deleted {
            versions.restore_tombstone(row);
        }
        Ok(RowGroup {
            start: persistent.start,
            count: AtomicU64::new(persistent.count),
            capacity: ROW_GROUP_CAPACITY.max(persistent.count),
            columns,
            versions,
        })
    }
}
