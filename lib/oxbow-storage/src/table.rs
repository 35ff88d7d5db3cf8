//! Data table: assembles columns into a table with MVCC row groups.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use oxbow_types::{DataChunk, LogicalType, RowId, TableFilter, Value, VECTOR_CAPACITY};

use crate::block::{BlockManager, BlockPointer};
use crate::buffer::BufferPool;
use crate::checkpoint::PartialBlockManager;
use crate::error::{Result, StorageError};
use crate::meta::{MetadataManager, MetadataReader, MetadataWriter};
use crate::row_group::{PersistentRowGroup, RowGroup, ROW_GROUP_CAPACITY};
use crate::txn::Snapshot;

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub ty: LogicalType,
    pub not_null: bool,
    pub default: Option<Value>,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, ty: LogicalType) -> Self {
        ColumnDefinition {
            name: name.into(),
            ty,
            not_null: false,
            default: None,
            primary_key: false,
            unique: false,
        }
    }
}

/// Serialized table descriptor written at checkpoint.
#[derive(Debug, Serialize, Deserialize)]
struct PersistentTableData {
    name: String,
    columns: Vec<ColumnDefinition>,
    row_groups: Vec<PersistentRowGroup>,
}

/// Exclusive append window; holding it serializes writers on this table.
pub struct TableAppendState<'a> {
    _guard: MutexGuard<'a, ()>,
    /// First row id of this append.
    pub row_start: u64,
    /// Next row id to assign.
    pub current_row: u64,
}

/// Sequential scan cursor.
#[derive(Debug)]
pub struct TableScanState {
    column_ids: Vec<usize>,
    filter: Option<TableFilter>,
    snapshot: Snapshot,
    row_group_idx: usize,
    row_in_group: u64,
}

impl TableScanState {
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

/// Shared state of one parallel scan: a snapshot of the row-group list and
/// an atomic cursor handing each caller a distinct row group.
#[derive(Debug)]
pub struct ParallelTableScanState {
    row_groups: Vec<Arc<RowGroup>>,
    pub next_row_group_idx: AtomicUsize,
    pub total_row_groups: usize,
    column_ids: Vec<usize>,
    snapshot: Snapshot,
}

#[derive(Debug)]
pub struct DataTable {
    name: String,
    columns: RwLock<Vec<ColumnDefinition>>,
    pool: Arc<BufferPool>,
    block_manager: Arc<BlockManager>,
    row_groups: RwLock<Vec<Arc<RowGroup>>>,
    append_lock: Mutex<()>,
}

impl DataTable {
    pub fn new(
        pool: Arc<BufferPool>,
        block_manager: Arc<BlockManager>,
        columns: Vec<ColumnDefinition>,
        name: impl Into<String>,
    ) -> Self {
        DataTable {
            name: name.into(),
            columns: RwLock::new(columns),
            pool,
            block_manager,
            row_groups: RwLock::new(Vec::new()),
            append_lock: Mutex::new(()),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.name
    }

    pub fn block_manager(&self) -> &Arc<BlockManager> {
        &self.block_manager
    }

    pub fn columns(&self) -> Vec<ColumnDefinition> {
        self.columns.read().clone()
    }

    pub fn column_count(&self) -> usize {
        self.columns.read().len()
    }

    pub fn has_schema(&self) -> bool {
        !self.columns.read().is_empty()
    }

    pub fn copy_types(&self) -> Vec<LogicalType> {
        self.columns.read().iter().map(|c| c.ty.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.read().iter().position(|c| c.name == name)
    }

    pub fn primary_key_columns(&self) -> Vec<usize> {
        self.columns
            .read()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect()
    }

    /// Adopt a schema on a table created without one. Only legal while the
    /// table is empty.
    pub fn adopt_schema(&self, types: &[LogicalType]) -> Result<()> {
        if self.total_rows() > 0 {
            return Err(StorageError::Unsupported {
                operation: "schema adoption on a non-empty table",
            });
        }
        let mut columns = self.columns.write();
        if !columns.is_empty() {
            return Err(StorageError::AlreadyExists {
                what: format!("schema of table {}", self.name),
            });
        }
        *columns = types
            .iter()
            .enumerate()
            .map(|(i, ty)| ColumnDefinition::new(format!("col{i}"), ty.clone()))
            .collect();
        Ok(())
    }

    pub fn total_rows(&self) -> u64 {
        self.row_groups.read().iter().map(|rg| rg.count()).sum()
    }

    /// Live (non-tombstoned, committed) row count under the given snapshot.
    pub fn visible_rows(&self, snapshot: &Snapshot) -> u64 {
        let groups = self.row_groups.read();
        let mut total = 0;
        for group in groups.iter() {
            for row in 0..group.count() {
                if group.versions().row_is_visible(row, snapshot) {
                    total += 1;
                }
            }
        }
        total
    }

    pub fn row_group_count(&self) -> usize {
        self.row_groups.read().len()
    }

    // ---- append ---------------------------------------------------------

    /// Take the append lock and position the write at the current tail.
    pub fn append_lock(&self) -> TableAppendState<'_> {
        let guard = self.append_lock.lock();
        let row_start = self.total_rows();
        TableAppendState {
            _guard: guard,
            row_start,
            current_row: row_start,
        }
    }

    /// Append a chunk under the append lock. Rows are stamped with
    /// `stamp` (0 = immediately visible, or a transaction id).
    pub fn append(
        &self,
        chunk: &DataChunk,
        state: &mut TableAppendState<'_>,
        stamp: u64,
    ) -> Result<()> {
        self.check_chunk(chunk)?;
        let total = chunk.cardinality();
        let mut appended = 0;
        while appended < total {
            let group = self.writable_tail()?;
            let n = group.append(chunk, appended, total - appended, stamp)?;
            if n == 0 {
                self.push_row_group();
                continue;
            }
            appended += n;
        }
        state.current_row += total as u64;
        trace!(table = %self.name, rows = total, stamp, "appended chunk");
        Ok(())
    }

    /// Release the append lock. The rows' visibility is already governed by
    /// their version stamp.
    pub fn finalize_append(&self, state: TableAppendState<'_>) -> u64 {
        let appended = state.current_row - state.row_start;
        drop(state);
        appended
    }

    /// Promote a transaction's appended rows to a commit id.
    pub fn commit_append(&self, transaction_id: u64, commit_id: u64) {
        for group in self.row_groups.read().iter() {
            group.versions().commit_append(transaction_id, commit_id);
        }
    }

    /// Hide rows appended by an aborted transaction.
    pub fn revert_append(&self, row_start: u64, count: u64) {
        for group in self.row_groups.read().iter() {
            let group_end = group.start() + group.count();
            if group.start() >= row_start + count || group_end <= row_start {
                continue;
            }
            let local_start = row_start.saturating_sub(group.start());
            let local_end = (row_start + count - group.start()).min(group.count());
            group
                .versions()
                .revert_append(local_start, local_end - local_start);
        }
    }

    pub fn commit_deletes(&self, transaction_id: u64, commit_id: u64) {
        for group in self.row_groups.read().iter() {
            group.versions().commit_deletes(transaction_id, commit_id);
        }
    }

    pub fn revert_deletes(&self, transaction_id: u64) {
        for group in self.row_groups.read().iter() {
            group.versions().revert_deletes(transaction_id);
        }
    }

    fn check_chunk(&self, chunk: &DataChunk) -> Result<()> {
        let columns = self.columns.read();
        if chunk.column_count() != columns.len() {
            return Err(StorageError::SchemaMismatch {
                detail: format!(
                    "chunk has {} columns, table {} has {}",
                    chunk.column_count(),
                    self.name,
                    columns.len()
                ),
            });
        }
        for (idx, def) in columns.iter().enumerate() {
            if def.not_null {
                for row in 0..chunk.cardinality() {
                    if chunk.value(idx, row).is_null() {
                        return Err(StorageError::SchemaMismatch {
                            detail: format!("NULL in NOT NULL column {}", def.name),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn writable_tail(&self) -> Result<Arc<RowGroup>> {
        {
            let groups = self.row_groups.read();
            if let Some(tail) = groups.last() {
                if !tail.is_full() {
                    return Ok(Arc::clone(tail));
                }
            }
        }
        Ok(self.push_row_group())
    }

    fn push_row_group(&self) -> Arc<RowGroup> {
        let mut groups = self.row_groups.write();
        let start = groups
            .last()
            .map(|g| g.start() + g.count())
            .unwrap_or(0);
        let group = Arc::new(RowGroup::new(&self.pool, &self.copy_types(), start));
        groups.push(Arc::clone(&group));
        group
    }

    // ---- scans ----------------------------------------------------------

    pub fn initialize_scan(
        &self,
        column_ids: Vec<usize>,
        filter: Option<TableFilter>,
        snapshot: Snapshot,
    ) -> TableScanState {
        TableScanState {
            column_ids,
            filter,
            snapshot,
            row_group_idx: 0,
            row_in_group: 0,
        }
    }

    /// Read the next chunk. Returns false when the scan is exhausted.
    pub fn scan(&self, output: &mut DataChunk, state: &mut TableScanState) -> Result<bool> {
        let mut row_ids = Vec::new();
        self.scan_with_row_ids(output, &mut row_ids, state)
    }

    /// As [`DataTable::scan`], also reporting the absolute row id of every
    /// returned row.
    pub fn scan_with_row_ids(
        &self,
        output: &mut DataChunk,
        row_ids: &mut Vec<RowId>,
        state: &mut TableScanState,
    ) -> Result<bool> {
        let groups = self.row_groups.read().clone();
        let before = output.cardinality();
        while state.row_group_idx < groups.len() {
            let group = &groups[state.row_group_idx];
            let next = group.scan_rows(
                &state.column_ids,
                state.filter.as_ref(),
                &state.snapshot,
                state.row_in_group,
                VECTOR_CAPACITY,
                output,
                row_ids,
            )?;
            if next >= group.count() {
                state.row_group_idx += 1;
                state.row_in_group = 0;
            } else {
                state.row_in_group = next;
            }
            if output.cardinality() >= VECTOR_CAPACITY {
                break;
            }
        }
        Ok(output.cardinality() > before)
    }

    /// Snapshot the row-group list for a parallel scan.
    pub fn create_parallel_scan_state(&self, column_ids: Vec<usize>) -> ParallelTableScanState {
        let row_groups = self.row_groups.read().clone();
        ParallelTableScanState {
            total_row_groups: row_groups.len(),
            row_groups,
            next_row_group_idx: AtomicUsize::new(0),
            column_ids,
            snapshot: Snapshot {
                start_time: u64::MAX >> 2,
                transaction_id: 0,
            },
        }
    }

    /// Hand the caller the next unscanned row group. Each call returns a
    /// distinct row group; false once all are consumed.
    pub fn next_parallel_chunk(
        &self,
        state: &ParallelTableScanState,
        output: &mut DataChunk,
    ) -> Result<bool> {
        let idx = state.next_row_group_idx.fetch_add(1, Ordering::SeqCst);
        if idx >= state.row_groups.len() {
            return Ok(false);
        }
        let group = &state.row_groups[idx];
        let mut row_ids = Vec::new();
        group.scan_rows(
            &state.column_ids,
            None,
            &state.snapshot,
            0,
            group.count() as usize,
            output,
            &mut row_ids,
        )?;
        Ok(true)
    }

    /// Random fetch by row id vector.
    pub fn fetch(
        &self,
        output: &mut DataChunk,
        column_ids: &[usize],
        row_ids: &[RowId],
        snapshot: &Snapshot,
    ) -> Result<()> {
        let groups = self.row_groups.read().clone();
        for &row_id in row_ids {
            let Some(group) = find_row_group(&groups, row_id) else {
                continue;
            };
            if let Some(values) = group.fetch_row(row_id, column_ids, snapshot)? {
                output
                    .push_row(values)
                    .map_err(|e| StorageError::SchemaMismatch {
                        detail: e.to_string(),
                    })?;
            }
        }
        Ok(())
    }

    /// Sequentially hand `callback` chunks covering rows
    /// `[start, start + count)` in row-id order, under a snapshot that
    /// sees every committed write.
    pub fn scan_table_segment(
        &self,
        start: u64,
        count: u64,
        mut callback: impl FnMut(&DataChunk),
    ) -> Result<()> {
        let types = self.copy_types();
        let column_ids: Vec<usize> = (0..types.len()).collect();
        let snapshot = Snapshot {
            start_time: u64::MAX >> 2,
            transaction_id: 0,
        };
        let groups = self.row_groups.read().clone();
        let mut remaining = count;
        let mut position = start;
        for group in groups.iter() {
            if remaining == 0 {
                break;
            }
            let group_end = group.start() + group.count();
            if position >= group_end {
                continue;
            }
            let mut row = position - group.start();
            while row < group.count() && remaining > 0 {
                let mut chunk = DataChunk::new(&types);
                let mut row_ids = Vec::new();
                let next = group.scan_rows(
                    &column_ids,
                    None,
                    &snapshot,
                    row,
                    VECTOR_CAPACITY.min(remaining as usize),
                    &mut chunk,
                    &mut row_ids,
                )?;
                if chunk.cardinality() == 0 {
                    break;
                }
                remaining -= chunk.cardinality() as u64;
                callback(&chunk);
                row = next;
            }
            position = group_end;
        }
        Ok(())
    }

    // ---- updates and deletes -------------------------------------------

    /// Update the named columns of the given rows.
    ///
    /// Fixed-width columns are overwritten in place inside their segments;
    /// any variable-width target makes the row be tombstoned and re-appended
    /// with the new values.
    pub fn update(
        &self,
        row_ids: &[RowId],
        columns: &[usize],
        values_per_row: &[Vec<Value>],
        stamp: u64,
    ) -> Result<u64> {
        let defs = self.columns();
        let all_fixed = columns
            .iter()
            .all(|&c| defs[c].ty.physical_type().is_fixed_width());
        let groups = self.row_groups.read().clone();
        let mut updated = 0;

        if all_fixed {
            for (&row_id, values) in row_ids.iter().zip(values_per_row) {
                let Some(group) = find_row_group(&groups, row_id) else {
                    continue;
                };
                for (&column, value) in columns.iter().zip(values) {
                    group.update_row(row_id, column, value)?;
                }
                updated += 1;
            }
            return Ok(updated);
        }

        // variable width: rewrite via tombstone + append
        let all_columns: Vec<usize> = (0..defs.len()).collect();
        let snapshot = Snapshot {
            start_time: u64::MAX >> 2,
            transaction_id: stamp,
        };
        let mut rewritten = DataChunk::new(&self.copy_types());
        for (&row_id, values) in row_ids.iter().zip(values_per_row) {
            let Some(group) = find_row_group(&groups, row_id) else {
                continue;
            };
            let Some(mut row) = group.fetch_row(row_id, &all_columns, &snapshot)? else {
                continue;
            };
            for (&column, value) in columns.iter().zip(values) {
                row[column] = value.clone();
            }
            if group.delete_row(row_id, stamp) {
                rewritten
                    .push_row(row)
                    .map_err(|e| StorageError::SchemaMismatch {
                        detail: e.to_string(),
                    })?;
                updated += 1;
            }
        }
        if !rewritten.is_empty() {
            let mut state = self.append_lock();
            self.append(&rewritten, &mut state, stamp)?;
            self.finalize_append(state);
        }
        Ok(updated)
    }

    /// Tombstone the given rows. Returns how many tombstones were created.
    pub fn delete_rows(&self, row_ids: &[RowId], stamp: u64) -> u64 {
        let groups = self.row_groups.read().clone();
        let mut deleted = 0;
        for &row_id in row_ids {
            if let Some(group) = find_row_group(&groups, row_id) {
                if group.delete_row(row_id, stamp) {
                    deleted += 1;
                }
            }
        }
        deleted
    }

    // ---- checkpoint and load -------------------------------------------

    /// Flush all row groups through a partial block manager and write the
    /// table descriptor into the metadata overlay. Returns the descriptor's
    /// root pointer.
    pub fn checkpoint(&self, meta: &MetadataManager) -> Result<BlockPointer> {
        let mut partial = PartialBlockManager::new(Arc::clone(&self.block_manager));
        let row_groups = self
            .row_groups
            .read()
            .iter()
            .map(|rg| rg.checkpoint(&mut partial))
            .collect::<Result<Vec<_>>>()?;
        partial.flush()?;

        let descriptor = PersistentTableData {
            name: self.name.clone(),
            columns: self.columns(),
            row_groups,
        };
        let payload = rmp_serde::to_vec(&descriptor).map_err(|e| StorageError::Serialize {
            what: "table descriptor",
            detail: e.to_string(),
        })?;
        let mut writer = MetadataWriter::new(meta);
        writer.write_blob(&payload)?;
        writer.flush()?;
        debug!(table = %self.name, bytes = payload.len(), "checkpointed table");
        Ok(writer.block_pointer())
    }

    /// Rebuild a table from a descriptor written by [`DataTable::checkpoint`].
    pub fn load_from_disk(
        pool: Arc<BufferPool>,
        block_manager: Arc<BlockManager>,
        meta: &MetadataManager,
        pointer: BlockPointer,
    ) -> Result<Self> {
        let mut reader = MetadataReader::new(meta, pointer);
        let payload = reader.read_blob()?;
        let descriptor: PersistentTableData =
            rmp_serde::from_slice(&payload).map_err(|e| StorageError::Deserialize {
                what: "table descriptor",
                detail: e.to_string(),
            })?;
        let types: Vec<LogicalType> = descriptor.columns.iter().map(|c| c.ty.clone()).collect();
        let row_groups = descriptor
            .row_groups
            .iter()
            .map(|rg| RowGroup::load(&pool, &block_manager, &types, rg).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        debug!(table = %descriptor.name, row_groups = row_groups.len(), "loaded table");
        Ok(DataTable {
            name: descriptor.name,
            columns: RwLock::new(descriptor.columns),
            pool,
            block_manager,
            row_groups: RwLock::new(row_groups),
            append_lock: Mutex::new(()),
        })
    }

    // ---- vacuum ---------------------------------------------------------

    /// Rewrite the table without rows whose tombstones are older than every
    /// active snapshot. Row ids are reassigned densely; secondary indexes
    /// must be rebuilt by the caller.
    pub fn vacuum(&self, oldest_active: u64) -> Result<u64> {
        let _guard = self.append_lock.lock();
        let snapshot = Snapshot {
            start_time: oldest_active,
            transaction_id: 0,
        };
        let types = self.copy_types();
        let column_ids: Vec<usize> = (0..types.len()).collect();
        let old_groups = self.row_groups.read().clone();

        let mut survivors = DataChunk::new(&types);
        let mut dropped = 0;
        let mut fresh: Vec<Arc<RowGroup>> = Vec::new();
        let flush =
            |survivors: &mut DataChunk, fresh: &mut Vec<Arc<RowGroup>>| -> Result<()> {
                if survivors.is_empty() {
                    return Ok(());
                }
                let start = fresh.iter().map(|g: &Arc<RowGroup>| g.count()).sum();
                let group = Arc::new(RowGroup::new(&self.pool, &types, start));
                let mut offset = 0;
                while offset < survivors.cardinality() {
                    let n = group.append(survivors, offset, survivors.cardinality() - offset, 0)?;
                    if n == 0 {
                        break;
                    }
                    offset += n;
                }
                fresh.push(group);
                *survivors = DataChunk::new(&types);
                Ok(())
            };

        for group in old_groups.iter() {
            for row in 0..group.count() {
                if group.versions().row_is_visible(row, &snapshot) {
                    if let Some(values) =
                        group.fetch_row(group.start() + row, &column_ids, &snapshot)?
                    {
                        survivors
                            .push_row(values)
                            .map_err(|e| StorageError::SchemaMismatch {
                                detail: e.to_string(),
                            })?;
                        if survivors.cardinality() as u64 == ROW_GROUP_CAPACITY {
                            flush(&mut survivors, &mut fresh)?;
                        }
                        continue;
                    }
                }
                dropped += 1;
            }
        }
        flush(&mut survivors, &mut fresh)?;
        *self.row_groups.write() = fresh;
        debug!(table = %self.name, dropped, "vacuumed table");
        Ok(dropped)
    }
}

fn find_row_group(groups: &[Arc<RowGroup>], row_id: RowId) -> Option<&Arc<RowGroup>> {
    groups
        .iter()
        .find(|g| row_id >= g.start() && row_id < g.start() + g.count())
}
