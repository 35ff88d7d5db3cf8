//! The engine: catalog, tables, transactions, WAL, and the request surface.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use oxbow_catalog::{CatalogStorage, ColumnEntry, SequenceEntry, TableEntry, TableStorageMode};
use oxbow_index::IndexEngine;
use oxbow_storage::{
    BlockManager, BufferPool, ColumnDefinition, DataTable, MetadataManager, Snapshot,
    TransactionManager,
};
use oxbow_types::{DataChunk, RowId, TableFilter, Value};
use oxbow_wal::{WalEntry, WalReader, WalWriter};

use crate::cursor::Cursor;
use crate::error::{EngineError, ErrorCode, Result};
use crate::exec::{self, FunctionRegistry};
use crate::request::{DeleteRequest, Request, SelectRequest, UpdateRequest};
use crate::settings::Settings;

/// Buffer pool budget: 1 GiB of resident block memory.
const BUFFER_POOL_CAPACITY: usize = 1 << 30;

/// Watermark file recording the WAL id covered by the last checkpoint.
const WAL_CHECKPOINT_FILE: &str = ".wal_checkpoint";

pub type SessionId = u64;

/// One attached table: storage plus its secondary indexes.
pub struct TableHandle {
    pub table: Arc<DataTable>,
    pub indexes: IndexEngine,
    pub mode: TableStorageMode,
}

#[derive(Default)]
struct TxnTouches {
    /// (database, table, row_start, row_count) per append.
    appends: Vec<(String, String, u64, u64)>,
    /// Tables with tombstones or updates from this transaction.
    tables: HashSet<(String, String)>,
}

/// An embedded oxbow engine.
///
/// Opening an engine loads the catalog, attaches every table (loading disk
/// tables from their block files), and replays committed WAL records past
/// the last checkpoint watermark.
pub struct Engine {
    settings: Settings,
    pool: Arc<BufferPool>,
    catalog: CatalogStorage,
    txn_manager: TransactionManager,
    registry: FunctionRegistry,
    wal: Option<WalWriter>,
    tables: RwLock<HashMap<(String, String), Arc<TableHandle>>>,
    touches: Mutex<HashMap<u64, TxnTouches>>,
}

impl Engine {
    pub fn open(settings: Settings) -> Result<Self> {
        crate::settings::init_logging(&settings.log);
        fs::create_dir_all(&settings.main_path).ok();
        if let Some(dir) = settings.disk_directory() {
            fs::create_dir_all(dir).ok();
        }
        if let Some(dir) = settings.wal_directory() {
            fs::create_dir_all(dir).ok();
        }

        let catalog = if settings.main_path.as_os_str().is_empty() {
            CatalogStorage::in_memory()
        } else {
            CatalogStorage::new(settings.catalog_path())
        };
        catalog.load().map_err(EngineError::from)?;

        let wal = match settings.wal_directory() {
            Some(dir) => Some(
                WalWriter::open(dir, 0, settings.wal.sync_to_disk).map_err(EngineError::from)?,
            ),
            None => None,
        };

        let engine = Engine {
            pool: BufferPool::new(BUFFER_POOL_CAPACITY),
            catalog,
            txn_manager: TransactionManager::new(),
            registry: FunctionRegistry::new(),
            wal,
            tables: RwLock::new(HashMap::new()),
            touches: Mutex::new(HashMap::new()),
            settings,
        };

        // attach every cataloged table
        for database in engine.catalog.databases() {
            for entry in engine.catalog.tables(&database) {
                let handle = engine.attach_table(&database, &entry)?;
                engine
                    .tables
                    .write()
                    .insert((database.clone(), entry.name.clone()), handle);
            }
        }

        engine.replay_wal()?;
        info!(
            databases = engine.catalog.databases().len(),
            "engine opened"
        );
        Ok(engine)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.txn_manager
    }

    // ---- request dispatch ----------------------------------------------

    pub fn execute(&self, session: SessionId, request: Request) -> Cursor {
        match request {
            Request::CreateDatabase { database } => self.create_database(&database).into(),
            Request::DropDatabase { database } => self.drop_database(&database).into(),
            Request::CreateTable {
                database,
                table,
                columns,
                storage_mode,
            } => self
                .create_table(&database, &table, columns, storage_mode)
                .into(),
            Request::DropTable { database, table } => self.drop_table(&database, &table).into(),
            Request::CreateIndex {
                database,
                table,
                name,
                column,
            } => self.create_index(&database, &table, &name, &column).into(),
            Request::DropIndex {
                database,
                table,
                name,
            } => self.drop_index(&database, &table, &name).into(),
            Request::Insert {
                database,
                table,
                chunk,
            } => self.insert(session, &database, &table, chunk).into(),
            Request::Delete {
                database,
                table,
                request,
            } => self.delete(session, &database, &table, &request).into(),
            Request::Update {
                database,
                table,
                request,
            } => self.update(session, &database, &table, &request).into(),
            Request::Select {
                database,
                table,
                request,
            } => self.select(session, &database, &table, &request).into(),
            Request::Checkpoint => self.checkpoint().into(),
            Request::Vacuum { database, table } => self.vacuum(&database, &table).into(),
        }
    }

    // ---- DDL ------------------------------------------------------------

    pub fn create_database(&self, database: &str) -> Result<Cursor> {
        if self.catalog.database_exists(database) {
            return Err(EngineError::new(
                ErrorCode::DatabaseAlreadyExists,
                format!("database {database} already exists"),
            ));
        }
        self.catalog.append_database(database)?;
        debug!(database, "created database");
        Ok(Cursor::success(0))
    }

    pub fn drop_database(&self, database: &str) -> Result<Cursor> {
        if !self.catalog.database_exists(database) {
            return Err(EngineError::database_not_exists(database));
        }
        let tables: Vec<TableEntry> = self.catalog.tables(database);
        for entry in tables {
            self.drop_table(database, &entry.name)?;
        }
        self.catalog.remove_database(database)?;
        Ok(Cursor::success(0))
    }

    pub fn create_table(
        &self,
        database: &str,
        table: &str,
        columns: Vec<ColumnDefinition>,
        storage_mode: TableStorageMode,
    ) -> Result<Cursor> {
        if !self.catalog.database_exists(database) {
            return Err(EngineError::database_not_exists(database));
        }
        if self.catalog.find_table(database, table).is_some() {
            return Err(EngineError::new(
                ErrorCode::CollectionAlreadyExists,
                format!("table {database}.{table} already exists"),
            ));
        }
        let mut entry = TableEntry::new(table, storage_mode);
        entry.columns = columns
            .iter()
            .map(|c| ColumnEntry {
                name: c.name.clone(),
                ty: c.ty.clone(),
                not_null: c.not_null,
                has_default: c.default.is_some(),
            })
            .collect();
        entry.primary_key_columns = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        self.catalog.append_table(database, entry.clone())?;

        let handle = self.attach_table(database, &entry)?;
        self.tables
            .write()
            .insert((database.to_string(), table.to_string()), handle);
        debug!(database, table, ?storage_mode, "created table");
        Ok(Cursor::success(0))
    }

    pub fn drop_table(&self, database: &str, table: &str) -> Result<Cursor> {
        let removed = self
            .tables
            .write()
            .remove(&(database.to_string(), table.to_string()));
        if removed.is_none() {
            return Err(EngineError::collection_not_exists(database, table));
        }
        self.catalog.remove_table(database, table)?;
        if let Some(path) = self.table_file_path(database, table) {
            fs::remove_file(path).ok();
        }
        Ok(Cursor::success(0))
    }

    pub fn create_index(
        &self,
        database: &str,
        table: &str,
        name: &str,
        column: &str,
    ) -> Result<Cursor> {
        let handle = self.handle(database, table)?;
        let column_idx = handle.table.column_index(column).ok_or_else(|| {
            EngineError::new(
                ErrorCode::IndexCreateFail,
                format!("column {column} does not exist on {database}.{table}"),
            )
        })?;
        let disk = handle.mode == TableStorageMode::Disk && self.settings.disk.on;
        let index = handle
            .indexes
            .create_index(name, vec![column.to_string()], disk)?;

        // backfill from every visible row
        let snapshot = Snapshot::latest(&self.txn_manager);
        let mut state =
            handle
                .table
                .initialize_scan(vec![column_idx], None, snapshot);
        let types = vec![handle.table.copy_types()[column_idx].clone()];
        loop {
            let mut chunk = DataChunk::new(&types);
            let mut row_ids: Vec<RowId> = Vec::new();
            if !handle
                .table
                .scan_with_row_ids(&mut chunk, &mut row_ids, &mut state)?
            {
                break;
            }
            for (row, &row_id) in row_ids.iter().enumerate() {
                index.insert(&chunk.value(0, row), row_id)?;
            }
        }
        debug!(database, table, index = name, "created index");
        Ok(Cursor::success(0))
    }

    pub fn drop_index(&self, database: &str, table: &str, name: &str) -> Result<Cursor> {
        let handle = self.handle(database, table)?;
        handle.indexes.drop_index(name)?;
        Ok(Cursor::success(0))
    }

    // ---- transactions ---------------------------------------------------

    pub fn begin_transaction(&self, session: SessionId) -> u64 {
        self.txn_manager.begin_transaction(session).id()
    }

    /// Commit the session's transaction: write the WAL commit marker, then
    /// promote the transaction's rows and tombstones to the commit id.
    pub fn commit(&self, session: SessionId) -> Result<u64> {
        let Some(txn) = self.txn_manager.find_transaction(session) else {
            return Ok(0);
        };
        let txn_id = txn.id();
        if let Some(wal) = &self.wal {
            wal.append_commit(txn_id)?;
        }
        let commit_id = self.txn_manager.commit(session);
        if let Some(touches) = self.touches.lock().remove(&txn_id) {
            for (database, table) in &touches.tables {
                if let Ok(handle) = self.handle(database, table) {
                    handle.table.commit_append(txn_id, commit_id);
                    handle.table.commit_deletes(txn_id, commit_id);
                }
            }
            for (database, table, _, _) in &touches.appends {
                if let Ok(handle) = self.handle(database, table) {
                    handle.table.commit_append(txn_id, commit_id);
                }
            }
        }
        debug!(txn_id, commit_id, "committed transaction");
        Ok(commit_id)
    }

    /// Abort the session's transaction, hiding its rows and dropping its
    /// tombstones.
    pub fn abort(&self, session: SessionId) -> Result<()> {
        let Some(txn) = self.txn_manager.find_transaction(session) else {
            return Ok(());
        };
        let txn_id = txn.id();
        self.txn_manager.abort(session);
        if let Some(touches) = self.touches.lock().remove(&txn_id) {
            for (database, table, row_start, count) in &touches.appends {
                if let Ok(handle) = self.handle(database, table) {
                    handle.table.revert_append(*row_start, *count);
                    self.rebuild_indexes(&handle)?;
                }
            }
            for (database, table) in &touches.tables {
                if let Ok(handle) = self.handle(database, table) {
                    handle.table.revert_deletes(txn_id);
                }
            }
        }
        debug!(txn_id, "aborted transaction");
        Ok(())
    }

    // ---- DML ------------------------------------------------------------

    pub fn insert(
        &self,
        session: SessionId,
        database: &str,
        table: &str,
        chunk: DataChunk,
    ) -> Result<Cursor> {
        let handle = self.handle(database, table)?;
        if !handle.table.has_schema() {
            handle.table.adopt_schema(&chunk.types())?;
        }
        let txn = self.txn_manager.find_transaction(session);
        let stamp = txn.as_ref().map(|t| t.id()).unwrap_or(0);

        let mut state = handle.table.append_lock();
        let row_start = state.row_start;
        handle.table.append(&chunk, &mut state, stamp)?;
        let appended = handle.table.finalize_append(state);

        self.index_inserted_rows(&handle, &chunk, row_start)?;

        if let Some(wal) = &self.wal {
            wal.append(
                stamp,
                &WalEntry::PhysicalInsert {
                    database: database.to_string(),
                    table: table.to_string(),
                    chunk,
                    row_start,
                    row_count: appended,
                },
            )?;
        }
        if let Some(txn) = txn {
            let mut touches = self.touches.lock();
            let entry = touches.entry(txn.id()).or_default();
            entry
                .appends
                .push((database.to_string(), table.to_string(), row_start, appended));
        }
        Ok(Cursor::success(appended))
    }

    pub fn delete(
        &self,
        session: SessionId,
        database: &str,
        table: &str,
        request: &DeleteRequest,
    ) -> Result<Cursor> {
        let handle = self.handle(database, table)?;
        let txn = self.txn_manager.find_transaction(session);
        let stamp = txn.as_ref().map(|t| t.id()).unwrap_or(0);
        let snapshot = self.snapshot_for(session);

        let (chunk, mut row_ids) =
            self.collect_matches(&handle, request.filter.as_ref(), &snapshot)?;
        if let Some(limit) = request.limit {
            row_ids.truncate(limit);
        }
        let deleted = handle.table.delete_rows(&row_ids, stamp);

        // drop index entries of the removed rows
        for index in handle.indexes.all_indexes() {
            if let Some(column_idx) = index
                .columns()
                .first()
                .and_then(|name| handle.table.column_index(name))
            {
                for (row, &row_id) in row_ids.iter().enumerate() {
                    index.remove(&chunk.value(column_idx, row), row_id)?;
                }
            }
        }

        if let Some(wal) = &self.wal {
            wal.append(
                stamp,
                &WalEntry::PhysicalDelete {
                    database: database.to_string(),
                    table: table.to_string(),
                    row_ids: row_ids.clone(),
                    row_count: deleted,
                },
            )?;
        }
        if let Some(txn) = txn {
            self.touches
                .lock()
                .entry(txn.id())
                .or_default()
                .tables
                .insert((database.to_string(), table.to_string()));
        }
        Ok(Cursor::success(deleted))
    }

    pub fn update(
        &self,
        session: SessionId,
        database: &str,
        table: &str,
        request: &UpdateRequest,
    ) -> Result<Cursor> {
        let handle = self.handle(database, table)?;
        let txn = self.txn_manager.find_transaction(session);
        let stamp = txn.as_ref().map(|t| t.id()).unwrap_or(0);
        let snapshot = self.snapshot_for(session);

        let (_, mut row_ids) =
            self.collect_matches(&handle, request.filter.as_ref(), &snapshot)?;
        if let Some(limit) = request.limit {
            row_ids.truncate(limit);
        }

        if row_ids.is_empty() {
            if !request.upsert {
                return Ok(Cursor::success(0));
            }
            // upsert: build one fresh row from the assignments
            let types = handle.table.copy_types();
            let mut row = vec![Value::Null; types.len()];
            for assignment in &request.assignments {
                row[assignment.column] = assignment.value.clone();
            }
            let mut chunk = DataChunk::new(&types);
            chunk
                .push_row(row)
                .map_err(|e| EngineError::new(ErrorCode::SchemaError, e.to_string()))?;
            return self.insert(session, database, table, chunk);
        }

        let columns: Vec<usize> = request.assignments.iter().map(|a| a.column).collect();
        let values_per_row: Vec<Vec<Value>> = row_ids
            .iter()
            .map(|_| request.assignments.iter().map(|a| a.value.clone()).collect())
            .collect();
        let updated = handle
            .table
            .update(&row_ids, &columns, &values_per_row, stamp)?;

        // indexes over assigned columns are rebuilt: in-place updates keep
        // row ids but change keys, rewrites change row ids
        self.rebuild_indexes(&handle)?;

        if let Some(wal) = &self.wal {
            let types = handle.table.copy_types();
            let mut new_rows = DataChunk::new(&types);
            handle
                .table
                .fetch(&mut new_rows, &(0..types.len()).collect::<Vec<_>>(), &row_ids, &snapshot)?;
            wal.append(
                stamp,
                &WalEntry::PhysicalUpdate {
                    database: database.to_string(),
                    table: table.to_string(),
                    row_ids: row_ids.clone(),
                    chunk: new_rows,
                    row_count: updated,
                },
            )?;
        }
        if let Some(txn) = txn {
            self.touches
                .lock()
                .entry(txn.id())
                .or_default()
                .tables
                .insert((database.to_string(), table.to_string()));
        }
        Ok(Cursor::success(updated))
    }

    pub fn select(
        &self,
        session: SessionId,
        database: &str,
        table: &str,
        request: &SelectRequest,
    ) -> Result<Cursor> {
        let handle = self.handle(database, table)?;
        let snapshot = self.snapshot_for(session);
        let chunk = exec::run_select(
            &handle.table,
            &handle.indexes,
            &self.registry,
            request,
            &snapshot,
        )?;
        Ok(Cursor::from_chunk(chunk))
    }

    // ---- checkpoint and vacuum -----------------------------------------

    /// Flush every disk table through the checkpoint pipeline, update the
    /// file headers, and advance the WAL watermark.
    pub fn checkpoint(&self) -> Result<Cursor> {
        let handles: Vec<(String, String, Arc<TableHandle>)> = {
            let tables = self.tables.read();
            tables
                .iter()
                .map(|((db, tbl), handle)| (db.clone(), tbl.clone(), Arc::clone(handle)))
                .collect()
        };
        let mut checkpointed = 0;
        for (database, table, handle) in handles {
            if handle.mode != TableStorageMode::Disk || handle.table.block_manager().in_memory() {
                continue;
            }
            let manager = Arc::clone(handle.table.block_manager());
            let meta = MetadataManager::new(Arc::clone(&manager));
            let pointer = handle.table.checkpoint(&meta)?;
            let mut header = manager.header()?;
            header.meta_root = pointer;
            header.next_free_block_id = manager.total_blocks()? + manager.free_blocks()?;
            manager.write_header(&header)?;
            debug!(%database, %table, "checkpointed table");
            checkpointed += 1;
        }
        if let Some(wal) = &self.wal {
            self.write_wal_watermark(wal.last_assigned_id())?;
        }
        Ok(Cursor::success(checkpointed))
    }

    /// Drop rows whose tombstones predate every active snapshot, rewriting
    /// the table densely. Indexes are rebuilt because row ids move.
    pub fn vacuum(&self, database: &str, table: &str) -> Result<Cursor> {
        let handle = self.handle(database, table)?;
        let dropped = handle
            .table
            .vacuum(self.txn_manager.lowest_active_start_time())?;
        self.rebuild_indexes(&handle)?;
        Ok(Cursor::success(dropped))
    }

    // ---- internals ------------------------------------------------------

    pub fn handle(&self, database: &str, table: &str) -> Result<Arc<TableHandle>> {
        let tables = self.tables.read();
        tables
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .ok_or_else(|| {
                if self.catalog.database_exists(database) {
                    EngineError::collection_not_exists(database, table)
                } else {
                    EngineError::database_not_exists(database)
                }
            })
    }

    pub fn sequence_next_value(&self, database: &str, name: &str) -> Result<Option<i64>> {
        Ok(self.catalog.sequence_next_value(database, name)?)
    }

    pub fn create_sequence(&self, database: &str, sequence: SequenceEntry) -> Result<()> {
        Ok(self.catalog.append_sequence(database, sequence)?)
    }

    pub fn catalog(&self) -> &CatalogStorage {
        &self.catalog
    }

    fn snapshot_for(&self, session: SessionId) -> Snapshot {
        match self.txn_manager.find_transaction(session) {
            Some(txn) => txn.snapshot(),
            None => Snapshot::latest(&self.txn_manager),
        }
    }

    fn table_file_path(&self, database: &str, table: &str) -> Option<PathBuf> {
        self.settings
            .disk_directory()
            .map(|dir| dir.join(format!("{database}.{table}.oxb")))
    }

    fn attach_table(&self, database: &str, entry: &TableEntry) -> Result<Arc<TableHandle>> {
        let columns: Vec<ColumnDefinition> = entry
            .columns
            .iter()
            .map(|c| {
                let mut def = ColumnDefinition::new(c.name.clone(), c.ty.clone());
                def.not_null = c.not_null;
                def.primary_key = entry.primary_key_columns.contains(&c.name);
                def
            })
            .collect();

        let use_disk = entry.storage_mode == TableStorageMode::Disk && self.settings.disk.on;
        let (table, mode) = if use_disk {
            let path = self
                .table_file_path(database, &entry.name)
                .expect("disk directory configured");
            if path.exists() {
                let manager = Arc::new(BlockManager::open_file(&path)?);
                let meta_root = manager.meta_root()?;
                let table = if meta_root.is_valid() {
                    let meta = MetadataManager::new(Arc::clone(&manager));
                    DataTable::load_from_disk(
                        Arc::clone(&self.pool),
                        Arc::clone(&manager),
                        &meta,
                        meta_root,
                    )?
                } else {
                    DataTable::new(Arc::clone(&self.pool), manager, columns, &entry.name)
                };
                (table, TableStorageMode::Disk)
            } else {
                let manager = Arc::new(BlockManager::create_file(
                    &path,
                    oxbow_storage::DEFAULT_BLOCK_SIZE,
                )?);
                (
                    DataTable::new(Arc::clone(&self.pool), manager, columns, &entry.name),
                    TableStorageMode::Disk,
                )
            }
        } else {
            let manager = Arc::new(BlockManager::new_in_memory());
            (
                DataTable::new(Arc::clone(&self.pool), manager, columns, &entry.name),
                TableStorageMode::InMemory,
            )
        };

        let index_dir = self.settings.disk_directory().map(|dir| {
            dir.join(format!("{database}.{}.idx", entry.name))
        });
        if let Some(dir) = &index_dir {
            fs::create_dir_all(dir).ok();
        }
        Ok(Arc::new(TableHandle {
            table: Arc::new(table),
            indexes: IndexEngine::new(index_dir),
            mode,
        }))
    }

    fn index_inserted_rows(
        &self,
        handle: &TableHandle,
        chunk: &DataChunk,
        row_start: RowId,
    ) -> Result<()> {
        for index in handle.indexes.all_indexes() {
            let Some(column_idx) = index
                .columns()
                .first()
                .and_then(|name| handle.table.column_index(name))
            else {
                continue;
            };
            for row in 0..chunk.cardinality() {
                index.insert(&chunk.value(column_idx, row), row_start + row as u64)?;
            }
        }
        Ok(())
    }

    /// Rebuild every index of a table from its current visible rows.
    fn rebuild_indexes(&self, handle: &TableHandle) -> Result<()> {
        let snapshot = Snapshot::latest(&self.txn_manager);
        for index in handle.indexes.all_indexes() {
            let Some(column_idx) = index
                .columns()
                .first()
                .and_then(|name| handle.table.column_index(name))
            else {
                continue;
            };
            index.clear()?;
            let mut state =
                handle
                    .table
                    .initialize_scan(vec![column_idx], None, snapshot);
            let types = vec![handle.table.copy_types()[column_idx].clone()];
            loop {
                let mut chunk = DataChunk::new(&types);
                let mut row_ids: Vec<RowId> = Vec::new();
                if !handle
                    .table
                    .scan_with_row_ids(&mut chunk, &mut row_ids, &mut state)?
                {
                    break;
                }
                for (row, &row_id) in row_ids.iter().enumerate() {
                    index.insert(&chunk.value(0, row), row_id)?;
                }
            }
        }
        Ok(())
    }

    // ---- WAL replay -----------------------------------------------------

    fn wal_watermark_path(&self) -> Option<PathBuf> {
        self.settings
            .wal_directory()
            .map(|dir| dir.join(WAL_CHECKPOINT_FILE))
    }

    fn read_wal_watermark(&self) -> u64 {
        let Some(path) = self.wal_watermark_path() else {
            return 0;
        };
        match fs::read(&path) {
            Ok(bytes) if bytes.len() >= 8 => LittleEndian::read_u64(&bytes[..8]),
            _ => 0,
        }
    }

    fn write_wal_watermark(&self, wal_id: u64) -> Result<()> {
        if let Some(path) = self.wal_watermark_path() {
            let mut buf = [0u8; 8];
            LittleEndian::write_u64(&mut buf, wal_id);
            fs::write(&path, buf).map_err(|e| {
                EngineError::new(ErrorCode::OtherError, format!("watermark write failed: {e}"))
            })?;
        }
        Ok(())
    }

    fn replay_wal(&self) -> Result<()> {
        let Some(dir) = self.settings.wal_directory() else {
            return Ok(());
        };
        let after_id = self.read_wal_watermark();
        let reader = WalReader::open(dir);
        let records = reader.read_committed_records(after_id)?;
        if records.is_empty() {
            return Ok(());
        }
        info!(records = records.len(), after_id, "replaying WAL");
        for record in records {
            match record.entry {
                WalEntry::PhysicalInsert {
                    database,
                    table,
                    chunk,
                    ..
                } => {
                    let Ok(handle) = self.handle(&database, &table) else {
                        warn!(%database, %table, "WAL insert for unknown table; skipped");
                        continue;
                    };
                    if !handle.table.has_schema() {
                        handle.table.adopt_schema(&chunk.types())?;
                    }
                    let mut state = handle.table.append_lock();
                    handle.table.append(&chunk, &mut state, 0)?;
                    handle.table.finalize_append(state);
                }
                WalEntry::PhysicalDelete {
                    database,
                    table,
                    row_ids,
                    ..
                } => {
                    let Ok(handle) = self.handle(&database, &table) else {
                        continue;
                    };
                    handle.table.delete_rows(&row_ids, 0);
                }
                WalEntry::PhysicalUpdate {
                    database,
                    table,
                    row_ids,
                    chunk,
                    ..
                } => {
                    let Ok(handle) = self.handle(&database, &table) else {
                        continue;
                    };
                    let columns: Vec<usize> = (0..chunk.column_count()).collect();
                    let values_per_row: Vec<Vec<Value>> =
                        chunk.rows().collect();
                    handle
                        .table
                        .update(&row_ids, &columns, &values_per_row, 0)?;
                }
                WalEntry::Commit | WalEntry::Data => {}
            }
        }
        Ok(())
    }

    fn collect_matches(
        &self,
        handle: &TableHandle,
        filter: Option<&TableFilter>,
        snapshot: &Snapshot,
    ) -> Result<(DataChunk, Vec<RowId>)> {
        let types = handle.table.copy_types();
        let column_ids: Vec<usize> = (0..types.len()).collect();
        let mut state =
            handle
                .table
                .initialize_scan(column_ids, filter.cloned(), *snapshot);
        let mut chunk = DataChunk::new(&types);
        let mut row_ids = Vec::new();
        while handle
            .table
            .scan_with_row_ids(&mut chunk, &mut row_ids, &mut state)?
        {}
        Ok((chunk, row_ids))
    }
}

