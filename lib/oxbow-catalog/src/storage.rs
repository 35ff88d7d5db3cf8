use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tracing::{debug, trace};

use crate::entry::{
    DatabaseEntry, MacroEntry, SequenceEntry, TableEntry, ViewEntry,
};

/// File magic: "OBXC".
pub const CATALOG_MAGIC: [u8; 4] = *b"OBXC";
pub const CATALOG_VERSION: u32 = 1;

#[derive(Debug, Snafu)]
pub enum CatalogError {
    #[snafu(display("catalog I/O error during {operation}: {source}"))]
    Io {
        operation: &'static str,
        source: io::Error,
    },

    /// Magic, version, or checksum mismatch: the file is unusable.
    #[snafu(display("corrupted catalog file: {detail}"))]
    Corrupted { detail: String },

    #[snafu(display("failed to encode catalog payload: {detail}"))]
    Encode { detail: String },

    #[snafu(display("database {name} not found"))]
    DatabaseNotFound { name: String },
}

type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogPayload {
    databases: IndexMap<String, DatabaseEntry>,
}

/// The persistent catalog.
///
/// Mutations rewrite the whole file; readers see a consistent in-memory
/// copy guarded by a read-write lock. A catalog without a backing path
/// keeps everything in memory and never touches disk.
#[derive(Debug)]
pub struct CatalogStorage {
    path: Option<PathBuf>,
    payload: RwLock<CatalogPayload>,
}

impl CatalogStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        CatalogStorage {
            path: Some(path.as_ref().to_path_buf()),
            payload: RwLock::new(CatalogPayload::default()),
        }
    }

    /// A catalog that lives only in this process.
    pub fn in_memory() -> Self {
        CatalogStorage {
            path: None,
            payload: RwLock::new(CatalogPayload::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load the catalog from disk. A missing file yields an empty catalog;
    /// a present-but-invalid file is a hard error.
    pub fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no catalog file; starting empty");
                return Ok(());
            }
            Err(e) => {
                return Err(e).context(IoSnafu {
                    operation: "read catalog file",
                })
            }
        };
        if bytes.len() < 12 {
            return Err(CatalogError::Corrupted {
                detail: "file shorter than the envelope".into(),
            });
        }
        if bytes[0..4] != CATALOG_MAGIC {
            return Err(CatalogError::Corrupted {
                detail: "bad magic".into(),
            });
        }
        let version = LittleEndian::read_u32(&bytes[4..8]);
        if version != CATALOG_VERSION {
            return Err(CatalogError::Corrupted {
                detail: format!("unsupported version {version}"),
            });
        }
        let payload_bytes = &bytes[8..bytes.len() - 4];
        let stored = LittleEndian::read_u32(&bytes[bytes.len() - 4..]);
        let computed = crc32fast::hash(payload_bytes);
        if stored != computed {
            return Err(CatalogError::Corrupted {
                detail: format!("checksum mismatch: stored {stored:#x}, computed {computed:#x}"),
            });
        }
        let payload: CatalogPayload =
            rmp_serde::from_slice(payload_bytes).map_err(|e| CatalogError::Corrupted {
                detail: format!("payload decode failed: {e}"),
            })?;
        debug!(
            path = %path.display(),
            databases = payload.databases.len(),
            "loaded catalog"
        );
        *self.payload.write() = payload;
        Ok(())
    }

    /// Rewrite the catalog file in full.
    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let payload = self.payload.read();
        let encoded = rmp_serde::to_vec(&*payload).map_err(|e| CatalogError::Encode {
            detail: e.to_string(),
        })?;
        let mut file = Vec::with_capacity(encoded.len() + 12);
        file.extend_from_slice(&CATALOG_MAGIC);
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, CATALOG_VERSION);
        file.extend_from_slice(&buf);
        file.extend_from_slice(&encoded);
        LittleEndian::write_u32(&mut buf, crc32fast::hash(&encoded));
        file.extend_from_slice(&buf);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(IoSnafu {
                operation: "create catalog directory",
            })?;
        }
        fs::write(path, &file).context(IoSnafu {
            operation: "write catalog file",
        })?;
        trace!(bytes = file.len(), "saved catalog");
        Ok(())
    }

    // ---- databases ------------------------------------------------------

    pub fn append_database(&self, name: impl Into<String>) -> Result<()> {
        self.payload
            .write()
            .databases
            .entry(name.into())
            .or_default();
        self.save()
    }

    pub fn remove_database(&self, name: &str) -> Result<()> {
        self.payload.write().databases.shift_remove(name);
        self.save()
    }

    pub fn database_exists(&self, name: &str) -> bool {
        self.payload.read().databases.contains_key(name)
    }

    pub fn databases(&self) -> Vec<String> {
        self.payload.read().databases.keys().cloned().collect()
    }

    // ---- tables ---------------------------------------------------------

    pub fn append_table(&self, database: &str, table: TableEntry) -> Result<()> {
        self.with_database(database, |db| {
            db.tables.insert(table.name.clone(), table);
        })?;
        self.save()
    }

    pub fn remove_table(&self, database: &str, table: &str) -> Result<()> {
        self.with_database(database, |db| {
            db.tables.shift_remove(table);
        })?;
        self.save()
    }

    pub fn find_table(&self, database: &str, table: &str) -> Option<TableEntry> {
        self.payload
            .read()
            .databases
            .get(database)
            .and_then(|db| db.tables.get(table).cloned())
    }

    pub fn tables(&self, database: &str) -> Vec<TableEntry> {
        self.payload
            .read()
            .databases
            .get(database)
            .map(|db| db.tables.values().cloned().collect())
            .unwrap_or_default()
    }

    // ---- sequences ------------------------------------------------------

    pub fn append_sequence(&self, database: &str, sequence: SequenceEntry) -> Result<()> {
        self.with_database(database, |db| {
            db.sequences.insert(sequence.name.clone(), sequence);
        })?;
        self.save()
    }

    pub fn remove_sequence(&self, database: &str, name: &str) -> Result<()> {
        self.with_database(database, |db| {
            db.sequences.shift_remove(name);
        })?;
        self.save()
    }

    pub fn sequences(&self, database: &str) -> Vec<SequenceEntry> {
        self.payload
            .read()
            .databases
            .get(database)
            .map(|db| db.sequences.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Advance a sequence, persist the new state, and return the value.
    pub fn sequence_next_value(&self, database: &str, name: &str) -> Result<Option<i64>> {
        let value = {
            let mut payload = self.payload.write();
            let db = payload
                .databases
                .get_mut(database)
                .ok_or_else(|| CatalogError::DatabaseNotFound {
                    name: database.to_string(),
                })?;
            db.sequences.get_mut(name).and_then(|s| s.next_value())
        };
        if value.is_some() {
            self.save()?;
        }
        Ok(value)
    }

    // ---- views ----------------------------------------------------------

    pub fn append_view(&self, database: &str, view: ViewEntry) -> Result<()> {
        self.with_database(database, |db| {
            db.views.insert(view.name.clone(), view);
        })?;
        self.save()
    }

    pub fn remove_view(&self, database: &str, name: &str) -> Result<()> {
        self.with_database(database, |db| {
            db.views.shift_remove(name);
        })?;
        self.save()
    }

    pub fn views(&self, database: &str) -> Vec<ViewEntry> {
        self.payload
            .read()
            .databases
            .get(database)
            .map(|db| db.views.values().cloned().collect())
            .unwrap_or_default()
    }

    // ---- macros ---------------------------------------------------------

    pub fn append_macro(&self, database: &str, entry: MacroEntry) -> Result<()> {
        self.with_database(database, |db| {
            db.macros.insert(entry.name.clone(), entry);
        })?;
        self.save()
    }

    pub fn remove_macro(&self, database: &str, name: &str) -> Result<()> {
        self.with_database(database, |db| {
            db.macros.shift_remove(name);
        })?;
        self.save()
    }

    pub fn macros(&self, database: &str) -> Vec<MacroEntry> {
        self.payload
            .read()
            .databases
            .get(database)
            .map(|db| db.macros.values().cloned().collect())
            .unwrap_or_default()
    }

    fn with_database(
        &self,
        database: &str,
        f: impl FnOnce(&mut DatabaseEntry),
    ) -> Result<()> {
        let mut payload = self.payload.write();
        let db = payload
            .databases
            .get_mut(database)
            .ok_or_else(|| CatalogError::DatabaseNotFound {
                name: database.to_string(),
            })?;
        f(db);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{ColumnEntry, TableStorageMode};
    use oxbow_types::LogicalType;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::tempdir;

    #[test]
    fn create_and_drop_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.oxb");
        {
            let cs = CatalogStorage::new(&path);
            cs.append_database("db1").unwrap();
            cs.append_database("db2").unwrap();
            assert_eq!(cs.databases().len(), 2);
        }
        {
            let cs = CatalogStorage::new(&path);
            cs.load().unwrap();
            assert_eq!(cs.databases().len(), 2);
            assert!(cs.database_exists("db1"));
            cs.remove_database("db1").unwrap();
            assert_eq!(cs.databases().len(), 1);
            assert!(!cs.database_exists("db1"));
        }
    }

    #[test]
    fn storage_mode_distinction_survives_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.oxb");
        {
            let cs = CatalogStorage::new(&path);
            cs.append_database("db").unwrap();
            cs.append_table("db", TableEntry::new("mem_table", TableStorageMode::InMemory))
                .unwrap();
            let mut disk = TableEntry::new("disk_table", TableStorageMode::Disk);
            disk.columns
                .push(ColumnEntry::new("col1", LogicalType::Int32));
            cs.append_table("db", disk).unwrap();
        }
        {
            let cs = CatalogStorage::new(&path);
            cs.load().unwrap();
            let mem = cs.find_table("db", "mem_table").unwrap();
            let disk = cs.find_table("db", "disk_table").unwrap();
            assert_eq!(mem.storage_mode, TableStorageMode::InMemory);
            assert!(mem.columns.is_empty());
            assert_eq!(disk.storage_mode, TableStorageMode::Disk);
            assert_eq!(disk.columns.len(), 1);
            assert_eq!(disk.columns[0].name, "col1");
            assert_eq!(disk.columns[0].ty, LogicalType::Int32);
        }
    }

    #[test]
    fn full_round_trip_two_databases() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.oxb");
        {
            let cs = CatalogStorage::new(&path);
            cs.append_database("db1").unwrap();
            cs.append_database("db2").unwrap();

            let mut users = TableEntry::new("users", TableStorageMode::Disk);
            users.columns = vec![
                ColumnEntry::new("id", LogicalType::Int64),
                ColumnEntry::new("name", LogicalType::String),
            ];
            cs.append_table("db1", users).unwrap();
            cs.append_table("db1", TableEntry::new("logs", TableStorageMode::InMemory))
                .unwrap();

            let mut events = TableEntry::new("events", TableStorageMode::Disk);
            events.columns = vec![
                ColumnEntry::new("ts", LogicalType::Timestamp),
                ColumnEntry::new("data", LogicalType::Blob),
                ColumnEntry::new("count", LogicalType::UInt32),
            ];
            cs.append_table("db2", events).unwrap();
            cs.append_table("db2", TableEntry::new("cache", TableStorageMode::InMemory))
                .unwrap();
        }
        {
            let cs = CatalogStorage::new(&path);
            cs.load().unwrap();
            assert_eq!(cs.databases().len(), 2);
            assert_eq!(cs.tables("db1").len(), 2);
            assert_eq!(cs.tables("db2").len(), 2);

            let users = cs.find_table("db1", "users").unwrap();
            assert_eq!(users.columns[0].name, "id");
            assert_eq!(users.columns[1].name, "name");

            let events = cs.find_table("db2", "events").unwrap();
            assert_eq!(events.columns[0].ty, LogicalType::Timestamp);
            assert_eq!(events.columns[1].ty, LogicalType::Blob);
            assert_eq!(events.columns[2].ty, LogicalType::UInt32);

            let logs = cs.find_table("db1", "logs").unwrap();
            assert_eq!(logs.storage_mode, TableStorageMode::InMemory);
        }
    }

    #[test]
    fn constraint_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.oxb");
        {
            let cs = CatalogStorage::new(&path);
            cs.append_database("db").unwrap();
            let mut tbl = TableEntry::new("constrained", TableStorageMode::Disk);
            tbl.columns = vec![
                ColumnEntry {
                    name: "id".into(),
                    ty: LogicalType::Int64,
                    not_null: true,
                    has_default: false,
                },
                ColumnEntry {
                    name: "name".into(),
                    ty: LogicalType::String,
                    not_null: false,
                    has_default: true,
                },
            ];
            tbl.primary_key_columns = vec!["id".into()];
            cs.append_table("db", tbl).unwrap();
        }
        {
            let cs = CatalogStorage::new(&path);
            cs.load().unwrap();
            let tbl = cs.find_table("db", "constrained").unwrap();
            assert!(tbl.columns[0].not_null);
            assert!(!tbl.columns[0].has_default);
            assert!(!tbl.columns[1].not_null);
            assert!(tbl.columns[1].has_default);
            assert_eq!(tbl.primary_key_columns, vec!["id".to_string()]);
        }
    }

    #[test]
    fn sequence_view_macro_crud() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.oxb");
        {
            let cs = CatalogStorage::new(&path);
            cs.append_database("db").unwrap();

            let mut seq = SequenceEntry::new("seq1");
            seq.start_value = 10;
            seq.current_value = 10;
            seq.increment = 2;
            seq.max_value = 1000;
            cs.append_sequence("db", seq).unwrap();
            cs.append_sequence("db", SequenceEntry::new("seq2")).unwrap();

            cs.append_view(
                "db",
                ViewEntry {
                    name: "my_view".into(),
                    query_sql: "SELECT * FROM db.tbl WHERE id > 0".into(),
                },
            )
            .unwrap();

            cs.append_macro(
                "db",
                MacroEntry {
                    name: "add_one".into(),
                    parameters: vec!["x".into()],
                    body_sql: "x + 1".into(),
                },
            )
            .unwrap();
        }
        {
            let cs = CatalogStorage::new(&path);
            cs.load().unwrap();
            let seqs = cs.sequences("db");
            assert_eq!(seqs.len(), 2);
            assert_eq!(seqs[0].name, "seq1");
            assert_eq!(seqs[0].start_value, 10);
            assert_eq!(seqs[0].increment, 2);
            assert_eq!(seqs[0].max_value, 1000);

            assert_eq!(cs.sequence_next_value("db", "seq1").unwrap(), Some(10));
            assert_eq!(cs.sequence_next_value("db", "seq1").unwrap(), Some(12));

            let views = cs.views("db");
            assert_eq!(views.len(), 1);
            assert_eq!(views[0].query_sql, "SELECT * FROM db.tbl WHERE id > 0");
            cs.remove_view("db", "my_view").unwrap();
            assert!(cs.views("db").is_empty());

            let macros = cs.macros("db");
            assert_eq!(macros.len(), 1);
            assert_eq!(macros[0].parameters, vec!["x".to_string()]);
            cs.remove_macro("db", "add_one").unwrap();
            assert!(cs.macros("db").is_empty());
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let cs = CatalogStorage::new(dir.path().join("nope.oxb"));
        cs.load().unwrap();
        assert!(cs.databases().is_empty());
    }

    #[test]
    fn corruption_fails_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.oxb");
        {
            let cs = CatalogStorage::new(&path);
            cs.append_database("testdb").unwrap();
        }
        {
            let mut bytes = std::fs::read(&path).unwrap();
            bytes[10] ^= 0xFF;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .unwrap();
            file.seek(SeekFrom::Start(0)).unwrap();
            file.write_all(&bytes).unwrap();
        }
        let cs = CatalogStorage::new(&path);
        assert!(matches!(cs.load(), Err(CatalogError::Corrupted { .. })));
    }
}
