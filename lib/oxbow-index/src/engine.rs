//! Index engine: the collection of secondary indexes of one table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use snafu::Snafu;
use tracing::debug;

use oxbow_types::{CompareOp, RowId, Value};

use crate::btree::BTreeError;
use crate::disk::DiskIndex;
use crate::mem::MemoryIndex;

#[derive(Debug, Snafu)]
pub enum IndexError {
    #[snafu(display("index {name} already exists"))]
    AlreadyExists { name: String },

    #[snafu(display("index {name} does not exist"))]
    NotFound { name: String },

    #[snafu(display("index storage error: {source}"))]
    Storage { source: BTreeError },
}

type Result<T, E = IndexError> = std::result::Result<T, E>;

#[derive(Debug)]
enum IndexVariant {
    Memory(MemoryIndex),
    Disk(DiskIndex),
}

/// One secondary index, keyed by one or more column references.
#[derive(Debug)]
pub struct SingleColumnIndex {
    id: u64,
    name: String,
    columns: Vec<String>,
    variant: Mutex<IndexVariant>,
}

impl SingleColumnIndex {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_disk_backed(&self) -> bool {
        matches!(&*self.variant.lock(), IndexVariant::Disk(_))
    }

    pub fn insert(&self, key: &Value, row_id: RowId) -> Result<()> {
        match &mut *self.variant.lock() {
            IndexVariant::Memory(index) => {
                index.insert(key.clone(), row_id);
                Ok(())
            }
            IndexVariant::Disk(index) => {
                index.insert(key, row_id).map_err(|source| IndexError::Storage { source })
            }
        }
    }

    pub fn remove_value(&self, key: &Value) -> Result<()> {
        match &mut *self.variant.lock() {
            IndexVariant::Memory(index) => {
                index.remove_value(key);
                Ok(())
            }
            IndexVariant::Disk(index) => {
                index.remove_value(key).map_err(|source| IndexError::Storage { source })
            }
        }
    }

    pub fn remove(&self, key: &Value, row_id: RowId) -> Result<()> {
        match &mut *self.variant.lock() {
            IndexVariant::Memory(index) => {
                index.remove(key, row_id);
                Ok(())
            }
            IndexVariant::Disk(index) => {
                index.remove(key, row_id).map_err(|source| IndexError::Storage { source })
            }
        }
    }

    pub fn find(&self, key: &Value) -> Result<Vec<RowId>> {
        match &*self.variant.lock() {
            IndexVariant::Memory(index) => Ok(index.find(key)),
            IndexVariant::Disk(index) => {
                index.find(key).map_err(|source| IndexError::Storage { source })
            }
        }
    }

    pub fn lower_bound(&self, key: &Value) -> Result<Vec<RowId>> {
        match &*self.variant.lock() {
            IndexVariant::Memory(index) => Ok(index.lower_bound(key)),
            IndexVariant::Disk(index) => {
                index.lower_bound(key).map_err(|source| IndexError::Storage { source })
            }
        }
    }

    pub fn upper_bound(&self, key: &Value) -> Result<Vec<RowId>> {
        match &*self.variant.lock() {
            IndexVariant::Memory(index) => Ok(index.upper_bound(key)),
            IndexVariant::Disk(index) => {
                index.upper_bound(key).map_err(|source| IndexError::Storage { source })
            }
        }
    }

    fn all(&self) -> Result<Vec<RowId>> {
        match &*self.variant.lock() {
            IndexVariant::Memory(index) => Ok(index.all()),
            IndexVariant::Disk(index) => {
                index.all().map_err(|source| IndexError::Storage { source })
            }
        }
    }

    /// Discard every entry, e.g. before a rebuild after row ids moved.
    pub fn clear(&self) -> Result<()> {
        match &mut *self.variant.lock() {
            IndexVariant::Memory(index) => {
                index.clear();
                Ok(())
            }
            IndexVariant::Disk(index) => {
                index.clear().map_err(|source| IndexError::Storage { source })
            }
        }
    }

    /// Resolve a compare probe into row ids, per the range mapping:
    /// eq -> find; lt/gt -> strict bounds; lte/gte -> bound plus find;
    /// ne -> everything except find.
    pub fn search(&self, op: CompareOp, key: &Value) -> Result<Vec<RowId>> {
        match op {
            CompareOp::Eq => self.find(key),
            CompareOp::Lt => self.lower_bound(key),
            CompareOp::Gt => self.upper_bound(key),
            CompareOp::Lte => {
                let mut rows = self.lower_bound(key)?;
                rows.extend(self.find(key)?);
                Ok(rows)
            }
            CompareOp::Gte => {
                let mut rows = self.find(key)?;
                rows.extend(self.upper_bound(key)?);
                Ok(rows)
            }
            CompareOp::Ne => {
                let mut rows = self.lower_bound(key)?;
                rows.extend(self.upper_bound(key)?);
                Ok(rows)
            }
        }
    }
}

/// All indexes of one table, addressable by name, id, or key prefix.
#[derive(Debug)]
pub struct IndexEngine {
    directory: Option<PathBuf>,
    next_id: AtomicU64,
    indexes: Mutex<Vec<Arc<SingleColumnIndex>>>,
    by_name: Mutex<HashMap<String, usize>>,
    by_id: Mutex<HashMap<u64, usize>>,
    by_columns: Mutex<HashMap<Vec<String>, usize>>,
}

impl IndexEngine {
    /// `directory`: where disk-backed index files live; `None` for an
    /// engine that only ever builds in-memory indexes.
    pub fn new(directory: Option<PathBuf>) -> Self {
        IndexEngine {
            directory,
            next_id: AtomicU64::new(1),
            indexes: Mutex::new(Vec::new()),
            by_name: Mutex::new(HashMap::new()),
            by_id: Mutex::new(HashMap::new()),
            by_columns: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.indexes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.lock().is_empty()
    }

    /// Create an index. Disk-backed when the engine has a directory and
    /// `disk` is requested.
    pub fn create_index(
        &self,
        name: impl Into<String>,
        columns: Vec<String>,
        disk: bool,
    ) -> Result<Arc<SingleColumnIndex>> {
        let name = name.into();
        let mut by_name = self.by_name.lock();
        if by_name.contains_key(&name) {
            return Err(IndexError::AlreadyExists { name });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let variant = match (&self.directory, disk) {
            (Some(dir), true) => {
                let path = index_file_path(dir, &name);
                IndexVariant::Disk(
                    DiskIndex::open(path).map_err(|source| IndexError::Storage { source })?,
                )
            }
            _ => IndexVariant::Memory(MemoryIndex::new()),
        };
        let index = Arc::new(SingleColumnIndex {
            id,
            name: name.clone(),
            columns: columns.clone(),
            variant: Mutex::new(variant),
        });
        let mut indexes = self.indexes.lock();
        let slot = indexes.len();
        indexes.push(Arc::clone(&index));
        by_name.insert(name.clone(), slot);
        self.by_id.lock().insert(id, slot);
        self.by_columns.lock().insert(columns, slot);
        debug!(index = %name, id, disk, "created index");
        Ok(index)
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        let slot = {
            let mut by_name = self.by_name.lock();
            by_name.remove(name).ok_or_else(|| IndexError::NotFound {
                name: name.to_string(),
            })?
        };
        let index = {
            let mut by_name = self.by_name.lock();
            let mut indexes = self.indexes.lock();
            let index = indexes.remove(slot);
            // reindex the lookaside maps after the shift
            let mut by_id = self.by_id.lock();
            let mut by_columns = self.by_columns.lock();
            by_name.clear();
            by_id.clear();
            by_columns.clear();
            for (at, idx) in indexes.iter().enumerate() {
                by_name.insert(idx.name.clone(), at);
                by_id.insert(idx.id, at);
                by_columns.insert(idx.columns.clone(), at);
            }
            index
        };
        if let Ok(inner) = Arc::try_unwrap(index) {
            if let IndexVariant::Disk(disk) = inner.variant.into_inner() {
                disk.drop_index().map_err(|source| IndexError::Storage { source })?;
            }
        }
        debug!(index = name, "dropped index");
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<SingleColumnIndex>> {
        let by_name = self.by_name.lock();
        let indexes = self.indexes.lock();
        by_name.get(name).map(|&slot| Arc::clone(&indexes[slot]))
    }

    pub fn find_by_id(&self, id: u64) -> Option<Arc<SingleColumnIndex>> {
        let by_id = self.by_id.lock();
        let indexes = self.indexes.lock();
        by_id.get(&id).map(|&slot| Arc::clone(&indexes[slot]))
    }

    /// Index whose key columns form a prefix of (or equal) `columns`.
    pub fn find_by_key_prefix(&self, columns: &[String]) -> Option<Arc<SingleColumnIndex>> {
        let by_columns = self.by_columns.lock();
        let indexes = self.indexes.lock();
        if let Some(&slot) = by_columns.get(columns) {
            return Some(Arc::clone(&indexes[slot]));
        }
        indexes
            .iter()
            .find(|idx| columns.starts_with(idx.columns()))
            .cloned()
    }

    pub fn all_indexes(&self) -> Vec<Arc<SingleColumnIndex>> {
        self.indexes.lock().clone()
    }

    /// Sum of row references across all indexes, for diagnostics.
    pub fn total_entries(&self) -> Result<usize> {
        let mut total = 0;
        for index in self.all_indexes() {
            total += index.all()?.len();
        }
        Ok(total)
    }
}

fn index_file_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.obt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn engine_maps_name_id_and_prefix() {
        let engine = IndexEngine::new(None);
        let index = engine
            .create_index("idx_x", vec!["x".into()], false)
            .unwrap();
        assert_eq!(engine.len(), 1);
        assert!(engine.find_by_name("idx_x").is_some());
        assert!(engine.find_by_id(index.id()).is_some());
        assert!(engine
            .find_by_key_prefix(&["x".into(), "y".into()])
            .is_some());
        assert!(engine.find_by_key_prefix(&["y".into()]).is_none());
    }

    #[test]
    fn duplicate_name_rejected() {
        let engine = IndexEngine::new(None);
        engine.create_index("idx", vec!["a".into()], false).unwrap();
        assert!(matches!(
            engine.create_index("idx", vec!["b".into()], false),
            Err(IndexError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn search_compare_ops() {
        let engine = IndexEngine::new(None);
        let index = engine.create_index("idx", vec!["x".into()], false).unwrap();
        for i in 1..=10i64 {
            index.insert(&Value::Int64(i), i as RowId).unwrap();
        }
        assert_eq!(index.search(CompareOp::Eq, &Value::Int64(5)).unwrap(), vec![5]);
        assert_eq!(index.search(CompareOp::Lt, &Value::Int64(3)).unwrap().len(), 2);
        assert_eq!(index.search(CompareOp::Lte, &Value::Int64(3)).unwrap().len(), 3);
        assert_eq!(index.search(CompareOp::Gt, &Value::Int64(8)).unwrap().len(), 2);
        assert_eq!(index.search(CompareOp::Gte, &Value::Int64(8)).unwrap().len(), 3);
        assert_eq!(index.search(CompareOp::Ne, &Value::Int64(5)).unwrap().len(), 9);
    }

    #[test]
    fn disk_backed_index_through_engine() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::new(Some(dir.path().to_path_buf()));
        let index = engine.create_index("disk_idx", vec!["x".into()], true).unwrap();
        assert!(index.is_disk_backed());
        index.insert(&Value::Int64(42), 7).unwrap();
        assert_eq!(index.find(&Value::Int64(42)).unwrap(), vec![7]);
        drop(index);
        engine.drop_index("disk_idx").unwrap();
        assert!(!dir.path().join("disk_idx.obt").exists());
    }
}
