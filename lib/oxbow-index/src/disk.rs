//! Disk-backed secondary index: msgpack `[key, row_id]` items in a B+tree
//! file of its own.

use std::path::Path;
use std::sync::Arc;

use oxbow_types::{RowId, Value};

use crate::btree::{BTreeError, DiskBTree, KeyExtractor, DEFAULT_PAGE_SIZE};
use crate::key::IndexKey;

type Result<T, E = BTreeError> = std::result::Result<T, E>;

fn item_extractor() -> KeyExtractor {
    Arc::new(|item: &[u8]| {
        match rmp_serde::from_slice::<(Value, u64)>(item) {
            Ok((value, row_id)) => (IndexKey::from(value), row_id),
            Err(_) => (IndexKey::min(), 0),
        }
    })
}

/// One persistent index over a single key.
#[derive(Debug)]
pub struct DiskIndex {
    tree: DiskBTree,
}

impl DiskIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_page_size(path, DEFAULT_PAGE_SIZE)
    }

    pub fn open_with_page_size(path: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        Ok(DiskIndex {
            tree: DiskBTree::open(path, page_size, item_extractor())?,
        })
    }

    fn encode(key: &Value, row_id: RowId) -> Result<Vec<u8>> {
        rmp_serde::to_vec(&(key, row_id)).map_err(|e| BTreeError::Encode {
            detail: e.to_string(),
        })
    }

    fn rows_of(items: Vec<Vec<u8>>) -> Vec<RowId> {
        items
            .iter()
            .filter_map(|item| rmp_serde::from_slice::<(Value, u64)>(item).ok())
            .map(|(_, row_id)| row_id)
            .collect()
    }

    /// Insert a `(key, row_id)` pair; duplicates are a no-op.
    pub fn insert(&self, key: &Value, row_id: RowId) -> Result<()> {
        let item = Self::encode(key, row_id)?;
        self.tree.insert(&item)?;
        self.tree.flush()
    }

    /// Remove every row id stored under `key`.
    pub fn remove_value(&self, key: &Value) -> Result<()> {
        self.tree.remove_key(&IndexKey::from(key.clone()))?;
        self.tree.flush()
    }

    /// Remove one `(key, row_id)` pair.
    pub fn remove(&self, key: &Value, row_id: RowId) -> Result<()> {
        self.tree.remove(&IndexKey::from(key.clone()), row_id)?;
        self.tree.flush()
    }

    pub fn find(&self, key: &Value) -> Result<Vec<RowId>> {
        Ok(Self::rows_of(self.tree.find(&IndexKey::from(key.clone()))?))
    }

    /// Row ids of keys strictly less than `key`.
    pub fn lower_bound(&self, key: &Value) -> Result<Vec<RowId>> {
        Ok(Self::rows_of(
            self.tree.scan_lt(&IndexKey::from(key.clone()))?,
        ))
    }

    /// Row ids of keys strictly greater than `key`.
    pub fn upper_bound(&self, key: &Value) -> Result<Vec<RowId>> {
        Ok(Self::rows_of(
            self.tree.scan_gt(&IndexKey::from(key.clone()))?,
        ))
    }

    pub fn all(&self) -> Result<Vec<RowId>> {
        Ok(Self::rows_of(self.tree.scan_all()?))
    }

    pub fn item_count(&self) -> u64 {
        self.tree.item_count()
    }

    /// Discard every entry.
    pub fn clear(&self) -> Result<()> {
        self.tree.clear()
    }

    /// Delete the index file.
    pub fn drop_index(self) -> Result<()> {
        self.tree.drop_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn disk_index_bounds() {
        let dir = tempdir().unwrap();
        let index = DiskIndex::open(dir.path().join("x.obt")).unwrap();
        for i in 1..=100i64 {
            index.insert(&Value::Int64(i), i as RowId).unwrap();
        }
        assert_eq!(index.find(&Value::Int64(10)).unwrap(), vec![10]);
        assert!(index.find(&Value::Int64(101)).unwrap().is_empty());
        assert_eq!(index.lower_bound(&Value::Int64(10)).unwrap().len(), 9);
        assert_eq!(index.upper_bound(&Value::Int64(90)).unwrap().len(), 10);

        for i in (2..=100i64).step_by(2) {
            index.remove_value(&Value::Int64(i)).unwrap();
        }
        assert!(index.find(&Value::Int64(2)).unwrap().is_empty());
        assert_eq!(index.upper_bound(&Value::Int64(90)).unwrap().len(), 5);
    }

    #[test]
    fn persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.obt");
        {
            let index = DiskIndex::open(&path).unwrap();
            for i in 1..=100i64 {
                index.insert(&Value::Int64(i), i as RowId).unwrap();
            }
        }
        let index = DiskIndex::open(&path).unwrap();
        assert_eq!(index.find(&Value::Int64(50)).unwrap(), vec![50]);
        assert_eq!(index.lower_bound(&Value::Int64(10)).unwrap().len(), 9);
    }

    #[test]
    fn drop_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.obt");
        let index = DiskIndex::open(&path).unwrap();
        index.insert(&Value::Int64(1), 1).unwrap();
        assert!(path.exists());
        index.drop_index().unwrap();
        assert!(!path.exists());
    }
}
