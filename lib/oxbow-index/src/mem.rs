use std::collections::BTreeMap;
use std::ops::Bound;

use smallvec::SmallVec;

use oxbow_types::{RowId, Value};

use crate::key::IndexKey;

type RowIds = SmallVec<[RowId; 4]>;

/// In-memory ordered index: key -> row ids.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: BTreeMap<IndexKey, RowIds>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a `(value, row_id)` pair; inserting an existing pair is a
    /// no-op.
    pub fn insert(&mut self, value: Value, row_id: RowId) {
        let rows = self.entries.entry(IndexKey::from(value)).or_default();
        if !rows.contains(&row_id) {
            rows.push(row_id);
        }
    }

    /// Remove every row id stored under `value`.
    pub fn remove_value(&mut self, value: &Value) {
        self.entries.remove(&IndexKey::from(value.clone()));
    }

    /// Remove one `(value, row_id)` pair.
    pub fn remove(&mut self, value: &Value, row_id: RowId) {
        let key = IndexKey::from(value.clone());
        if let Some(rows) = self.entries.get_mut(&key) {
            rows.retain(|r| *r != row_id);
            if rows.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Row ids stored under exactly `value`.
    pub fn find(&self, value: &Value) -> Vec<RowId> {
        self.entries
            .get(&IndexKey::from(value.clone()))
            .map(|rows| rows.to_vec())
            .unwrap_or_default()
    }

    /// Row ids of every key strictly less than `value`.
    pub fn lower_bound(&self, value: &Value) -> Vec<RowId> {
        let key = IndexKey::from(value.clone());
        self.entries
            .range(..key)
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect()
    }

    /// Row ids of every key strictly greater than `value`.
    pub fn upper_bound(&self, value: &Value) -> Vec<RowId> {
        let key = IndexKey::from(value.clone());
        self.entries
            .range((Bound::Excluded(key), Bound::Unbounded))
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect()
    }

    pub fn all(&self) -> Vec<RowId> {
        self.entries
            .values()
            .flat_map(|rows| rows.iter().copied())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> MemoryIndex {
        let mut index = MemoryIndex::new();
        for i in 1..=100i64 {
            index.insert(Value::Int64(i), i as RowId);
        }
        index
    }

    #[test]
    fn find_and_bounds() {
        let index = filled();
        assert_eq!(index.find(&Value::Int64(10)), vec![10]);
        assert!(index.find(&Value::Int64(101)).is_empty());
        assert_eq!(index.lower_bound(&Value::Int64(10)).len(), 9);
        assert_eq!(index.upper_bound(&Value::Int64(90)).len(), 10);
    }

    #[test]
    fn insert_is_idempotent() {
        let mut index = MemoryIndex::new();
        index.insert(Value::Int64(1), 7);
        index.insert(Value::Int64(1), 7);
        assert_eq!(index.find(&Value::Int64(1)), vec![7]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_by_value_and_pair() {
        let mut index = filled();
        for i in (2..=100i64).step_by(2) {
            index.remove_value(&Value::Int64(i));
        }
        assert!(index.find(&Value::Int64(2)).is_empty());
        assert_eq!(index.upper_bound(&Value::Int64(90)).len(), 5);

        // pair removal only touches the named row id
        index.insert(Value::Int64(1), 200);
        index.remove(&Value::Int64(1), 1);
        assert_eq!(index.find(&Value::Int64(1)), vec![200]);
    }

    #[test]
    fn duplicate_keys_keep_all_rows() {
        let mut index = MemoryIndex::new();
        index.insert(Value::Int64(5), 1);
        index.insert(Value::Int64(5), 2);
        index.insert(Value::Int64(5), 3);
        let mut rows = index.find(&Value::Int64(5));
        rows.sort_unstable();
        assert_eq!(rows, vec![1, 2, 3]);
    }
}
