use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use oxbow_types::LogicalType;

/// Whether a table's rows live in process memory only or are backed by an
/// on-disk block store of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableStorageMode {
    InMemory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub name: String,
    pub ty: LogicalType,
    pub not_null: bool,
    pub has_default: bool,
}

impl ColumnEntry {
    pub fn new(name: impl Into<String>, ty: LogicalType) -> Self {
        ColumnEntry {
            name: name.into(),
            ty,
            not_null: false,
            has_default: false,
        }
    }
}

/// Table-level constraints beyond per-column flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableConstraintEntry {
    Unique(Vec<String>),
    Check(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,
    pub storage_mode: TableStorageMode,
    pub columns: Vec<ColumnEntry>,
    pub primary_key_columns: Vec<String>,
    pub constraints: Vec<TableConstraintEntry>,
}

impl TableEntry {
    pub fn new(name: impl Into<String>, storage_mode: TableStorageMode) -> Self {
        TableEntry {
            name: name.into(),
            storage_mode,
            columns: Vec::new(),
            primary_key_columns: Vec::new(),
            constraints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub name: String,
    pub start_value: i64,
    pub increment: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub current_value: i64,
}

impl SequenceEntry {
    pub fn new(name: impl Into<String>) -> Self {
        SequenceEntry {
            name: name.into(),
            start_value: 1,
            increment: 1,
            min_value: 1,
            max_value: i64::MAX,
            current_value: 1,
        }
    }

    /// Advance and return the next value, or `None` once the range is
    /// exhausted.
    pub fn next_value(&mut self) -> Option<i64> {
        let value = self.current_value;
        if value > self.max_value || value < self.min_value {
            return None;
        }
        self.current_value = value.checked_add(self.increment)?;
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewEntry {
    pub name: String,
    pub query_sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEntry {
    pub name: String,
    pub parameters: Vec<String>,
    pub body_sql: String,
}

/// One database and everything registered under it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub tables: IndexMap<String, TableEntry>,
    pub sequences: IndexMap<String, SequenceEntry>,
    pub views: IndexMap<String, ViewEntry>,
    pub macros: IndexMap<String, MacroEntry>,
}
