//! Engine-level errors and the outward-facing error codes.

use snafu::Snafu;

use oxbow_catalog::CatalogError;
use oxbow_index::{BTreeError, IndexError};
use oxbow_storage::StorageError;
use oxbow_wal::WalError;

/// Error code surfaced on a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    None = 0,
    OtherError = -1,
    DatabaseAlreadyExists = 1,
    DatabaseNotExists = 2,
    CollectionAlreadyExists = 3,
    CollectionNotExists = 4,
    IndexCreateFail = 5,
    CollectionDropped = 6,
    SqlParseError = 7,
    CreatePhysicalPlanError = 8,
    SchemaError = 9,
    IncompatibleStorageTypes = 10,
    IndexNotExists = 11,
}

/// Error of one engine request, carrying the outward code plus a message.
#[derive(Debug, Snafu)]
#[snafu(display("{message}"))]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        EngineError {
            code,
            message: message.into(),
        }
    }

    pub fn database_not_exists(name: &str) -> Self {
        Self::new(
            ErrorCode::DatabaseNotExists,
            format!("database {name} does not exist"),
        )
    }

    pub fn collection_not_exists(database: &str, table: &str) -> Self {
        Self::new(
            ErrorCode::CollectionNotExists,
            format!("table {database}.{table} does not exist"),
        )
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        let code = match &e {
            StorageError::SchemaMismatch { .. } => ErrorCode::SchemaError,
            StorageError::NotFound { .. } => ErrorCode::CollectionNotExists,
            StorageError::AlreadyExists { .. } => ErrorCode::CollectionAlreadyExists,
            StorageError::Unsupported { .. } => ErrorCode::IncompatibleStorageTypes,
            _ => ErrorCode::OtherError,
        };
        EngineError::new(code, e.to_string())
    }
}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> Self {
        let code = match &e {
            CatalogError::DatabaseNotFound { .. } => ErrorCode::DatabaseNotExists,
            _ => ErrorCode::OtherError,
        };
        EngineError::new(code, e.to_string())
    }
}

impl From<WalError> for EngineError {
    fn from(e: WalError) -> Self {
        EngineError::new(ErrorCode::OtherError, e.to_string())
    }
}

impl From<IndexError> for EngineError {
    fn from(e: IndexError) -> Self {
        let code = match &e {
            IndexError::AlreadyExists { .. } => ErrorCode::IndexCreateFail,
            IndexError::NotFound { .. } => ErrorCode::IndexNotExists,
            IndexError::Storage { .. } => ErrorCode::IndexCreateFail,
        };
        EngineError::new(code, e.to_string())
    }
}

impl From<BTreeError> for EngineError {
    fn from(e: BTreeError) -> Self {
        EngineError::new(ErrorCode::IndexCreateFail, e.to_string())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
