use std::io;

use snafu::Snafu;

/// Error raised by the storage core.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// A general I/O error occurred while touching the database file.
    #[snafu(display("storage I/O error during {operation}: {source}"))]
    Io {
        operation: &'static str,
        source: io::Error,
    },

    /// A checksum did not match on read.
    ///
    /// Checksum failures are fatal for the object being read: the block,
    /// header, or descriptor is treated as lost.
    #[snafu(display("corrupted {what}: {detail}"))]
    Corrupted { what: &'static str, detail: String },

    /// The operation is not supported by this object.
    ///
    /// Raised by the in-memory block manager for every I/O entry point and
    /// by variable-width segments for in-place updates.
    #[snafu(display("unsupported operation: {operation}"))]
    Unsupported { operation: &'static str },

    #[snafu(display("invalid argument: {detail}"))]
    InvalidArgument { detail: String },

    #[snafu(display("{what} not found"))]
    NotFound { what: String },

    #[snafu(display("{what} already exists"))]
    AlreadyExists { what: String },

    /// A value could not be stored in the column it was routed to.
    #[snafu(display("schema mismatch: {detail}"))]
    SchemaMismatch { detail: String },

    #[snafu(display("failed to serialize {what}: {detail}"))]
    Serialize { what: &'static str, detail: String },

    #[snafu(display("failed to deserialize {what}: {detail}"))]
    Deserialize { what: &'static str, detail: String },
}

impl StorageError {
    #[allow(dead_code)]
    pub(crate) fn io(operation: &'static str, source: io::Error) -> Self {
        StorageError::Io { operation, source }
    }

    pub(crate) fn corrupted(what: &'static str, detail: impl Into<String>) -> Self {
        StorageError::Corrupted {
            what,
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
