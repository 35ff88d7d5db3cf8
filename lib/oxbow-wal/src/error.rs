use std::io;

use snafu::Snafu;

/// Error raised by the WAL writer or reader.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WalError {
    /// A general I/O error occurred.
    #[snafu(display("WAL I/O error during {operation}: {source}"))]
    Io {
        operation: &'static str,
        source: io::Error,
    },

    /// The record's stored checksum did not match the recomputed one.
    ///
    /// Callers of the reader never see this for tail corruption: the reader
    /// treats the offending record and everything after it in the same file
    /// as lost and stops there.
    #[snafu(display("checksum mismatch: calculated {calculated:#x}, stored {stored:#x}"))]
    Checksum { calculated: u32, stored: u32 },

    #[snafu(display("failed to serialize WAL record: {detail}"))]
    Serialize { detail: String },

    #[snafu(display("failed to deserialize WAL record: {detail}"))]
    Deserialize { detail: String },

    #[snafu(display("invalid WAL record: {reason}"))]
    InvalidRecord { reason: String },
}

pub type Result<T, E = WalError> = std::result::Result<T, E>;
