//! Write-ahead log: framed, checksummed, per-agent append logs with
//! committed-only replay.

#![deny(warnings)]

mod error;
mod reader;
mod record;
mod writer;

pub use error::WalError;
pub use reader::WalReader;
pub use record::{
    WalEntry, WalRecord, KIND_PHYSICAL_DELETE, KIND_PHYSICAL_INSERT, KIND_PHYSICAL_UPDATE,
};
pub use writer::{wal_file_name, WalWriter};
