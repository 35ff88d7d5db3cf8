//! Durable, crash-safe columnar table storage: the core of oxbow.
//!
//! Layering, bottom up: a single-file [`block`] manager with a free list
//! and checksummed header; a [`buffer`] pool handing out pinned block
//! views; a [`meta`] overlay multiplexing small descriptor streams onto
//! blocks; [`segment`]s and [`column`] data forming row groups; the
//! [`table`] layer tying columns, MVCC [`version`] tracking, and the
//! [`txn`] manager together; and the [`checkpoint`] pipeline that
//! compresses segments onto shared blocks.

#![deny(warnings)]

pub mod block;
pub mod buffer;
pub mod checkpoint;
pub mod column;
mod error;
pub mod meta;
pub mod row_group;
pub mod segment;
pub mod statistics;
pub mod table;
pub mod txn;
pub mod version;

pub use block::{Block, BlockManager, BlockPointer, DatabaseHeader, DEFAULT_BLOCK_SIZE};
pub use buffer::{BlockHandle, BufferHandle, BufferPool};
pub use checkpoint::{PartialBlockManager, MAX_DICTIONARY_ENTRIES, PARTIAL_BLOCK_FULL_THRESHOLD};
pub use column::{ColumnData, PersistentColumnData};
pub use error::{Result, StorageError};
pub use meta::{MetadataManager, MetadataReader, MetadataWriter};
pub use row_group::{RowGroup, ROW_GROUP_CAPACITY};
pub use segment::{ColumnSegment, CompressionType, DataPointer};
pub use statistics::BaseStatistics;
pub use table::{
    ColumnDefinition, DataTable, ParallelTableScanState, TableAppendState, TableScanState,
};
pub use txn::{
    SessionId, Snapshot, Transaction, TransactionManager, TransactionState, TRANSACTION_ID_START,
};
pub use version::RowVersionManager;
