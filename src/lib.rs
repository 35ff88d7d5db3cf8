//! oxbow: an embeddable columnar database engine.
//!
//! The heavy lifting lives in the member crates: `oxbow-storage` (block
//! manager, buffer pool, MVCC column store, checkpointing), `oxbow-wal`,
//! `oxbow-catalog`, `oxbow-index`, and `oxbow-types`. This crate is the
//! facade: configuration, the request surface, the executor operators, and
//! the [`Engine`] that wires it all together.
//!
//! ```no_run
//! use oxbow::{Engine, Settings};
//! use oxbow::request::Request;
//! use oxbow_catalog::TableStorageMode;
//! use oxbow_storage::ColumnDefinition;
//! use oxbow_types::LogicalType;
//!
//! let engine = Engine::open(Settings::in_memory()).unwrap();
//! let session = 1;
//! engine.execute(session, Request::CreateDatabase { database: "db".into() });
//! engine.execute(session, Request::CreateTable {
//!     database: "db".into(),
//!     table: "t".into(),
//!     columns: vec![ColumnDefinition::new("x", LogicalType::Int64)],
//!     storage_mode: TableStorageMode::InMemory,
//! });
//! ```

#![deny(warnings)]

pub mod cursor;
pub mod engine;
pub mod error;
pub mod exec;
pub mod request;
pub mod settings;

pub use cursor::Cursor;
pub use engine::{Engine, SessionId, TableHandle};
pub use error::{EngineError, ErrorCode};
pub use exec::FunctionRegistry;
pub use settings::{LogLevel, Settings};

pub use oxbow_catalog as catalog;
pub use oxbow_index as index;
pub use oxbow_storage as storage;
pub use oxbow_types as types;
pub use oxbow_wal as wal;
