//! The request surface the planner hands to the engine.
//!
//! The SQL grammar, AST, and logical-plan transformer live upstream; by the
//! time a request reaches the engine it is one of these fully-resolved
//! shapes.

use oxbow_catalog::TableStorageMode;
use oxbow_storage::ColumnDefinition;
use oxbow_types::{CompareOp, DataChunk, TableFilter, Value};

/// Ordering of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub column: usize,
    pub direction: SortDirection,
}

/// Built-in aggregate functions, plus an escape hatch into the registered
/// function registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateFunction {
    Sum,
    Min,
    Max,
    Count,
    Avg,
    Registered(String),
}

#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    /// Input column; ignored by `Count`.
    pub column: usize,
}

/// Grouped aggregation: zero or more group-by keys plus aggregate outputs.
#[derive(Debug, Clone, Default)]
pub struct GroupBy {
    pub keys: Vec<usize>,
    pub aggregates: Vec<AggregateExpr>,
}

/// A fully-resolved select over one table.
#[derive(Debug, Clone, Default)]
pub struct SelectRequest {
    /// Columns to produce; empty means all columns.
    pub columns: Vec<usize>,
    pub filter: Option<TableFilter>,
    pub group: Option<GroupBy>,
    /// Filter applied to the grouped output.
    pub having: Option<TableFilter>,
    pub order: Vec<SortKey>,
    pub distinct: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// One column assignment of an update.
#[derive(Debug, Clone)]
pub struct UpdateAssignment {
    pub column: usize,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub filter: Option<TableFilter>,
    pub limit: Option<usize>,
    pub assignments: Vec<UpdateAssignment>,
    /// Insert a fresh row from the assignments when nothing matches.
    pub upsert: bool,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub filter: Option<TableFilter>,
    pub limit: Option<usize>,
}

/// An index probe: `column op value` resolved through a secondary index.
#[derive(Debug, Clone)]
pub struct IndexProbe {
    pub index: String,
    pub op: CompareOp,
    pub value: Value,
}

/// Everything the engine accepts.
#[derive(Debug)]
pub enum Request {
    CreateDatabase {
        database: String,
    },
    DropDatabase {
        database: String,
    },
    CreateTable {
        database: String,
        table: String,
        columns: Vec<ColumnDefinition>,
        storage_mode: TableStorageMode,
    },
    DropTable {
        database: String,
        table: String,
    },
    CreateIndex {
        database: String,
        table: String,
        name: String,
        column: String,
    },
    DropIndex {
        database: String,
        table: String,
        name: String,
    },
    Insert {
        database: String,
        table: String,
        chunk: DataChunk,
    },
    Delete {
        database: String,
        table: String,
        request: DeleteRequest,
    },
    Update {
        database: String,
        table: String,
        request: UpdateRequest,
    },
    Select {
        database: String,
        table: String,
        request: SelectRequest,
    },
    Checkpoint,
    Vacuum {
        database: String,
        table: String,
    },
}
