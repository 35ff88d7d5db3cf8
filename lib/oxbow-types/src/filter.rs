use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Comparison operator of a constant filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn matches(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
            CompareOp::Lt => ordering == Less,
            CompareOp::Lte => ordering != Greater,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Gte => ordering != Less,
        }
    }
}

/// Outcome of checking a filter against column or segment statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPropagation {
    /// Every row in the range satisfies the filter; the filter need not run.
    AlwaysTrue,
    /// No row in the range can satisfy the filter; skip the range entirely.
    AlwaysFalse,
    NoPruningPossible,
}

impl FilterPropagation {
    pub fn and(self, other: FilterPropagation) -> FilterPropagation {
        use FilterPropagation::*;
        match (self, other) {
            (AlwaysFalse, _) | (_, AlwaysFalse) => AlwaysFalse,
            (AlwaysTrue, AlwaysTrue) => AlwaysTrue,
            _ => NoPruningPossible,
        }
    }

    pub fn or(self, other: FilterPropagation) -> FilterPropagation {
        use FilterPropagation::*;
        match (self, other) {
            (AlwaysTrue, _) | (_, AlwaysTrue) => AlwaysTrue,
            (AlwaysFalse, AlwaysFalse) => AlwaysFalse,
            _ => NoPruningPossible,
        }
    }

    pub fn negate(self) -> FilterPropagation {
        match self {
            FilterPropagation::AlwaysTrue => FilterPropagation::AlwaysFalse,
            FilterPropagation::AlwaysFalse => FilterPropagation::AlwaysTrue,
            FilterPropagation::NoPruningPossible => FilterPropagation::NoPruningPossible,
        }
    }
}

/// A pushed-down row filter over table columns.
///
/// Column references are positional over the scanned column set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableFilter {
    Constant {
        column: usize,
        op: CompareOp,
        value: Value,
    },
    IsNull {
        column: usize,
    },
    IsNotNull {
        column: usize,
    },
    And(Vec<TableFilter>),
    Or(Vec<TableFilter>),
    Not(Box<TableFilter>),
}

impl TableFilter {
    pub fn eq(column: usize, value: Value) -> Self {
        TableFilter::Constant {
            column,
            op: CompareOp::Eq,
            value,
        }
    }

    /// Evaluate against one materialized row.
    pub fn matches_row(&self, row: &[Value]) -> bool {
        match self {
            TableFilter::Constant { column, op, value } => row
                .get(*column)
                .and_then(|cell| cell.compare(value))
                .map(|ord| op.matches(ord))
                .unwrap_or(false),
            TableFilter::IsNull { column } => {
                row.get(*column).map(Value::is_null).unwrap_or(false)
            }
            TableFilter::IsNotNull { column } => {
                row.get(*column).map(|v| !v.is_null()).unwrap_or(false)
            }
            TableFilter::And(children) => children.iter().all(|f| f.matches_row(row)),
            TableFilter::Or(children) => children.iter().any(|f| f.matches_row(row)),
            TableFilter::Not(child) => !child.matches_row(row),
        }
    }

    /// Columns referenced anywhere in this filter tree.
    pub fn referenced_columns(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_columns(&self, out: &mut Vec<usize>) {
        match self {
            TableFilter::Constant { column, .. }
            | TableFilter::IsNull { column }
            | TableFilter::IsNotNull { column } => out.push(*column),
            TableFilter::And(children) | TableFilter::Or(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            TableFilter::Not(child) => child.collect_columns(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_filter_on_row() {
        let f = TableFilter::Constant {
            column: 0,
            op: CompareOp::Gt,
            value: Value::Int64(3),
        };
        assert!(f.matches_row(&[Value::Int64(4)]));
        assert!(!f.matches_row(&[Value::Int64(3)]));
        // NULL never matches a comparison
        assert!(!f.matches_row(&[Value::Null]));
    }

    #[test]
    fn logical_composition() {
        let f = TableFilter::And(vec![
            TableFilter::Constant {
                column: 0,
                op: CompareOp::Gte,
                value: Value::Int64(2),
            },
            TableFilter::Not(Box::new(TableFilter::Constant {
                column: 0,
                op: CompareOp::Eq,
                value: Value::Int64(5),
            })),
        ]);
        assert!(f.matches_row(&[Value::Int64(4)]));
        assert!(!f.matches_row(&[Value::Int64(5)]));
        assert!(!f.matches_row(&[Value::Int64(1)]));
    }

    #[test]
    fn propagation_algebra() {
        use FilterPropagation::*;
        assert_eq!(AlwaysTrue.and(AlwaysFalse), AlwaysFalse);
        assert_eq!(AlwaysTrue.and(AlwaysTrue), AlwaysTrue);
        assert_eq!(NoPruningPossible.or(AlwaysTrue), AlwaysTrue);
        assert_eq!(AlwaysFalse.negate(), AlwaysTrue);
    }

    #[test]
    fn null_checks() {
        assert!(TableFilter::IsNull { column: 0 }.matches_row(&[Value::Null]));
        assert!(TableFilter::IsNotNull { column: 0 }.matches_row(&[Value::Int64(0)]));
    }
}
