//! Column and segment statistics ("zonemaps") used for filter pruning.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use oxbow_types::{CompareOp, FilterPropagation, LogicalType, TableFilter, Value, Vector};

/// Min/max/null-count statistics of one column or one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseStatistics {
    ty: LogicalType,
    min: Option<Value>,
    max: Option<Value>,
    null_count: u64,
}

impl BaseStatistics {
    pub fn new(ty: LogicalType) -> Self {
        BaseStatistics {
            ty,
            min: None,
            max: None,
            null_count: 0,
        }
    }

    pub fn has_stats(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    pub fn min_value(&self) -> Option<&Value> {
        self.min.as_ref()
    }

    pub fn max_value(&self) -> Option<&Value> {
        self.max.as_ref()
    }

    pub fn null_count(&self) -> u64 {
        self.null_count
    }

    pub fn set_min(&mut self, value: Value) {
        self.min = Some(value);
    }

    pub fn set_max(&mut self, value: Value) {
        self.max = Some(value);
    }

    /// Fold the first `count` rows of `vector` into these statistics.
    pub fn update(&mut self, vector: &Vector, count: usize) {
        if !self.ty.is_orderable() {
            // nested and blob columns track null counts only
            for row in 0..count.min(vector.len()) {
                if !vector.row_is_valid(row) {
                    self.null_count += 1;
                }
            }
            return;
        }
        for row in 0..count.min(vector.len()) {
            if !vector.row_is_valid(row) {
                self.null_count += 1;
                continue;
            }
            self.update_value(&vector.value(row));
        }
    }

    pub fn update_value(&mut self, value: &Value) {
        if value.is_null() {
            self.null_count += 1;
            return;
        }
        match &self.min {
            None => self.min = Some(value.clone()),
            Some(min) => {
                if value.compare(min) == Some(Ordering::Less) {
                    self.min = Some(value.clone());
                }
            }
        }
        match &self.max {
            None => self.max = Some(value.clone()),
            Some(max) => {
                if value.compare(max) == Some(Ordering::Greater) {
                    self.max = Some(value.clone());
                }
            }
        }
    }

    /// Widen these statistics to cover `other` as well.
    pub fn merge(&mut self, other: &BaseStatistics) {
        self.null_count += other.null_count;
        if let Some(min) = &other.min {
            self.update_min_max_only(min);
        }
        if let Some(max) = &other.max {
            self.update_min_max_only(max);
        }
    }

    fn update_min_max_only(&mut self, value: &Value) {
        let null_count = self.null_count;
        self.update_value(value);
        self.null_count = null_count;
    }

    /// Check a full filter tree against these statistics for the column at
    /// position `column`.
    pub fn check_filter(&self, filter: &TableFilter, column: usize) -> FilterPropagation {
        match filter {
            TableFilter::Constant {
                column: filter_column,
                op,
                value,
            } => {
                if *filter_column != column {
                    return FilterPropagation::NoPruningPossible;
                }
                self.check_constant(*op, value)
            }
            TableFilter::IsNull {
                column: filter_column,
            } => {
                if *filter_column != column {
                    FilterPropagation::NoPruningPossible
                } else if self.null_count == 0 && self.has_stats() {
                    FilterPropagation::AlwaysFalse
                } else {
                    FilterPropagation::NoPruningPossible
                }
            }
            TableFilter::IsNotNull {
                column: filter_column,
            } => {
                if *filter_column != column {
                    FilterPropagation::NoPruningPossible
                } else if self.null_count == 0 && self.has_stats() {
                    FilterPropagation::AlwaysTrue
                } else {
                    FilterPropagation::NoPruningPossible
                }
            }
            TableFilter::And(children) => children
                .iter()
                .map(|f| self.check_filter(f, column))
                .fold(FilterPropagation::AlwaysTrue, FilterPropagation::and),
            TableFilter::Or(children) => children
                .iter()
                .map(|f| self.check_filter(f, column))
                .fold(FilterPropagation::AlwaysFalse, FilterPropagation::or),
            TableFilter::Not(child) => self.check_filter(child, column).negate(),
        }
    }

    /// Zonemap truth table for one constant comparison.
    pub fn check_constant(&self, op: CompareOp, value: &Value) -> FilterPropagation {
        let (Some(min), Some(max)) = (&self.min, &self.max) else {
            return FilterPropagation::NoPruningPossible;
        };
        let (Some(min_ord), Some(max_ord)) = (min.compare(value), max.compare(value)) else {
            return FilterPropagation::NoPruningPossible;
        };
        use FilterPropagation::*;
        use Ordering::*;
        match op {
            CompareOp::Gt => {
                if max_ord != Greater {
                    AlwaysFalse
                } else if min_ord == Greater {
                    AlwaysTrue
                } else {
                    NoPruningPossible
                }
            }
            CompareOp::Gte => {
                if max_ord == Less {
                    AlwaysFalse
                } else if min_ord != Less {
                    AlwaysTrue
                } else {
                    NoPruningPossible
                }
            }
            CompareOp::Lt => {
                if min_ord != Less {
                    AlwaysFalse
                } else if max_ord == Less {
                    AlwaysTrue
                } else {
                    NoPruningPossible
                }
            }
            CompareOp::Lte => {
                if min_ord == Greater {
                    AlwaysFalse
                } else if max_ord != Greater {
                    AlwaysTrue
                } else {
                    NoPruningPossible
                }
            }
            CompareOp::Eq => {
                if min_ord == Greater || max_ord == Less {
                    AlwaysFalse
                } else {
                    NoPruningPossible
                }
            }
            CompareOp::Ne => {
                if min_ord == Equal && max_ord == Equal {
                    AlwaysFalse
                } else {
                    NoPruningPossible
                }
            }
        }
    }
}
