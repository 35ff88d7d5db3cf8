//! Grouped aggregation.
//!
//! One pass over the input: rows are bucketed by their group key and each
//! bucket carries one running state per aggregate expression. Small integer
//! inputs promote to 64-bit (or double) accumulation; finalize narrows back
//! to the input column's type where the result still fits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use oxbow_index::IndexKey;
use oxbow_types::{DataChunk, LogicalType, PhysicalType, Value};

use crate::error::{EngineError, ErrorCode, Result};
use crate::request::{AggregateExpr, AggregateFunction, GroupBy};

/// A registered aggregate: folds the collected input values into one.
pub type RegisteredAggregate = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Process-scope registry of named aggregate functions.
///
/// Constructed once at service startup and passed to the executor; built-in
/// aggregates never consult it.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, RegisteredAggregate>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.read().len())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, function: RegisteredAggregate) {
        self.functions.write().insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<RegisteredAggregate> {
        self.functions.read().get(name).cloned()
    }
}

/// Promoted accumulation state for SUM.
#[derive(Debug, Clone, Copy)]
enum NumericSum {
    Empty,
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl NumericSum {
    fn add(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        *self = match (*self, value) {
            (NumericSum::Empty, v) => match v {
                Value::UInt8(_) | Value::UInt16(_) | Value::UInt32(_) | Value::UInt64(_) => {
                    NumericSum::UInt(v.as_u64().unwrap_or(0))
                }
                Value::Float32(_) | Value::Float64(_) => {
                    NumericSum::Float(v.as_f64().unwrap_or(0.0))
                }
                _ => NumericSum::Int(v.as_i64().unwrap_or(0)),
            },
            (NumericSum::Int(acc), v) => match v.as_i64() {
                Some(x) => NumericSum::Int(acc.wrapping_add(x)),
                None => NumericSum::Float(acc as f64 + v.as_f64().unwrap_or(0.0)),
            },
            (NumericSum::UInt(acc), v) => match v.as_u64() {
                Some(x) => NumericSum::UInt(acc.wrapping_add(x)),
                None => NumericSum::Float(acc as f64 + v.as_f64().unwrap_or(0.0)),
            },
            (NumericSum::Float(acc), v) => NumericSum::Float(acc + v.as_f64().unwrap_or(0.0)),
        };
    }

    fn finalize(self) -> Value {
        match self {
            NumericSum::Empty => Value::Null,
            NumericSum::Int(v) => Value::Int64(v),
            NumericSum::UInt(v) => Value::UInt64(v),
            NumericSum::Float(v) => Value::Float64(v),
        }
    }
}

#[derive(Debug, Clone)]
enum AggState {
    Sum(NumericSum),
    Min(Option<Value>),
    Max(Option<Value>),
    Count(u64),
    Avg { sum: f64, count: u64 },
    Registered(Vec<Value>),
}

impl AggState {
    fn new(expr: &AggregateExpr) -> Self {
        match &expr.function {
            AggregateFunction::Sum => AggState::Sum(NumericSum::Empty),
            AggregateFunction::Min => AggState::Min(None),
            AggregateFunction::Max => AggState::Max(None),
            AggregateFunction::Count => AggState::Count(0),
            AggregateFunction::Avg => AggState::Avg { sum: 0.0, count: 0 },
            AggregateFunction::Registered(_) => AggState::Registered(Vec::new()),
        }
    }

    fn accumulate(&mut self, value: &Value) {
        match self {
            AggState::Sum(sum) => sum.add(value),
            AggState::Min(current) => {
                if !value.is_null() {
                    let replace = match current {
                        None => true,
                        Some(c) => value.compare(c) == Some(std::cmp::Ordering::Less),
                    };
                    if replace {
                        *current = Some(value.clone());
                    }
                }
            }
            AggState::Max(current) => {
                if !value.is_null() {
                    let replace = match current {
                        None => true,
                        Some(c) => value.compare(c) == Some(std::cmp::Ordering::Greater),
                    };
                    if replace {
                        *current = Some(value.clone());
                    }
                }
            }
            AggState::Count(count) => {
                if !value.is_null() {
                    *count += 1;
                }
            }
            AggState::Avg { sum, count } => {
                if let Some(v) = value.as_f64() {
                    *sum += v;
                    *count += 1;
                }
            }
            AggState::Registered(values) => values.push(value.clone()),
        }
    }

    fn finalize(
        self,
        expr: &AggregateExpr,
        input_type: &LogicalType,
        registry: &FunctionRegistry,
    ) -> Result<Value> {
        Ok(match self {
            AggState::Sum(sum) => narrow_value(input_type, sum.finalize()),
            AggState::Min(v) | AggState::Max(v) => v.unwrap_or(Value::Null),
            AggState::Count(count) => Value::Int64(count as i64),
            AggState::Avg { sum, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float64(sum / count as f64)
                }
            }
            AggState::Registered(values) => {
                let AggregateFunction::Registered(name) = &expr.function else {
                    unreachable!("registered state only built for registered functions");
                };
                let function = registry.get(name).ok_or_else(|| {
                    EngineError::new(
                        ErrorCode::CreatePhysicalPlanError,
                        format!("aggregate function {name} is not registered"),
                    )
                })?;
                function(&values)
            }
        })
    }
}

/// Narrow a promoted accumulator result back to the input column's type,
/// keeping the wide value when it no longer fits.
fn narrow_value(ty: &LogicalType, value: Value) -> Value {
    match (ty.physical_type(), &value) {
        (PhysicalType::Int8, Value::Int64(v)) => i8::try_from(*v)
            .map(Value::Int8)
            .unwrap_or(value),
        (PhysicalType::Int16, Value::Int64(v)) => i16::try_from(*v)
            .map(Value::Int16)
            .unwrap_or(value),
        (PhysicalType::Int32, Value::Int64(v)) => i32::try_from(*v)
            .map(Value::Int32)
            .unwrap_or(value),
        (PhysicalType::UInt8, Value::UInt64(v)) => u8::try_from(*v)
            .map(Value::UInt8)
            .unwrap_or(value),
        (PhysicalType::UInt16, Value::UInt64(v)) => u16::try_from(*v)
            .map(Value::UInt16)
            .unwrap_or(value),
        (PhysicalType::UInt32, Value::UInt64(v)) => u32::try_from(*v)
            .map(Value::UInt32)
            .unwrap_or(value),
        (PhysicalType::Float32, Value::Float64(v)) => Value::Float32(*v as f32),
        _ => value,
    }
}

fn output_type(expr: &AggregateExpr, input_types: &[LogicalType]) -> LogicalType {
    match &expr.function {
        AggregateFunction::Count => LogicalType::Int64,
        AggregateFunction::Avg => LogicalType::Float64,
        AggregateFunction::Min | AggregateFunction::Max => input_types
            .get(expr.column)
            .cloned()
            .unwrap_or(LogicalType::Int64),
        // the output column carries the promoted accumulator type; narrowed
        // results still fit it
        AggregateFunction::Sum => match input_types
            .get(expr.column)
            .map(LogicalType::physical_type)
        {
            Some(PhysicalType::UInt8)
            | Some(PhysicalType::UInt16)
            | Some(PhysicalType::UInt32)
            | Some(PhysicalType::UInt64) => LogicalType::UInt64,
            Some(PhysicalType::Float32) | Some(PhysicalType::Float64) => LogicalType::Float64,
            _ => LogicalType::Int64,
        },
        AggregateFunction::Registered(_) => LogicalType::Float64,
    }
}

/// Single-pass grouped aggregation.
pub fn run_group(
    input: &DataChunk,
    group: &GroupBy,
    registry: &FunctionRegistry,
) -> Result<DataChunk> {
    let input_types = input.types();

    // bucket rows; BTreeMap gives deterministic group order
    let mut buckets: BTreeMap<Vec<IndexKey>, Vec<AggState>> = BTreeMap::new();
    for row in input.rows() {
        let key: Vec<IndexKey> = group
            .keys
            .iter()
            .map(|&k| IndexKey::from(row[k].clone()))
            .collect();
        let states = buckets
            .entry(key)
            .or_insert_with(|| group.aggregates.iter().map(AggState::new).collect());
        for (state, expr) in states.iter_mut().zip(&group.aggregates) {
            let value = if matches!(expr.function, AggregateFunction::Count) {
                row.get(expr.column).cloned().unwrap_or(Value::Int64(1))
            } else {
                row.get(expr.column).cloned().unwrap_or(Value::Null)
            };
            state.accumulate(&value);
        }
    }

    // output schema: group keys then aggregates
    let mut output_types: Vec<LogicalType> = group
        .keys
        .iter()
        .map(|&k| input_types[k].clone())
        .collect();
    for expr in &group.aggregates {
        output_types.push(output_type(expr, &input_types));
    }

    let mut output = DataChunk::new(&output_types);
    for (key, states) in buckets {
        let mut row: Vec<Value> = key.into_iter().map(|k| k.0).collect();
        for (state, expr) in states.into_iter().zip(&group.aggregates) {
            let input_type = input_types
                .get(expr.column)
                .cloned()
                .unwrap_or(LogicalType::Int64);
            row.push(state.finalize(expr, &input_type, registry)?);
        }
        output
            .push_row(row)
            .map_err(|e| EngineError::new(ErrorCode::SchemaError, e.to_string()))?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_chunk() -> DataChunk {
        // (group, value): a -> 1, 2, 3; b -> 10, 20
        let mut chunk = DataChunk::new(&[LogicalType::String, LogicalType::Int32]);
        for (g, v) in [("a", 1), ("a", 2), ("a", 3), ("b", 10), ("b", 20)] {
            chunk
                .push_row(vec![Value::String(g.into()), Value::Int32(v)])
                .unwrap();
        }
        chunk
    }

    fn exprs(functions: &[AggregateFunction]) -> Vec<AggregateExpr> {
        functions
            .iter()
            .map(|f| AggregateExpr {
                function: f.clone(),
                column: 1,
            })
            .collect()
    }

    #[test]
    fn grouped_builtins() {
        let chunk = two_column_chunk();
        let registry = FunctionRegistry::new();
        let group = GroupBy {
            keys: vec![0],
            aggregates: exprs(&[
                AggregateFunction::Sum,
                AggregateFunction::Min,
                AggregateFunction::Max,
                AggregateFunction::Count,
                AggregateFunction::Avg,
            ]),
        };
        let out = run_group(&chunk, &group, &registry).unwrap();
        assert_eq!(out.cardinality(), 2);

        // group "a"
        assert_eq!(out.value(0, 0), Value::String("a".into()));
        assert_eq!(out.value(1, 0), Value::Int64(6));
        assert_eq!(out.value(2, 0), Value::Int32(1));
        assert_eq!(out.value(3, 0), Value::Int32(3));
        assert_eq!(out.value(4, 0), Value::Int64(3));
        assert_eq!(out.value(5, 0), Value::Float64(2.0));

        // group "b"
        assert_eq!(out.value(0, 1), Value::String("b".into()));
        assert_eq!(out.value(1, 1), Value::Int64(30));
    }

    #[test]
    fn global_aggregate_without_keys() {
        let chunk = two_column_chunk();
        let registry = FunctionRegistry::new();
        let group = GroupBy {
            keys: vec![],
            aggregates: exprs(&[AggregateFunction::Sum, AggregateFunction::Count]),
        };
        let out = run_group(&chunk, &group, &registry).unwrap();
        assert_eq!(out.cardinality(), 1);
        assert_eq!(out.value(0, 0), Value::Int64(36));
        assert_eq!(out.value(1, 0), Value::Int64(5));
    }

    #[test]
    fn nulls_are_skipped() {
        let mut chunk = DataChunk::new(&[LogicalType::Int64]);
        chunk.push_row(vec![Value::Int64(5)]).unwrap();
        chunk.push_row(vec![Value::Null]).unwrap();
        let registry = FunctionRegistry::new();
        let group = GroupBy {
            keys: vec![],
            aggregates: vec![
                AggregateExpr {
                    function: AggregateFunction::Count,
                    column: 0,
                },
                AggregateExpr {
                    function: AggregateFunction::Min,
                    column: 0,
                },
            ],
        };
        let out = run_group(&chunk, &group, &registry).unwrap();
        assert_eq!(out.value(0, 0), Value::Int64(1));
        assert_eq!(out.value(1, 0), Value::Int64(5));
    }

    #[test]
    fn registered_function() {
        let chunk = two_column_chunk();
        let registry = FunctionRegistry::new();
        registry.register(
            "second_largest",
            Arc::new(|values: &[Value]| {
                let mut nums: Vec<i64> = values.iter().filter_map(|v| v.as_i64()).collect();
                nums.sort_unstable();
                nums.iter()
                    .rev()
                    .nth(1)
                    .map(|&v| Value::Int64(v))
                    .unwrap_or(Value::Null)
            }),
        );
        let group = GroupBy {
            keys: vec![0],
            aggregates: vec![AggregateExpr {
                function: AggregateFunction::Registered("second_largest".into()),
                column: 1,
            }],
        };
        let out = run_group(&chunk, &group, &registry).unwrap();
        // the registered-function column is Float64; integer results coerce
        assert_eq!(out.value(1, 0), Value::Float64(2.0)); // group "a": 1,2,3
        assert_eq!(out.value(1, 1), Value::Float64(10.0)); // group "b": 10,20
    }

    #[test]
    fn sum_promotes_and_narrows() {
        // Int8 inputs accumulate in i64, narrow back when they fit
        let mut chunk = DataChunk::new(&[LogicalType::Int8]);
        for v in [100i8, 100, 100] {
            chunk.push_row(vec![Value::Int8(v)]).unwrap();
        }
        let registry = FunctionRegistry::new();
        let group = GroupBy {
            keys: vec![],
            aggregates: vec![AggregateExpr {
                function: AggregateFunction::Sum,
                column: 0,
            }],
        };
        let out = run_group(&chunk, &group, &registry).unwrap();
        // 300 does not fit an i8: stays wide
        assert_eq!(out.value(0, 0), Value::Int64(300));
    }
}
