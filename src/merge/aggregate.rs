//! GROUP BY aggregation over the globally ordered stream
//!
//! Input arrives sorted by a sequence whose leading columns are exactly the
//! GROUP BY columns, so every group is contiguous and a single open
//! accumulator is enough. Relaxing that ordering would require a keyed
//! table of open groups instead.

use std::str::FromStr;

use serde::Deserialize;

use super::comparator::{compare_values, RowComparator};
use super::errors::{MergeError, MergeResult};
use crate::row::{ColumnSpec, ColumnType, Numeric, Row, Value};

/// Supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum AggregateKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
            AggregateKind::Avg => "AVG",
        }
    }
}

impl FromStr for AggregateKind {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COUNT" => Ok(AggregateKind::Count),
            "SUM" => Ok(AggregateKind::Sum),
            "MIN" => Ok(AggregateKind::Min),
            "MAX" => Ok(AggregateKind::Max),
            "AVG" => Ok(AggregateKind::Avg),
            _ => Err(MergeError::UnsupportedAggregate(s.to_string())),
        }
    }
}

impl TryFrom<String> for AggregateKind {
    type Error = MergeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One aggregate bound to an output column position
///
/// MIN and MAX order their inputs, so a spec read from JSON must state the
/// column `type` for them. COUNT, SUM and AVG default to a numeric type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawAggregateSpec")]
pub struct AggregateSpec {
    pub kind: AggregateKind,
    pub pos: usize,
    pub column_type: ColumnType,
}

#[derive(Deserialize)]
struct RawAggregateSpec {
    function: AggregateKind,
    pos: usize,
    #[serde(rename = "type", default)]
    column_type: Option<ColumnType>,
}

impl TryFrom<RawAggregateSpec> for AggregateSpec {
    type Error = MergeError;

    fn try_from(raw: RawAggregateSpec) -> Result<Self, Self::Error> {
        let column_type = match (raw.function, raw.column_type) {
            (_, Some(column_type)) => column_type,
            (AggregateKind::Min | AggregateKind::Max, None) => {
                return Err(MergeError::invalid_spec(format!(
                    "{} at position {} needs a column type",
                    raw.function.as_str(),
                    raw.pos
                )));
            }
            (_, None) => ColumnType::Decimal,
        };
        Ok(Self {
            kind: raw.function,
            pos: raw.pos,
            column_type,
        })
    }
}

impl AggregateSpec {
    /// Aggregate over a numeric column; use `with_type` for text MIN/MAX
    pub fn new(kind: AggregateKind, pos: usize) -> Self {
        Self {
            kind,
            pos,
            column_type: ColumnType::Decimal,
        }
    }

    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }
}

/// Running state for one aggregate within the open group
#[derive(Debug, Clone)]
enum Accumulator {
    Count(i64),
    Sum(Option<Numeric>),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { sum: Option<Numeric>, count: i64 },
}

impl Accumulator {
    fn new(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Count => Accumulator::Count(0),
            AggregateKind::Sum => Accumulator::Sum(None),
            AggregateKind::Min => Accumulator::Min(None),
            AggregateKind::Max => Accumulator::Max(None),
            AggregateKind::Avg => Accumulator::Avg { sum: None, count: 0 },
        }
    }

    fn fold(&mut self, value: &Value, spec: &AggregateSpec) -> MergeResult<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(sum) => {
                let v = numeric_operand(value, spec)?;
                *sum = Some(sum.map_or(v, |s| s.add(v)));
            }
            Accumulator::Avg { sum, count } => {
                let v = numeric_operand(value, spec)?;
                *sum = Some(sum.map_or(v, |s| s.add(v)));
                *count += 1;
            }
            Accumulator::Min(current) => {
                let replace = current.as_ref().map_or(true, |c| {
                    compare_values(value, c, spec.column_type) == std::cmp::Ordering::Less
                });
                if replace {
                    *current = Some(value.clone());
                }
            }
            Accumulator::Max(current) => {
                let replace = current.as_ref().map_or(true, |c| {
                    compare_values(value, c, spec.column_type) == std::cmp::Ordering::Greater
                });
                if replace {
                    *current = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Int(n),
            Accumulator::Sum(sum) => sum.map_or(Value::Null, Numeric::into_value),
            Accumulator::Min(v) | Accumulator::Max(v) => v.unwrap_or(Value::Null),
            Accumulator::Avg { sum, count } => match sum {
                Some(s) if count > 0 => Value::Float(s.as_f64() / count as f64),
                _ => Value::Null,
            },
        }
    }
}

fn numeric_operand(value: &Value, spec: &AggregateSpec) -> MergeResult<Numeric> {
    value.as_numeric().ok_or_else(|| {
        MergeError::data_integrity(format!(
            "non-numeric {} value {} in {} at column {}",
            value.type_name(),
            value,
            spec.kind.as_str(),
            spec.pos
        ))
    })
}

#[derive(Debug)]
struct OpenGroup {
    first: Row,
    accumulators: Vec<Accumulator>,
}

/// Folds an ordered row stream into one row per group.
///
/// The output row is the first row of the group with every aggregate
/// position replaced by its folded value.
#[derive(Debug)]
pub struct GroupAggregator {
    group_key: RowComparator,
    aggregates: Vec<AggregateSpec>,
    width: usize,
    current: Option<OpenGroup>,
    groups_flushed: u64,
}

impl GroupAggregator {
    pub fn new(group_by: &[ColumnSpec], aggregates: &[AggregateSpec], width: usize) -> Self {
        Self {
            group_key: RowComparator::new(group_by),
            aggregates: aggregates.to_vec(),
            width,
            current: None,
            groups_flushed: 0,
        }
    }

    /// Adds the next row; returns the previous group when its boundary closes.
    pub fn push(&mut self, row: Row) -> MergeResult<Option<Row>> {
        if let Some(group) = self.current.as_mut() {
            if self.group_key.keys_equal(&group.first, &row) {
                fold_row(&mut group.accumulators, &self.aggregates, &row)?;
                return Ok(None);
            }
        }

        let flushed = self.flush();
        let mut accumulators: Vec<Accumulator> =
            self.aggregates.iter().map(|a| Accumulator::new(a.kind)).collect();
        fold_row(&mut accumulators, &self.aggregates, &row)?;
        self.current = Some(OpenGroup {
            first: row,
            accumulators,
        });
        Ok(flushed)
    }

    /// End of stream: flushes the open group.
    ///
    /// Without GROUP BY the input is one implicit group, so an empty input
    /// still yields a row (NULL everywhere except COUNT = 0).
    pub fn finish(&mut self) -> Option<Row> {
        if let Some(row) = self.flush() {
            return Some(row);
        }
        if self.group_key.is_empty() && self.groups_flushed == 0 {
            let empty = Row::new(vec![Value::Null; self.width]);
            let replacements: Vec<(usize, Value)> = self
                .aggregates
                .iter()
                .map(|a| (a.pos, Accumulator::new(a.kind).finish()))
                .collect();
            self.groups_flushed += 1;
            return Some(empty.with_replaced(replacements));
        }
        None
    }

    /// Drops any open group without emitting it
    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn groups_flushed(&self) -> u64 {
        self.groups_flushed
    }

    fn flush(&mut self) -> Option<Row> {
        let group = self.current.take()?;
        self.groups_flushed += 1;
        let replacements: Vec<(usize, Value)> = self
            .aggregates
            .iter()
            .zip(group.accumulators)
            .map(|(spec, acc)| (spec.pos, acc.finish()))
            .collect();
        Some(group.first.with_replaced(replacements))
    }
}

fn fold_row(accumulators: &mut [Accumulator], aggregates: &[AggregateSpec], row: &Row) -> MergeResult<()> {
    for (spec, acc) in aggregates.iter().zip(accumulators.iter_mut()) {
        acc.fold(row.get_or_null(spec.pos), spec)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(values: Vec<Value>) -> Row {
        Row::new(values)
    }

    fn ints(a: i64, b: i64) -> Row {
        row(vec![Value::Int(a), Value::Int(b)])
    }

    fn run(agg: &mut GroupAggregator, input: Vec<Row>) -> Vec<Row> {
        let mut out = Vec::new();
        for r in input {
            if let Some(flushed) = agg.push(r).unwrap() {
                out.push(flushed);
            }
        }
        out.extend(agg.finish());
        out
    }

    #[test]
    fn test_group_sum() {
        let mut agg = GroupAggregator::new(
            &[ColumnSpec::asc("k", ColumnType::Integer, 0)],
            &[AggregateSpec::new(AggregateKind::Sum, 1)],
            2,
        );
        let out = run(&mut agg, vec![ints(1, 10), ints(1, 5), ints(2, 7)]);
        assert_eq!(out, vec![ints(1, 15), ints(2, 7)]);
        assert_eq!(agg.groups_flushed(), 2);
    }

    #[test]
    fn test_all_kinds() {
        let group_by = [ColumnSpec::asc("k", ColumnType::Integer, 0)];
        let aggregates = [
            AggregateSpec::new(AggregateKind::Count, 1),
            AggregateSpec::new(AggregateKind::Min, 2),
            AggregateSpec::new(AggregateKind::Max, 3),
            AggregateSpec::new(AggregateKind::Avg, 4),
        ];
        let mut agg = GroupAggregator::new(&group_by, &aggregates, 5);
        let r = |c: Value, v: i64| {
            row(vec![Value::Int(1), c, Value::Int(v), Value::Int(v), Value::Int(v)])
        };
        let out = run(&mut agg, vec![r(Value::Int(1), 4), r(Value::Null, 2), r(Value::Int(1), 9)]);

        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].values(),
            &[Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(9), Value::Float(5.0)]
        );
    }

    #[test]
    fn test_min_uses_numeric_order_for_strings() {
        let mut agg = GroupAggregator::new(&[], &[AggregateSpec::new(AggregateKind::Min, 0)], 1);
        let out = run(&mut agg, vec![row(vec!["10".into()]), row(vec!["9".into()])]);
        assert_eq!(out, vec![row(vec!["9".into()])]);
    }

    #[test]
    fn test_implicit_group_on_empty_input() {
        let mut agg = GroupAggregator::new(
            &[],
            &[
                AggregateSpec::new(AggregateKind::Count, 0),
                AggregateSpec::new(AggregateKind::Sum, 1),
            ],
            2,
        );
        let out = run(&mut agg, vec![]);
        assert_eq!(out, vec![row(vec![Value::Int(0), Value::Null])]);
        // Only one implicit row
        assert_eq!(agg.finish(), None);
    }

    #[test]
    fn test_sum_rejects_text() {
        let mut agg = GroupAggregator::new(&[], &[AggregateSpec::new(AggregateKind::Sum, 0)], 1);
        let err = agg.push(row(vec!["abc".into()])).unwrap_err();
        assert_eq!(err.code(), "MERGE_DATA_INTEGRITY");
    }

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        let err = "MEDIAN".parse::<AggregateKind>().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!("avg".parse::<AggregateKind>().unwrap(), AggregateKind::Avg);

        let parsed: Result<AggregateSpec, _> =
            serde_json::from_value(json!({"function": "stddev", "pos": 1}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_min_max_need_a_type() {
        let parsed: Result<AggregateSpec, _> =
            serde_json::from_value(json!({"function": "max", "pos": 1}));
        assert!(parsed.unwrap_err().to_string().contains("needs a column type"));

        let spec: AggregateSpec =
            serde_json::from_value(json!({"function": "min", "pos": 1, "type": "varchar"}))
                .unwrap();
        assert_eq!(spec.column_type, ColumnType::String);

        let spec: AggregateSpec = serde_json::from_value(json!({"function": "sum", "pos": 1}))
            .unwrap();
        assert_eq!(spec.column_type, ColumnType::Decimal);
    }

    #[test]
    fn test_text_min_max_order_bytewise() {
        let aggregates = [
            AggregateSpec::new(AggregateKind::Min, 0).with_type(ColumnType::String),
            AggregateSpec::new(AggregateKind::Max, 1).with_type(ColumnType::String),
        ];
        let mut agg = GroupAggregator::new(&[], &aggregates, 2);
        let out = run(
            &mut agg,
            vec![
                row(vec!["apple".into(), "apple".into()]),
                row(vec!["10".into(), "10".into()]),
                row(vec!["9".into(), "9".into()]),
            ],
        );
        assert_eq!(out, vec![row(vec!["10".into(), "apple".into()])]);
    }
}
