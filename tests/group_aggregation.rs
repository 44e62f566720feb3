//! Cross-Shard Aggregation Tests
//!
//! Tests must prove that GROUP BY folds rows from every shard into exactly
//! one output row per key, and that HAVING filters the folded rows.
//!
//! Test Categories:
//! 1. Group uniqueness and exact aggregates
//! 2. Implicit single group
//! 3. HAVING
//! 4. Group/order coupling

use std::collections::{BTreeMap, HashSet};

use shardmerge::config::MergeConfig;
use shardmerge::merge::{
    AggregateKind, AggregateSpec, CompareOp, HavingExpr, MergeDriver, MergeError, MergePoll,
    MergeSpec, MergeStatus, ShardStream,
};
use shardmerge::row::{ColumnSpec, ColumnType, Row, Value};

fn ints(values: &[i64]) -> Row {
    Row::new(values.iter().map(|&v| Value::Int(v)).collect())
}

fn grouped_sum() -> MergeSpec {
    MergeSpec::new(2)
        .with_group_by(ColumnSpec::asc("k", ColumnType::Integer, 0))
        .with_aggregate(AggregateSpec::new(AggregateKind::Sum, 1))
}

fn run(spec: MergeSpec, streams: Vec<ShardStream>) -> Result<Vec<Row>, MergeError> {
    let mut driver = MergeDriver::new(spec, streams, &MergeConfig::default())?;
    match driver.poll() {
        MergePoll::Done(status) => {
            status.into_result()?;
            Ok(driver.take_output().drain())
        }
        other => panic!("merge did not finish: {:?}", other),
    }
}

// =============================================================================
// GROUP UNIQUENESS AND EXACT AGGREGATES
// =============================================================================

/// Test: SUM over (1,10), (1,5), (2,7) yields (1,15), (2,7).
#[test]
fn test_group_sum_scenario() {
    let streams = vec![
        ShardStream::from_rows(0, vec![ints(&[1, 10]), ints(&[2, 7])]),
        ShardStream::from_rows(1, vec![ints(&[1, 5])]),
    ];
    assert_eq!(
        run(grouped_sum(), streams).unwrap(),
        vec![ints(&[1, 15]), ints(&[2, 7])]
    );
}

/// Test: Every output key is unique and every aggregate matches a direct computation.
#[test]
fn test_groups_unique_and_exact() {
    let spec = MergeSpec::new(6)
        .with_group_by(ColumnSpec::asc("k", ColumnType::Integer, 0))
        .with_aggregate(AggregateSpec::new(AggregateKind::Count, 1))
        .with_aggregate(AggregateSpec::new(AggregateKind::Sum, 2))
        .with_aggregate(AggregateSpec::new(AggregateKind::Min, 3).with_type(ColumnType::Integer))
        .with_aggregate(AggregateSpec::new(AggregateKind::Max, 4).with_type(ColumnType::Integer))
        .with_aggregate(AggregateSpec::new(AggregateKind::Avg, 5));

    // key k on shard s carries value v in every aggregate column
    let mut expected: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    let mut streams = Vec::new();
    for shard in 0..4i64 {
        let mut rows = Vec::new();
        for k in 0..10i64 {
            if (k + shard) % 3 == 0 {
                continue;
            }
            let v = k * 10 + shard;
            expected.entry(k).or_default().push(v);
            rows.push(ints(&[k, v, v, v, v, v]));
        }
        streams.push(ShardStream::from_rows(shard as usize, rows));
    }

    let out = run(spec, streams).unwrap();
    let mut seen = HashSet::new();
    assert_eq!(out.len(), expected.len());
    for row in &out {
        let Value::Int(k) = row.get_or_null(0).clone() else {
            panic!("group key must be an integer");
        };
        assert!(seen.insert(k), "group key {} emitted twice", k);

        let values = &expected[&k];
        let sum: i64 = values.iter().sum();
        assert_eq!(row.get_or_null(1), &Value::Int(values.len() as i64));
        assert_eq!(row.get_or_null(2), &Value::Int(sum));
        assert_eq!(row.get_or_null(3), &Value::Int(*values.iter().min().unwrap()));
        assert_eq!(row.get_or_null(4), &Value::Int(*values.iter().max().unwrap()));
        assert_eq!(
            row.get_or_null(5),
            &Value::Float(sum as f64 / values.len() as f64)
        );
    }
}

/// Test: COUNT ignores NULL, SUM of only NULL is NULL.
#[test]
fn test_nulls_in_aggregates() {
    let spec = MergeSpec::new(3)
        .with_group_by(ColumnSpec::asc("k", ColumnType::Integer, 0))
        .with_aggregate(AggregateSpec::new(AggregateKind::Count, 1))
        .with_aggregate(AggregateSpec::new(AggregateKind::Sum, 2));
    let row = |k: i64, a: Value, b: Value| Row::new(vec![Value::Int(k), a, b]);
    let streams = vec![
        ShardStream::from_rows(0, vec![row(1, Value::Int(1), Value::Null)]),
        ShardStream::from_rows(1, vec![row(1, Value::Null, Value::Null)]),
    ];
    assert_eq!(
        run(spec, streams).unwrap(),
        vec![row(1, Value::Int(1), Value::Null)]
    );
}

/// Test: A non-numeric value under SUM is a data-integrity error and nothing is delivered.
#[test]
fn test_non_numeric_sum_fails() {
    let streams = vec![ShardStream::from_rows(
        0,
        vec![Row::new(vec![Value::Int(1), Value::from("abc")])],
    )];
    let err = run(grouped_sum(), streams).unwrap_err();
    assert_eq!(err.code(), "MERGE_DATA_INTEGRITY");
}

// =============================================================================
// IMPLICIT SINGLE GROUP
// =============================================================================

/// Test: Aggregates without GROUP BY fold the whole input into one row.
#[test]
fn test_implicit_group() {
    let spec = MergeSpec::new(2)
        .with_aggregate(AggregateSpec::new(AggregateKind::Max, 0).with_type(ColumnType::Integer))
        .with_aggregate(AggregateSpec::new(AggregateKind::Sum, 1));
    let streams = vec![
        ShardStream::from_rows(0, vec![ints(&[3, 1]), ints(&[8, 2])]),
        ShardStream::from_rows(1, vec![ints(&[5, 4])]),
    ];
    assert_eq!(run(spec, streams).unwrap(), vec![ints(&[8, 7])]);
}

/// Test: With no input rows the implicit group still yields COUNT = 0.
#[test]
fn test_implicit_group_empty_input() {
    let spec = MergeSpec::new(2)
        .with_aggregate(AggregateSpec::new(AggregateKind::Count, 0))
        .with_aggregate(AggregateSpec::new(AggregateKind::Sum, 1));
    let streams = vec![ShardStream::from_rows(0, vec![]), ShardStream::from_rows(1, vec![])];
    assert_eq!(
        run(spec, streams).unwrap(),
        vec![Row::new(vec![Value::Int(0), Value::Null])]
    );
}

/// Test: With GROUP BY and no input rows there is no output.
#[test]
fn test_grouped_empty_input() {
    let streams = vec![ShardStream::from_rows(0, vec![])];
    assert!(run(grouped_sum(), streams).unwrap().is_empty());
}

// =============================================================================
// HAVING
// =============================================================================

/// Test: HAVING SUM(col2) > 10 keeps only (1,15).
#[test]
fn test_having_after_aggregation() {
    let spec = grouped_sum().with_having(HavingExpr::gt(1, 10i64));
    let streams = vec![
        ShardStream::from_rows(0, vec![ints(&[1, 10]), ints(&[2, 7])]),
        ShardStream::from_rows(1, vec![ints(&[1, 5])]),
    ];
    assert_eq!(run(spec, streams).unwrap(), vec![ints(&[1, 15])]);
}

/// Test: HAVING is applied before LIMIT counts rows.
#[test]
fn test_having_before_limit() {
    let spec = grouped_sum()
        .with_having(HavingExpr::compare(1, CompareOp::Ge, 5i64))
        .with_limit(1, 1);
    let streams = vec![ShardStream::from_rows(
        0,
        vec![ints(&[1, 1]), ints(&[2, 5]), ints(&[3, 2]), ints(&[4, 9]), ints(&[5, 6])],
    )];
    assert_eq!(run(spec, streams).unwrap(), vec![ints(&[4, 9])]);
}

/// Test: A comparison against a NULL aggregate is unknown and the row is dropped, even under NOT.
#[test]
fn test_having_null_is_unknown() {
    let spec = grouped_sum().with_having(HavingExpr::not(HavingExpr::gt(1, 10i64)));
    let streams = vec![ShardStream::from_rows(
        0,
        vec![Row::new(vec![Value::Int(1), Value::Null]), ints(&[2, 3])],
    )];
    assert_eq!(run(spec, streams).unwrap(), vec![ints(&[2, 3])]);
}

// =============================================================================
// GROUP/ORDER COUPLING
// =============================================================================

/// Test: A single open accumulator is only sound when groups lead the sort order.
#[test]
fn test_group_columns_must_lead_order() {
    let spec = grouped_sum().with_order_by(ColumnSpec::asc("v", ColumnType::Integer, 1));
    let err = MergeDriver::new(spec, vec![ShardStream::new(0)], &MergeConfig::default())
        .unwrap_err();
    assert!(err.is_configuration());
}

fn text_key_row(key: &str, v: i64) -> Row {
    Row::new(vec![Value::from(key), Value::Int(v)])
}

/// Test: A group key typed differently from its sort column is rejected up front.
#[test]
fn test_group_type_differing_from_order_type_rejected() {
    let spec = MergeSpec::new(2)
        .with_order_by(ColumnSpec::asc("k", ColumnType::Integer, 0))
        .with_group_by(ColumnSpec::asc("k", ColumnType::String, 0))
        .with_aggregate(AggregateSpec::new(AggregateKind::Sum, 1));
    let streams = vec![
        ShardStream::from_rows(0, vec![text_key_row("1", 1), text_key_row("1", 3)]),
        ShardStream::from_rows(1, vec![text_key_row("01", 2)]),
    ];
    let err = run(spec, streams).unwrap_err();
    assert!(err.is_configuration());
}

/// Test: Keys that sort as equal numbers fold into one group.
#[test]
fn test_numeric_key_spellings_fold_together() {
    let spec = MergeSpec::new(2)
        .with_order_by(ColumnSpec::asc("k", ColumnType::Integer, 0))
        .with_group_by(ColumnSpec::asc("k", ColumnType::Integer, 0))
        .with_aggregate(AggregateSpec::new(AggregateKind::Sum, 1));
    let streams = vec![
        ShardStream::from_rows(0, vec![text_key_row("1", 1), text_key_row("1", 3)]),
        ShardStream::from_rows(1, vec![text_key_row("01", 2)]),
    ];
    let out = run(spec, streams).unwrap();
    assert_eq!(out, vec![text_key_row("1", 6)]);
}

/// Test: Shards that interleave keys still produce one row per key when sorted by the key.
#[test]
fn test_interleaved_shards_fold_once() {
    let streams = vec![
        ShardStream::from_rows(0, vec![ints(&[1, 1]), ints(&[2, 1]), ints(&[3, 1])]),
        ShardStream::from_rows(1, vec![ints(&[1, 2]), ints(&[2, 2]), ints(&[3, 2])]),
        ShardStream::from_rows(2, vec![ints(&[2, 4])]),
    ];
    assert_eq!(
        run(grouped_sum(), streams).unwrap(),
        vec![ints(&[1, 3]), ints(&[2, 7]), ints(&[3, 3])]
    );
}

/// Test: Identical partial rows from different shards all contribute to the group.
#[test]
fn test_identical_rows_are_not_suppressed_before_aggregation() {
    let streams = vec![
        ShardStream::from_rows(0, vec![ints(&[1, 5])]),
        ShardStream::from_rows(1, vec![ints(&[1, 5])]),
        ShardStream::from_rows(2, vec![ints(&[1, 5])]),
    ];
    assert_eq!(run(grouped_sum(), streams).unwrap(), vec![ints(&[1, 15])]);
}

/// Test: A group split across shards by a failed shard is never partially delivered.
#[test]
fn test_failure_mid_group_delivers_nothing() {
    let mut failing = ShardStream::new(1);
    failing.push_row(ints(&[1, 5]));
    failing.fail("disk error");
    let streams = vec![ShardStream::from_rows(0, vec![ints(&[1, 10])]), failing];
    let mut driver = MergeDriver::new(grouped_sum(), streams, &MergeConfig::default()).unwrap();
    assert!(matches!(driver.poll(), MergePoll::Done(MergeStatus::Failed(_))));
    assert!(driver.take_output().drain().is_empty());
}
