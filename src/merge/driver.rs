//! Merge driver
//!
//! Wires the pipeline for one fan-out:
//!
//! ```text
//! shard streams -> heap merge -> [group aggregator] -> [HAVING] -> LIMIT -> output queue
//! ```
//!
//! The driver is pull-based and never blocks. Each `poll` advances the
//! pipeline as far as buffered shard data allows, then returns `NotReady`
//! or the terminal status. The terminal status is delivered exactly once.
//!
//! # Fail-closed
//!
//! Output rows are staged. They become visible only when the merge succeeds
//! (or, for a transactional query, when the consistency check passes). Any
//! error or abort discards everything staged.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::aggregate::GroupAggregator;
use super::comparator::RowComparator;
use super::errors::{MergeError, MergeResult};
use super::having::HavingExpr;
use super::heap::{HeapMerger, HeapOptions, HeapPull};
use super::limit::{LimitDecision, LimitEnforcer};
use super::output::OutputQueue;
use super::spec::{MergeSpec, MAX_SHARD_NUM};
use super::stream::{ShardState, ShardStream};
use crate::config::{FailurePolicy, MergeConfig};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::row::Row;

/// Counters for one finished merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub merge_id: Uuid,
    /// Rows taken from the heap after duplicate suppression
    pub rows_merged: u64,
    /// Rows staged in the output queue
    pub rows_emitted: u64,
    pub duplicates_suppressed: u64,
    pub groups_flushed: u64,
    /// Shards dropped under the skip policy
    pub skipped_shards: Vec<usize>,
    /// LIMIT filled before every shard was drained
    pub early_terminated: bool,
    /// Output waits for a transaction consistency check
    pub held_for_txn: bool,
}

/// Terminal status of a merge
#[derive(Debug, Clone, PartialEq)]
pub enum MergeStatus {
    Success(MergeSummary),
    Failed(MergeError),
    Aborted { reason: String },
}

impl MergeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, MergeStatus::Success(_))
    }

    pub fn into_result(self) -> MergeResult<MergeSummary> {
        match self {
            MergeStatus::Success(summary) => Ok(summary),
            MergeStatus::Failed(err) => Err(err),
            MergeStatus::Aborted { reason } => Err(MergeError::Aborted(reason)),
        }
    }
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq)]
pub enum MergePoll {
    /// Waiting on shard data
    NotReady,
    /// The merge just ended
    Done(MergeStatus),
    /// The terminal status was already delivered
    Closed,
}

/// Drives one merge from shard streams to the output queue
#[derive(Debug)]
pub struct MergeDriver {
    merge_id: Uuid,
    streams: Vec<ShardStream>,
    heap: HeapMerger,
    aggregator: Option<GroupAggregator>,
    having: Option<HavingExpr>,
    limit: LimitEnforcer,
    output: OutputQueue,
    failure_policy: FailurePolicy,
    hold_for_txn: bool,
    finished: bool,
    rows_merged: u64,
    rows_emitted: u64,
    early_terminated: bool,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl MergeDriver {
    /// Validates the merge spec against the streams and prepares the pipeline.
    ///
    /// Nothing is pulled here; configuration errors leave the streams untouched.
    pub fn new(
        spec: MergeSpec,
        streams: Vec<ShardStream>,
        config: &MergeConfig,
    ) -> MergeResult<Self> {
        let spec = spec.validate()?;

        if streams.is_empty() {
            return Err(MergeError::invalid_spec("a merge needs at least one shard stream"));
        }
        let max_shards = config.max_shards.min(MAX_SHARD_NUM);
        if streams.len() > max_shards {
            return Err(MergeError::TooManyShards {
                count: streams.len(),
                max: max_shards,
            });
        }
        for stream in &streams {
            if let Some(field_index) = stream.field_index() {
                if field_index.len() != spec.width {
                    return Err(MergeError::invalid_spec(format!(
                        "shard {} field index has {} entries, row width is {}",
                        stream.shard_id(),
                        field_index.len(),
                        spec.width
                    )));
                }
            }
        }

        // Identical rows feeding an aggregate are separate contributions
        let heap = HeapMerger::new(
            RowComparator::new(&spec.order_by),
            streams.len(),
            HeapOptions {
                width: spec.width,
                suppress_duplicates: config.suppress_duplicates && !spec.has_aggregation(),
                failure_policy: config.failure_policy,
            },
        );
        let aggregator = spec
            .has_aggregation()
            .then(|| GroupAggregator::new(&spec.group_by, &spec.aggregates, spec.width));

        let driver = Self {
            merge_id: Uuid::new_v4(),
            heap,
            aggregator,
            having: spec.having,
            limit: LimitEnforcer::new(spec.limit),
            output: OutputQueue::new(),
            failure_policy: config.failure_policy,
            hold_for_txn: false,
            finished: false,
            rows_merged: 0,
            rows_emitted: 0,
            early_terminated: false,
            metrics: None,
            streams,
        };

        log_event(
            Event::MergeStart,
            &[
                ("merge_id", &driver.merge_id.to_string()),
                ("shards", &driver.streams.len().to_string()),
                ("policy", driver.failure_policy.as_str()),
            ],
        );
        Ok(driver)
    }

    /// Reports this merge to a shared counter registry
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        metrics.increment_merges_started();
        self.metrics = Some(metrics);
        self
    }

    /// Keeps the output held on success until a transaction check settles it
    pub fn hold_for_transaction(mut self) -> Self {
        self.hold_for_txn = true;
        self
    }

    pub fn merge_id(&self) -> Uuid {
        self.merge_id
    }

    pub fn shard_count(&self) -> usize {
        self.streams.len()
    }

    /// Stream at `slot`, for the I/O layer to feed
    pub fn shard_mut(&mut self, slot: usize) -> Option<&mut ShardStream> {
        self.streams.get_mut(slot)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn output(&self) -> &OutputQueue {
        &self.output
    }

    /// Mutable output, for the transaction check
    pub fn output_mut(&mut self) -> &mut OutputQueue {
        &mut self.output
    }

    /// Hands the output queue over to the consumer
    pub fn take_output(&mut self) -> OutputQueue {
        std::mem::take(&mut self.output)
    }

    /// Advances the merge as far as buffered data allows
    pub fn poll(&mut self) -> MergePoll {
        if self.finished {
            return MergePoll::Closed;
        }

        if self.failure_policy == FailurePolicy::FailFast {
            let failed = self.streams.iter().find_map(|s| match s.state() {
                ShardState::Failed(reason) => Some(MergeError::shard_failed(s.shard_id(), reason.clone())),
                _ => None,
            });
            if let Some(err) = failed {
                return MergePoll::Done(self.fail(err));
            }
        }

        if self.limit.is_satisfied() {
            return MergePoll::Done(self.terminate_early());
        }

        match self.advance() {
            Ok(None) => MergePoll::NotReady,
            Ok(Some(status)) => MergePoll::Done(status),
            Err(err) => MergePoll::Done(self.fail(err)),
        }
    }

    /// Cancels the merge. Returns `None` if it had already ended.
    pub fn abort(&mut self, reason: impl Into<String>) -> Option<MergeStatus> {
        if self.finished {
            return None;
        }
        let reason = reason.into();
        self.finished = true;
        self.heap.cancel_remaining(&mut self.streams);
        if let Some(aggregator) = self.aggregator.as_mut() {
            aggregator.clear();
        }
        self.output.discard();

        log_event(
            Event::MergeAborted,
            &[("merge_id", &self.merge_id.to_string()), ("reason", &reason)],
        );
        if let Some(metrics) = &self.metrics {
            metrics.increment_merges_aborted();
        }
        Some(MergeStatus::Aborted { reason })
    }

    fn advance(&mut self) -> MergeResult<Option<MergeStatus>> {
        loop {
            match self.heap.pull(&mut self.streams)? {
                HeapPull::NotReady => return Ok(None),
                HeapPull::Exhausted => {
                    let last = self.aggregator.as_mut().and_then(GroupAggregator::finish);
                    if let Some(row) = last {
                        self.emit(row);
                    }
                    return Ok(Some(self.complete()));
                }
                HeapPull::Row { row, .. } => {
                    self.rows_merged += 1;
                    let ready = match self.aggregator.as_mut() {
                        Some(aggregator) => aggregator.push(row)?,
                        None => Some(row),
                    };
                    if let Some(row) = ready {
                        if self.emit(row) {
                            return Ok(Some(self.terminate_early()));
                        }
                    }
                }
            }
        }
    }

    /// HAVING, then LIMIT, then staging. Returns true once the window is full.
    fn emit(&mut self, row: Row) -> bool {
        if let Some(having) = &self.having {
            if !having.matches(&row) {
                return false;
            }
        }
        match self.limit.offer() {
            LimitDecision::Skip => false,
            LimitDecision::Emit => {
                self.output.push(row);
                self.rows_emitted += 1;
                self.limit.is_satisfied()
            }
            LimitDecision::Done => true,
        }
    }

    fn terminate_early(&mut self) -> MergeStatus {
        if !self.heap.is_over() {
            let cancelled = self.heap.cancel_remaining(&mut self.streams);
            self.early_terminated = true;
            log_event(
                Event::LimitReached,
                &[
                    ("merge_id", &self.merge_id.to_string()),
                    ("rows", &self.rows_emitted.to_string()),
                ],
            );
            log_event(
                Event::ShardsCancelled,
                &[
                    ("merge_id", &self.merge_id.to_string()),
                    ("count", &cancelled.to_string()),
                ],
            );
        }
        if let Some(aggregator) = self.aggregator.as_mut() {
            aggregator.clear();
        }
        self.complete()
    }

    fn complete(&mut self) -> MergeStatus {
        self.finished = true;
        if self.hold_for_txn {
            self.output.hold();
        } else {
            self.output.release();
        }

        let summary = self.summary();
        log_event(
            Event::MergeComplete,
            &[
                ("merge_id", &self.merge_id.to_string()),
                ("rows_merged", &summary.rows_merged.to_string()),
                ("rows_emitted", &summary.rows_emitted.to_string()),
                ("held", if summary.held_for_txn { "true" } else { "false" }),
            ],
        );
        if let Some(metrics) = &self.metrics {
            metrics.increment_merges_completed();
            metrics.record_rows(
                summary.rows_merged,
                summary.rows_emitted,
                summary.duplicates_suppressed,
                summary.groups_flushed,
            );
            metrics.add_shards_skipped(summary.skipped_shards.len() as u64);
        }
        MergeStatus::Success(summary)
    }

    fn fail(&mut self, err: MergeError) -> MergeStatus {
        self.finished = true;
        self.heap.cancel_remaining(&mut self.streams);
        if let Some(aggregator) = self.aggregator.as_mut() {
            aggregator.clear();
        }
        self.output.discard();

        if let MergeError::ShardFailed { shard, reason } = &err {
            log_event(
                Event::ShardFailed,
                &[("shard", &shard.to_string()), ("reason", reason)],
            );
        }
        log_event(
            Event::MergeFailed,
            &[
                ("merge_id", &self.merge_id.to_string()),
                ("code", err.code()),
                ("error", &err.to_string()),
            ],
        );
        if let Some(metrics) = &self.metrics {
            metrics.increment_merges_failed();
        }
        MergeStatus::Failed(err)
    }

    fn summary(&self) -> MergeSummary {
        MergeSummary {
            merge_id: self.merge_id,
            rows_merged: self.rows_merged,
            rows_emitted: self.rows_emitted,
            duplicates_suppressed: self.heap.duplicates_suppressed(),
            groups_flushed: self
                .aggregator
                .as_ref()
                .map_or(0, GroupAggregator::groups_flushed),
            skipped_shards: self.heap.skipped_shards().to_vec(),
            early_terminated: self.early_terminated,
            held_for_txn: self.hold_for_txn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::aggregate::{AggregateKind, AggregateSpec};
    use crate::merge::output::OutputState;
    use crate::row::{ColumnSpec, ColumnType, Value};

    fn pair(n: i64, s: &str) -> Row {
        Row::new(vec![Value::Int(n), Value::from(s)])
    }

    fn ordered_spec() -> MergeSpec {
        MergeSpec::new(2).with_order_by(ColumnSpec::asc("n", ColumnType::Integer, 0))
    }

    fn run(driver: &mut MergeDriver) -> MergeStatus {
        match driver.poll() {
            MergePoll::Done(status) => status,
            other => panic!("merge did not finish: {:?}", other),
        }
    }

    #[test]
    fn test_simple_merge_releases_output() {
        let streams = vec![
            ShardStream::from_rows(0, vec![pair(1, "a"), pair(4, "d")]),
            ShardStream::from_rows(1, vec![pair(2, "b"), pair(3, "c")]),
        ];
        let mut driver = MergeDriver::new(ordered_spec(), streams, &MergeConfig::default()).unwrap();
        let summary = run(&mut driver).into_result().unwrap();

        assert_eq!(summary.rows_merged, 4);
        assert_eq!(summary.rows_emitted, 4);
        assert!(!summary.early_terminated);
        assert_eq!(
            driver.take_output().drain(),
            vec![pair(1, "a"), pair(2, "b"), pair(3, "c"), pair(4, "d")]
        );
        assert_eq!(driver.poll(), MergePoll::Closed);
    }

    #[test]
    fn test_not_ready_then_done() {
        let mut driver = MergeDriver::new(
            ordered_spec(),
            vec![ShardStream::new(0), ShardStream::new(1)],
            &MergeConfig::default(),
        )
        .unwrap();
        assert_eq!(driver.poll(), MergePoll::NotReady);

        driver.shard_mut(0).unwrap().push_row(pair(2, "b"));
        driver.shard_mut(0).unwrap().finish();
        assert_eq!(driver.poll(), MergePoll::NotReady);
        assert!(driver.output().is_empty());

        driver.shard_mut(1).unwrap().push_row(pair(1, "a"));
        driver.shard_mut(1).unwrap().finish();
        assert!(run(&mut driver).is_success());
        assert_eq!(driver.take_output().drain(), vec![pair(1, "a"), pair(2, "b")]);
    }

    #[test]
    fn test_shard_failure_discards_staged_rows() {
        let mut driver = MergeDriver::new(
            ordered_spec(),
            vec![ShardStream::from_rows(0, vec![pair(1, "a")]), ShardStream::new(1)],
            &MergeConfig::default(),
        )
        .unwrap();
        driver.shard_mut(1).unwrap().push_row(pair(2, "b"));
        assert_eq!(driver.poll(), MergePoll::NotReady);
        assert_eq!(driver.output().len(), 2);

        driver.shard_mut(1).unwrap().fail("connection reset");
        let status = run(&mut driver);
        assert_eq!(status, MergeStatus::Failed(MergeError::shard_failed(1, "connection reset")));
        assert_eq!(driver.output().state(), OutputState::Discarded);
        assert!(driver.output().is_empty());
    }

    #[test]
    fn test_abort() {
        let metrics = Arc::new(MetricsRegistry::new());
        let mut driver = MergeDriver::new(
            ordered_spec(),
            vec![ShardStream::from_rows(0, vec![pair(1, "a")]), ShardStream::new(1)],
            &MergeConfig::default(),
        )
        .unwrap()
        .with_metrics(Arc::clone(&metrics));
        assert_eq!(driver.poll(), MergePoll::NotReady);

        let status = driver.abort("client disconnected").unwrap();
        assert_eq!(
            status.into_result().unwrap_err(),
            MergeError::Aborted("client disconnected".into())
        );
        assert!(driver.shard_mut(1).unwrap().is_cancelled());
        assert!(driver.output().is_empty());
        assert_eq!(driver.abort("again"), None);
        assert_eq!(driver.poll(), MergePoll::Closed);
        assert_eq!(metrics.snapshot().merges_aborted, 1);
    }

    #[test]
    fn test_limit_terminates_early() {
        let streams = vec![
            ShardStream::from_rows(0, vec![pair(1, "a"), pair(3, "c")]),
            ShardStream::new(1),
        ];
        let spec = ordered_spec().with_limit(0, 1);
        let mut driver = MergeDriver::new(spec, streams, &MergeConfig::default()).unwrap();
        driver.shard_mut(1).unwrap().push_row(pair(2, "b"));

        let summary = run(&mut driver).into_result().unwrap();
        assert!(summary.early_terminated);
        assert!(driver.shard_mut(1).unwrap().is_cancelled());
        assert_eq!(driver.take_output().drain(), vec![pair(1, "a")]);
    }

    #[test]
    fn test_limit_zero() {
        let spec = ordered_spec().with_limit(0, 0);
        let mut driver =
            MergeDriver::new(spec, vec![ShardStream::new(0)], &MergeConfig::default()).unwrap();
        assert!(run(&mut driver).is_success());
        assert!(driver.output().is_released());
        assert!(driver.output().is_empty());
    }

    #[test]
    fn test_held_output() {
        let mut driver = MergeDriver::new(
            ordered_spec(),
            vec![ShardStream::from_rows(0, vec![pair(1, "a")])],
            &MergeConfig::default(),
        )
        .unwrap()
        .hold_for_transaction();
        assert!(run(&mut driver).into_result().unwrap().held_for_txn);
        assert_eq!(driver.output().state(), OutputState::Held);
    }

    #[test]
    fn test_config_errors() {
        let config = MergeConfig {
            max_shards: 1,
            ..MergeConfig::default()
        };
        let err = MergeDriver::new(
            ordered_spec(),
            vec![ShardStream::new(0), ShardStream::new(1)],
            &config,
        )
        .unwrap_err();
        assert_eq!(err, MergeError::TooManyShards { count: 2, max: 1 });

        let err = MergeDriver::new(ordered_spec(), vec![], &MergeConfig::default()).unwrap_err();
        assert!(err.is_configuration());

        let stream = ShardStream::new(0).with_field_index(vec![0]);
        let err = MergeDriver::new(ordered_spec(), vec![stream], &MergeConfig::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_aggregate_without_group_by() {
        let spec = MergeSpec::new(2)
            .with_aggregate(AggregateSpec::new(AggregateKind::Count, 0))
            .with_aggregate(AggregateSpec::new(AggregateKind::Sum, 1));
        let streams = vec![
            ShardStream::from_rows(0, vec![Row::new(vec![Value::Int(1), Value::Int(10)])]),
            ShardStream::from_rows(1, vec![Row::new(vec![Value::Int(2), Value::Int(5)])]),
        ];
        let mut driver = MergeDriver::new(spec, streams, &MergeConfig::default()).unwrap();
        assert!(run(&mut driver).is_success());
        assert_eq!(
            driver.take_output().drain(),
            vec![Row::new(vec![Value::Int(2), Value::Int(15)])]
        );
    }

    #[test]
    fn test_metrics_recorded() {
        let metrics = Arc::new(MetricsRegistry::new());
        let mut driver = MergeDriver::new(
            ordered_spec(),
            vec![
                ShardStream::from_rows(0, vec![pair(1, "a")]),
                ShardStream::from_rows(1, vec![pair(1, "a")]),
            ],
            &MergeConfig::default(),
        )
        .unwrap()
        .with_metrics(Arc::clone(&metrics));
        assert!(run(&mut driver).is_success());

        let snap = metrics.snapshot();
        assert_eq!(snap.merges_started, 1);
        assert_eq!(snap.merges_completed, 1);
        assert_eq!(snap.rows_emitted, 1);
        assert_eq!(snap.duplicates_suppressed, 1);
    }
}
