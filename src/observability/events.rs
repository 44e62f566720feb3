//! Observable merge lifecycle events

use std::fmt;

use super::logger::Severity;

/// Observable events emitted by the merge engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Merge configuration loaded
    ConfigLoaded,

    // Merge lifecycle
    /// Driver created, spec validated
    MergeStart,
    /// Output staged and released (or held for a transaction check)
    MergeComplete,
    /// Merge ended with an error; output discarded
    MergeFailed,
    /// Merge cancelled by the caller
    MergeAborted,

    // Shard streams
    /// A shard stream has no more rows
    ShardExhausted,
    /// A shard reported an error
    ShardFailed,
    /// A failed shard was dropped under the skip policy
    ShardSkipped,
    /// Remaining shards cancelled after early termination
    ShardsCancelled,

    // Row pipeline
    /// A duplicate boundary row was dropped
    DuplicateSuppressed,
    /// LIMIT window filled before the shards were drained
    LimitReached,

    // Distributed transactions
    /// Consistency verdict computed
    TxnVerdict,
}

impl Event {
    /// Returns the event name as used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::MergeStart => "MERGE_START",
            Event::MergeComplete => "MERGE_COMPLETE",
            Event::MergeFailed => "MERGE_FAILED",
            Event::MergeAborted => "MERGE_ABORTED",
            Event::ShardExhausted => "SHARD_EXHAUSTED",
            Event::ShardFailed => "SHARD_FAILED",
            Event::ShardSkipped => "SHARD_SKIPPED",
            Event::ShardsCancelled => "SHARDS_CANCELLED",
            Event::DuplicateSuppressed => "DUPLICATE_SUPPRESSED",
            Event::LimitReached => "LIMIT_REACHED",
            Event::TxnVerdict => "TXN_VERDICT",
        }
    }

    /// Default severity for this event
    pub fn severity(&self) -> Severity {
        match self {
            Event::ShardExhausted | Event::DuplicateSuppressed => Severity::Trace,
            Event::ShardSkipped | Event::MergeAborted => Severity::Warn,
            Event::MergeFailed | Event::ShardFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
