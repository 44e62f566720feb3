//! Distributed transaction consistency check
//!
//! When a merged query ran inside a cross-shard transaction, the merged rows
//! are only trustworthy if every participating shard reached the same
//! outcome. The check runs once, after the shard streams have completed,
//! against the output the driver held back.
//!
//! # Verdicts
//!
//! - Consistent: every participant confirmed the same outcome in time
//! - Inconsistent: at least one participant committed while another rolled back
//! - Indeterminate: no disagreement, but some participant is unconfirmed
//!
//! Disagreement outranks missing information: one commit and one rollback
//! make the verdict Inconsistent even if a third shard never answered.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{MergeError, MergeResult};
use super::output::{OutputQueue, OutputState};
use crate::observability::{log_event_at, Event, Severity};

/// Completion signal reported by one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnSignal {
    Committed,
    RolledBack,
    /// Shard answered but could not state its outcome
    Unknown,
    /// Coordinator gave up waiting for the shard
    TimedOut,
}

/// A signal and when the coordinator received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTxnOutcome {
    pub shard_id: usize,
    pub signal: TxnSignal,
    pub reported_at: DateTime<Utc>,
}

impl ShardTxnOutcome {
    /// Outcome received now
    pub fn new(shard_id: usize, signal: TxnSignal) -> Self {
        Self {
            shard_id,
            signal,
            reported_at: Utc::now(),
        }
    }

    pub fn at(shard_id: usize, signal: TxnSignal, reported_at: DateTime<Utc>) -> Self {
        Self {
            shard_id,
            signal,
            reported_at,
        }
    }
}

/// The originating query's transaction context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnContext {
    pub xid: String,
    pub participants: Vec<usize>,
    pub started_at: DateTime<Utc>,
    pub timeout: Duration,
}

impl TxnContext {
    /// Context for a transaction starting now
    pub fn new(xid: impl Into<String>, participants: Vec<usize>, timeout: Duration) -> Self {
        Self {
            xid: xid.into(),
            participants,
            started_at: Utc::now(),
            timeout,
        }
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Signals received after this instant are not trusted
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + self.timeout
    }
}

/// Outcome all participants agreed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreedOutcome {
    Commit,
    Rollback,
}

/// Tri-state consistency verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnVerdict {
    Consistent(AgreedOutcome),
    Inconsistent {
        committed: Vec<usize>,
        rolled_back: Vec<usize>,
    },
    Indeterminate {
        unresolved: Vec<usize>,
    },
}

impl TxnVerdict {
    pub fn is_consistent(&self) -> bool {
        matches!(self, TxnVerdict::Consistent(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxnVerdict::Consistent(_) => "consistent",
            TxnVerdict::Inconsistent { .. } => "inconsistent",
            TxnVerdict::Indeterminate { .. } => "indeterminate",
        }
    }

    /// Maps non-consistent verdicts to transaction errors
    pub fn into_result(self, xid: &str) -> MergeResult<AgreedOutcome> {
        match self {
            TxnVerdict::Consistent(outcome) => Ok(outcome),
            TxnVerdict::Inconsistent {
                committed,
                rolled_back,
            } => Err(MergeError::TxnInconsistent {
                xid: xid.to_string(),
                committed,
                rolled_back,
            }),
            TxnVerdict::Indeterminate { unresolved } => Err(MergeError::TxnIndeterminate {
                xid: xid.to_string(),
                unresolved,
            }),
        }
    }
}

/// Computes the verdict without touching any output.
///
/// Outcomes from shards outside the participant set are ignored. A shard
/// that reported both commit and rollback is listed on both sides.
pub fn evaluate(ctx: &TxnContext, outcomes: &[ShardTxnOutcome]) -> TxnVerdict {
    if ctx.participants.is_empty() {
        return TxnVerdict::Indeterminate {
            unresolved: Vec::new(),
        };
    }

    let deadline = ctx.deadline();
    let mut participants = ctx.participants.clone();
    participants.sort_unstable();
    participants.dedup();

    let mut committed = Vec::new();
    let mut rolled_back = Vec::new();
    let mut unresolved = Vec::new();

    for shard in participants {
        let mut saw_commit = false;
        let mut saw_rollback = false;
        for outcome in outcomes.iter().filter(|o| o.shard_id == shard) {
            if outcome.reported_at > deadline {
                continue;
            }
            match outcome.signal {
                TxnSignal::Committed => saw_commit = true,
                TxnSignal::RolledBack => saw_rollback = true,
                TxnSignal::Unknown | TxnSignal::TimedOut => {}
            }
        }
        if saw_commit {
            committed.push(shard);
        }
        if saw_rollback {
            rolled_back.push(shard);
        }
        if !saw_commit && !saw_rollback {
            unresolved.push(shard);
        }
    }

    if !committed.is_empty() && !rolled_back.is_empty() {
        TxnVerdict::Inconsistent {
            committed,
            rolled_back,
        }
    } else if !unresolved.is_empty() {
        TxnVerdict::Indeterminate { unresolved }
    } else if rolled_back.is_empty() {
        TxnVerdict::Consistent(AgreedOutcome::Commit)
    } else {
        TxnVerdict::Consistent(AgreedOutcome::Rollback)
    }
}

/// Checks shard agreement and settles the held output.
///
/// A consistent verdict releases the queue; any other verdict discards it.
/// The queue must be `Held`: output that was already released (or dropped)
/// cannot be vouched for, so the check refuses it and leaves it untouched.
pub fn check_dist_txn_resultset(
    output: &mut OutputQueue,
    ctx: &TxnContext,
    outcomes: &[ShardTxnOutcome],
) -> MergeResult<TxnVerdict> {
    if output.state() != OutputState::Held {
        log_event_at(
            Severity::Error,
            Event::TxnVerdict,
            &[("xid", &ctx.xid), ("verdict", "not_held"), ("state", output.state().as_str())],
        );
        return Err(MergeError::TxnOutputNotHeld {
            xid: ctx.xid.clone(),
            state: output.state().as_str(),
        });
    }

    let verdict = evaluate(ctx, outcomes);
    let rows = output.len().to_string();

    if verdict.is_consistent() {
        output.release();
        log_event_at(
            Severity::Info,
            Event::TxnVerdict,
            &[("xid", &ctx.xid), ("verdict", verdict.as_str()), ("rows", &rows)],
        );
    } else {
        output.discard();
        log_event_at(
            Severity::Error,
            Event::TxnVerdict,
            &[("xid", &ctx.xid), ("verdict", verdict.as_str()), ("rows", &rows)],
        );
    }
    Ok(verdict)
}
