//! Cross-shard resultset merging
//!
//! Per-shard result streams are combined into one client-facing stream:
//!
//! 1. Rows are ordered across shards by a k-way heap merge
//! 2. GROUP BY groups are folded with a single open accumulator
//! 3. HAVING filters aggregated (or plain) rows
//! 4. LIMIT/OFFSET bounds the output and stops the merge early
//! 5. Output is staged and released only on success
//!
//! For transactional queries the staged output can be held until
//! [`check_dist_txn_resultset`] confirms every shard reached the same outcome.
//!
//! # Invariants
//!
//! - Output order depends only on row values and shard slots
//! - A failed or aborted merge delivers zero rows
//! - Out-of-order shard data is an error, never silently reordered

mod aggregate;
mod comparator;
mod driver;
mod errors;
mod having;
mod heap;
mod limit;
mod output;
mod spec;
mod stream;
mod txn_check;

pub use aggregate::{AggregateKind, AggregateSpec, GroupAggregator};
pub use comparator::{compare_values, RowComparator};
pub use driver::{MergeDriver, MergePoll, MergeStatus, MergeSummary};
pub use errors::{ErrorCategory, MergeError, MergeResult};
pub use having::{CompareOp, HavingExpr};
pub use heap::{HeapMerger, HeapOptions, HeapPull};
pub use limit::{LimitDecision, LimitEnforcer, LimitSpec};
pub use output::{OutputQueue, OutputState};
pub use spec::{MergeSpec, MAX_GROUP_COLS, MAX_LIMIT, MAX_NAME_LEN, MAX_ORDER_COLS, MAX_SHARD_NUM};
pub use stream::{ShardPull, ShardState, ShardStream};
pub use txn_check::{
    check_dist_txn_resultset, evaluate as evaluate_txn, AgreedOutcome, ShardTxnOutcome,
    TxnContext, TxnSignal, TxnVerdict,
};
