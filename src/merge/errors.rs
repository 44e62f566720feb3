//! Merge error types
//!
//! Error codes:
//! - MERGE_CONFIG_INVALID (configuration, before any row is pulled)
//! - MERGE_SHARD_FAILED (a shard reported an error)
//! - MERGE_DATA_INTEGRITY (out-of-order or malformed shard rows)
//! - MERGE_TXN_INCONSISTENT / MERGE_TXN_INDETERMINATE (distributed transaction check)
//! - MERGE_TXN_NOT_HELD (transaction check on output that was not held)
//! - MERGE_ABORTED (client gone or query timed out)

use std::fmt;

use thiserror::Error;

/// Error taxonomy used to pick the terminal status of a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed merge specification
    Configuration,
    /// A shard stream failed
    Shard,
    /// Shard data violates merge invariants
    DataIntegrity,
    /// Shards disagree on, or never confirmed, a transaction outcome
    Transaction,
    /// Merge cancelled by the caller
    Aborted,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Shard => "shard",
            ErrorCategory::DataIntegrity => "data_integrity",
            ErrorCategory::Transaction => "transaction",
            ErrorCategory::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Merge engine errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    // ==================
    // Configuration Errors
    // ==================
    /// Structurally invalid spec
    #[error("invalid merge spec: {0}")]
    InvalidSpec(String),

    /// Aggregate name the engine cannot fold
    #[error("unsupported aggregate function '{0}'")]
    UnsupportedAggregate(String),

    /// More ORDER BY / GROUP BY columns than allowed
    #[error("too many {kind} columns: {count} (max {max})")]
    TooManyColumns {
        kind: &'static str,
        count: usize,
        max: usize,
    },

    /// A column position outside the row width
    #[error("{context} position {pos} out of range for row width {width}")]
    PositionOutOfRange {
        context: &'static str,
        pos: usize,
        width: usize,
    },

    /// More shard streams than allowed
    #[error("too many shard streams: {count} (max {max})")]
    TooManyShards { count: usize, max: usize },

    // ==================
    // Shard Errors
    // ==================
    /// A shard reported an error
    #[error("shard {shard} failed: {reason}")]
    ShardFailed { shard: usize, reason: String },

    // ==================
    // Data Integrity Errors
    // ==================
    /// A shard delivered a row ordered before one already emitted
    #[error("shard {shard} delivered a row out of order")]
    OutOfOrder { shard: usize },

    /// Shard row does not fit the logical schema
    #[error("shard {shard} delivered a row of width {actual}, expected {expected}")]
    RowWidthMismatch {
        shard: usize,
        actual: usize,
        expected: usize,
    },

    /// Other malformed data
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    // ==================
    // Transaction Errors
    // ==================
    /// Shards disagree on commit/rollback
    #[error("transaction {xid}: shards {committed:?} committed but {rolled_back:?} rolled back")]
    TxnInconsistent {
        xid: String,
        committed: Vec<usize>,
        rolled_back: Vec<usize>,
    },

    /// Some shard outcome is unknown
    #[error("transaction {xid}: outcome unknown for shards {unresolved:?}")]
    TxnIndeterminate { xid: String, unresolved: Vec<usize> },

    /// The output was already settled before the transaction check ran
    #[error("transaction {xid}: output is {state}, not held for the consistency check")]
    TxnOutputNotHeld { xid: String, state: &'static str },

    // ==================
    // Cancellation
    // ==================
    #[error("merge aborted: {0}")]
    Aborted(String),
}

impl MergeError {
    /// Create an invalid spec error
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        MergeError::InvalidSpec(reason.into())
    }

    /// Create a shard failure error
    pub fn shard_failed(shard: usize, reason: impl Into<String>) -> Self {
        MergeError::ShardFailed {
            shard,
            reason: reason.into(),
        }
    }

    /// Create a generic data integrity error
    pub fn data_integrity(reason: impl Into<String>) -> Self {
        MergeError::DataIntegrity(reason.into())
    }

    /// Returns the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MergeError::InvalidSpec(_)
            | MergeError::UnsupportedAggregate(_)
            | MergeError::TooManyColumns { .. }
            | MergeError::PositionOutOfRange { .. }
            | MergeError::TooManyShards { .. } => ErrorCategory::Configuration,
            MergeError::ShardFailed { .. } => ErrorCategory::Shard,
            MergeError::OutOfOrder { .. }
            | MergeError::RowWidthMismatch { .. }
            | MergeError::DataIntegrity(_) => ErrorCategory::DataIntegrity,
            MergeError::TxnInconsistent { .. }
            | MergeError::TxnIndeterminate { .. }
            | MergeError::TxnOutputNotHeld { .. } => ErrorCategory::Transaction,
            MergeError::Aborted(_) => ErrorCategory::Aborted,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            MergeError::TxnInconsistent { .. } => "MERGE_TXN_INCONSISTENT",
            MergeError::TxnIndeterminate { .. } => "MERGE_TXN_INDETERMINATE",
            MergeError::TxnOutputNotHeld { .. } => "MERGE_TXN_NOT_HELD",
            _ => match self.category() {
                ErrorCategory::Configuration => "MERGE_CONFIG_INVALID",
                ErrorCategory::Shard => "MERGE_SHARD_FAILED",
                ErrorCategory::DataIntegrity => "MERGE_DATA_INTEGRITY",
                ErrorCategory::Transaction => "MERGE_TXN_INDETERMINATE",
                ErrorCategory::Aborted => "MERGE_ABORTED",
            },
        }
    }

    /// Configuration errors are raised before any output exists
    pub fn is_configuration(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;
