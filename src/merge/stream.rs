//! Per-shard buffered row streams
//!
//! The shard-handling I/O layer feeds a stream with decoded rows and finally
//! marks it finished or failed. The merge side pulls rows without blocking:
//! an empty buffer on an open stream yields `NotReady`.

use std::collections::VecDeque;

use super::errors::{MergeError, MergeResult};
use crate::row::Row;

/// Lifecycle of one shard stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardState {
    /// More rows may arrive
    Open,
    /// Shard sent its last row
    Finished,
    /// Shard reported an error
    Failed(String),
    /// Merge no longer wants rows from this shard
    Cancelled,
}

/// Result of pulling from a shard stream
#[derive(Debug, Clone, PartialEq)]
pub enum ShardPull {
    /// Next row, already in logical column layout
    Row(Row),
    /// Buffer empty, shard still open
    NotReady,
    /// No more rows will come
    Exhausted,
    /// Shard reported an error
    Failed(String),
}

/// Buffered rows received from one shard
#[derive(Debug)]
pub struct ShardStream {
    shard_id: usize,
    buffer: VecDeque<Row>,
    state: ShardState,
    field_index: Option<Vec<usize>>,
    received: u64,
}

impl ShardStream {
    /// Creates an open, empty stream
    pub fn new(shard_id: usize) -> Self {
        Self {
            shard_id,
            buffer: VecDeque::new(),
            state: ShardState::Open,
            field_index: None,
            received: 0,
        }
    }

    /// Creates a stream that already holds its complete resultset
    pub fn from_rows(shard_id: usize, rows: Vec<Row>) -> Self {
        let mut stream = Self::new(shard_id);
        stream.push_rows(rows);
        stream.finish();
        stream
    }

    /// Sets the logical-to-physical column mapping for this shard
    pub fn with_field_index(mut self, field_index: Vec<usize>) -> Self {
        self.field_index = Some(field_index);
        self
    }

    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    pub fn state(&self) -> &ShardState {
        &self.state
    }

    pub fn field_index(&self) -> Option<&[usize]> {
        self.field_index.as_deref()
    }

    /// Rows waiting to be pulled
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Rows accepted since creation
    pub fn received(&self) -> u64 {
        self.received
    }

    /// True once the merge has asked this shard to stop producing
    pub fn is_cancelled(&self) -> bool {
        self.state == ShardState::Cancelled
    }

    /// Appends a decoded row. Returns false when the stream no longer accepts rows.
    pub fn push_row(&mut self, row: Row) -> bool {
        if self.state != ShardState::Open {
            return false;
        }
        self.buffer.push_back(row);
        self.received += 1;
        true
    }

    /// Appends several rows; stops at the first rejection
    pub fn push_rows<I: IntoIterator<Item = Row>>(&mut self, rows: I) -> bool {
        rows.into_iter().all(|row| self.push_row(row))
    }

    /// Marks end of stream
    pub fn finish(&mut self) {
        if self.state == ShardState::Open {
            self.state = ShardState::Finished;
        }
    }

    /// Records a shard-side error
    pub fn fail(&mut self, reason: impl Into<String>) {
        if matches!(self.state, ShardState::Open | ShardState::Finished) {
            self.state = ShardState::Failed(reason.into());
        }
    }

    /// Stops the stream and releases its buffer
    pub fn cancel(&mut self) {
        self.buffer.clear();
        self.buffer.shrink_to_fit();
        if !matches!(self.state, ShardState::Failed(_)) {
            self.state = ShardState::Cancelled;
        }
    }

    /// Pulls the next row without blocking.
    ///
    /// A failed shard reports its failure even with rows still buffered:
    /// its contribution is incomplete and cannot be merged.
    pub fn pull(&mut self) -> MergeResult<ShardPull> {
        match &self.state {
            ShardState::Failed(reason) => return Ok(ShardPull::Failed(reason.clone())),
            ShardState::Cancelled => return Ok(ShardPull::Exhausted),
            ShardState::Open | ShardState::Finished => {}
        }

        let Some(row) = self.buffer.pop_front() else {
            return Ok(match self.state {
                ShardState::Open => ShardPull::NotReady,
                _ => ShardPull::Exhausted,
            });
        };

        match &self.field_index {
            None => Ok(ShardPull::Row(row)),
            Some(field_index) => {
                let width = row.len();
                row.remap(field_index).map(ShardPull::Row).ok_or_else(|| {
                    MergeError::data_integrity(format!(
                        "shard {} row of width {} does not fit its field index {:?}",
                        self.shard_id, width, field_index
                    ))
                })
            }
        }
    }
}
