//! K-way heap merge over shard streams
//!
//! An index-based binary min-heap keyed by each shard's current head row.
//! Cursors live in an arena parallel to the shard streams; the heap holds
//! the head rows and the arena slot they came from.
//!
//! # Invariants
//!
//! - A row is emitted only when every live shard has a head row queued, so
//!   the output order depends on row values, never on arrival timing
//! - Equal rows are ordered by shard slot
//! - A shard's next row may not compare below the last emitted row
//! - A row identical to the last emitted row is dropped when duplicate
//!   suppression is on

use std::cmp::Ordering;

use super::comparator::RowComparator;
use super::errors::{MergeError, MergeResult};
use super::stream::{ShardPull, ShardStream};
use crate::config::FailurePolicy;
use crate::observability::{log_event, Event};
use crate::row::Row;

/// Per-shard cursor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Needs its next row pulled
    Pending,
    /// Head row is in the heap
    Queued,
    /// No further rows (finished, cancelled or skipped)
    Exhausted,
}

#[derive(Debug)]
struct HeapEntry {
    slot: usize,
    row: Row,
}

/// Result of one heap pull
#[derive(Debug, Clone, PartialEq)]
pub enum HeapPull {
    /// Next row in global order
    Row { row: Row, shard_id: usize },
    /// Some live shard has no buffered row yet
    NotReady,
    /// Every shard is exhausted
    Exhausted,
}

/// Heap behaviour knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapOptions {
    /// Logical row width every shard row must match
    pub width: usize,
    pub suppress_duplicates: bool,
    pub failure_policy: FailurePolicy,
}

/// Globally ordered merge of shard streams
#[derive(Debug)]
pub struct HeapMerger {
    comparator: RowComparator,
    options: HeapOptions,
    cursors: Vec<Cursor>,
    heap: Vec<HeapEntry>,
    active: usize,
    last_emitted: Option<Row>,
    skipped: Vec<usize>,
    duplicates: u64,
}

impl HeapMerger {
    pub fn new(comparator: RowComparator, shard_count: usize, options: HeapOptions) -> Self {
        Self {
            comparator,
            options,
            cursors: vec![Cursor::Pending; shard_count],
            heap: Vec::with_capacity(shard_count),
            active: shard_count,
            last_emitted: None,
            skipped: Vec::new(),
            duplicates: 0,
        }
    }

    /// Shards not yet exhausted
    pub fn active_streams(&self) -> usize {
        self.active
    }

    /// True when every shard is exhausted
    pub fn is_over(&self) -> bool {
        self.active == 0
    }

    pub fn duplicates_suppressed(&self) -> u64 {
        self.duplicates
    }

    /// Shard ids dropped under the skip policy
    pub fn skipped_shards(&self) -> &[usize] {
        &self.skipped
    }

    /// Pulls the next row in global order.
    ///
    /// `streams` must be the same slice, in the same order, on every call.
    pub fn pull(&mut self, streams: &mut [ShardStream]) -> MergeResult<HeapPull> {
        loop {
            if !self.refresh(streams)? {
                return Ok(HeapPull::NotReady);
            }
            let Some(entry) = self.pop_entry() else {
                return Ok(HeapPull::Exhausted);
            };
            self.cursors[entry.slot] = Cursor::Pending;
            let shard_id = streams[entry.slot].shard_id();

            if self.is_duplicate(&entry.row) {
                self.duplicates += 1;
                log_event(Event::DuplicateSuppressed, &[("shard", &shard_id.to_string())]);
                continue;
            }

            self.last_emitted = Some(entry.row.clone());
            return Ok(HeapPull::Row {
                row: entry.row,
                shard_id,
            });
        }
    }

    /// Cancels every shard that is still live and empties the heap.
    ///
    /// Returns the number of shards cancelled.
    pub fn cancel_remaining(&mut self, streams: &mut [ShardStream]) -> usize {
        let mut cancelled = 0;
        for (cursor, stream) in self.cursors.iter_mut().zip(streams.iter_mut()) {
            if *cursor != Cursor::Exhausted {
                stream.cancel();
                *cursor = Cursor::Exhausted;
                cancelled += 1;
            }
        }
        self.active = 0;
        self.heap.clear();
        self.last_emitted = None;
        cancelled
    }

    /// Pulls a head row for every pending cursor.
    ///
    /// Returns false while some live shard still has nothing buffered.
    fn refresh(&mut self, streams: &mut [ShardStream]) -> MergeResult<bool> {
        let mut waiting = false;
        for (slot, stream) in streams.iter_mut().enumerate() {
            if self.cursors.get(slot) != Some(&Cursor::Pending) {
                continue;
            }
            match stream.pull()? {
                ShardPull::Row(row) => {
                    self.check_row(stream.shard_id(), &row)?;
                    self.cursors[slot] = Cursor::Queued;
                    self.push_entry(HeapEntry { slot, row });
                }
                ShardPull::NotReady => waiting = true,
                ShardPull::Exhausted => {
                    self.retire(slot);
                    log_event(Event::ShardExhausted, &[("shard", &stream.shard_id().to_string())]);
                }
                ShardPull::Failed(reason) => match self.options.failure_policy {
                    FailurePolicy::FailFast => {
                        return Err(MergeError::shard_failed(stream.shard_id(), reason));
                    }
                    FailurePolicy::SkipFailed => {
                        self.retire(slot);
                        self.skipped.push(stream.shard_id());
                        stream.cancel();
                        log_event(
                            Event::ShardSkipped,
                            &[("shard", &stream.shard_id().to_string()), ("reason", &reason)],
                        );
                    }
                },
            }
        }
        Ok(!waiting)
    }

    fn check_row(&self, shard_id: usize, row: &Row) -> MergeResult<()> {
        if row.len() != self.options.width {
            return Err(MergeError::RowWidthMismatch {
                shard: shard_id,
                actual: row.len(),
                expected: self.options.width,
            });
        }
        if let Some(last) = &self.last_emitted {
            if self.comparator.compare(row, last) == Ordering::Less {
                return Err(MergeError::OutOfOrder { shard: shard_id });
            }
        }
        Ok(())
    }

    fn is_duplicate(&self, row: &Row) -> bool {
        if !self.options.suppress_duplicates {
            return false;
        }
        match &self.last_emitted {
            Some(last) => self.comparator.compare(last, row) == Ordering::Equal && last == row,
            None => false,
        }
    }

    fn retire(&mut self, slot: usize) {
        if self.cursors[slot] != Cursor::Exhausted {
            self.cursors[slot] = Cursor::Exhausted;
            self.active -= 1;
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (x, y) = (&self.heap[a], &self.heap[b]);
        match self.comparator.compare(&x.row, &y.row) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => x.slot < y.slot,
        }
    }

    fn push_entry(&mut self, entry: HeapEntry) {
        self.heap.push(entry);
        let mut i = self.heap.len() - 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.heap.swap(i, parent);
            i = parent;
        }
    }

    fn pop_entry(&mut self) -> Option<HeapEntry> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let top = self.heap.pop();

        let len = self.heap.len();
        let mut i = 0;
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.heap.swap(i, smallest);
            i = smallest;
        }
        top
    }
}
