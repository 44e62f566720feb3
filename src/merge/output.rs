//! Staged merge output
//!
//! Rows accumulate while the merge runs and become visible only after the
//! merge succeeds. A failed or aborted merge discards everything staged, so
//! a client never sees a partial or unverified resultset.

use std::collections::VecDeque;

use crate::row::Row;

/// Visibility state of the output queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Merge running, rows being appended
    Staging,
    /// Merge finished, waiting on a transaction consistency check
    Held,
    /// Rows may be read by the client
    Released,
    /// Rows dropped; nothing will be delivered
    Discarded,
}

/// Ordered output rows, released all at once
#[derive(Debug)]
pub struct OutputQueue {
    rows: VecDeque<Row>,
    state: OutputState,
}

impl OutputState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputState::Staging => "staging",
            OutputState::Held => "held",
            OutputState::Released => "released",
            OutputState::Discarded => "discarded",
        }
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputQueue {
    pub fn new() -> Self {
        Self {
            rows: VecDeque::new(),
            state: OutputState::Staging,
        }
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    pub fn is_released(&self) -> bool {
        self.state == OutputState::Released
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stages a row. Returns false once staging is over.
    pub fn push(&mut self, row: Row) -> bool {
        if self.state != OutputState::Staging {
            return false;
        }
        self.rows.push_back(row);
        true
    }

    /// Stops staging without releasing
    pub fn hold(&mut self) {
        if self.state == OutputState::Staging {
            self.state = OutputState::Held;
        }
    }

    /// Makes staged rows readable
    pub fn release(&mut self) {
        if matches!(self.state, OutputState::Staging | OutputState::Held) {
            self.state = OutputState::Released;
        }
    }

    /// Drops staged rows. A released queue keeps what the client may already read.
    pub fn discard(&mut self) {
        if self.state != OutputState::Released {
            self.rows.clear();
            self.state = OutputState::Discarded;
        }
    }

    /// Next released row
    pub fn pop(&mut self) -> Option<Row> {
        if !self.is_released() {
            return None;
        }
        self.rows.pop_front()
    }

    /// All remaining released rows, in order
    pub fn drain(&mut self) -> Vec<Row> {
        if !self.is_released() {
            return Vec::new();
        }
        self.rows.drain(..).collect()
    }
}
