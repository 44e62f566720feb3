//! LIMIT / OFFSET enforcement

use serde::Deserialize;

/// Count sentinel meaning "no row limit"
pub const MAX_LIMIT: u64 = i32::MAX as u64;

/// Output window: skip `offset` rows, then emit at most `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LimitSpec {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "unbounded_count")]
    pub count: u64,
}

fn unbounded_count() -> u64 {
    MAX_LIMIT
}

impl LimitSpec {
    /// Creates a window; counts above the sentinel are capped to it
    pub fn new(offset: u64, count: u64) -> Self {
        Self {
            offset,
            count: count.min(MAX_LIMIT),
        }
    }

    /// No offset, no limit
    pub fn unbounded() -> Self {
        Self::new(0, MAX_LIMIT)
    }

    pub fn is_unbounded(&self) -> bool {
        self.count >= MAX_LIMIT
    }
}

impl Default for LimitSpec {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Decision for one offered row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    /// Row falls inside the offset
    Skip,
    /// Row is part of the output
    Emit,
    /// Window already full
    Done,
}

/// Applies a [`LimitSpec`] to a row stream
#[derive(Debug, Clone)]
pub struct LimitEnforcer {
    to_skip: u64,
    remaining: Option<u64>,
}

impl LimitEnforcer {
    pub fn new(spec: LimitSpec) -> Self {
        Self {
            to_skip: spec.offset,
            remaining: if spec.is_unbounded() {
                None
            } else {
                Some(spec.count)
            },
        }
    }

    /// Offers the next row of the stream
    pub fn offer(&mut self) -> LimitDecision {
        if self.is_satisfied() {
            return LimitDecision::Done;
        }
        if self.to_skip > 0 {
            self.to_skip -= 1;
            return LimitDecision::Skip;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        LimitDecision::Emit
    }

    /// True once no further row can be emitted
    pub fn is_satisfied(&self) -> bool {
        self.remaining == Some(0)
    }
}
