//! Merge specification and its validation
//!
//! A `MergeSpec` is derived from the client query once per fan-out. It is
//! validated before any shard row is pulled; a rejected spec produces no
//! output at all.

use std::collections::HashSet;

use serde::Deserialize;

use super::aggregate::AggregateSpec;
use super::errors::{MergeError, MergeResult};
use super::having::HavingExpr;
use super::limit::LimitSpec;
use crate::row::ColumnSpec;

pub use super::limit::MAX_LIMIT;

/// Longest table or column name, in bytes
pub const MAX_NAME_LEN: usize = 64;

/// Most ORDER BY columns per query
pub const MAX_ORDER_COLS: usize = 16;

/// Most GROUP BY columns per query
pub const MAX_GROUP_COLS: usize = 16;

/// Most shard streams in one merge
pub const MAX_SHARD_NUM: usize = 64;

/// Query-derived merge configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MergeSpec {
    /// Logical column count of every merged row
    pub width: usize,
    #[serde(default)]
    pub order_by: Vec<ColumnSpec>,
    #[serde(default)]
    pub group_by: Vec<ColumnSpec>,
    #[serde(default)]
    pub aggregates: Vec<AggregateSpec>,
    #[serde(default)]
    pub having: Option<HavingExpr>,
    #[serde(default)]
    pub limit: LimitSpec,
}

impl MergeSpec {
    /// Plain merge of rows with `width` columns: no order, no grouping, no limit
    pub fn new(width: usize) -> Self {
        Self {
            width,
            order_by: Vec::new(),
            group_by: Vec::new(),
            aggregates: Vec::new(),
            having: None,
            limit: LimitSpec::unbounded(),
        }
    }

    pub fn with_order_by(mut self, column: ColumnSpec) -> Self {
        self.order_by.push(column);
        self
    }

    pub fn with_group_by(mut self, column: ColumnSpec) -> Self {
        self.group_by.push(column);
        self
    }

    pub fn with_aggregate(mut self, aggregate: AggregateSpec) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    pub fn with_having(mut self, having: HavingExpr) -> Self {
        self.having = Some(having);
        self
    }

    pub fn with_limit(mut self, offset: u64, count: u64) -> Self {
        self.limit = LimitSpec::new(offset, count);
        self
    }

    /// True when rows pass through the group aggregator
    pub fn has_aggregation(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregates.is_empty()
    }

    /// Checks every bound and position, returning the normalised spec.
    ///
    /// With GROUP BY and no ORDER BY, the sort order is derived from the
    /// group columns. Otherwise the group columns must be exactly the
    /// leading ORDER BY columns, in any order, so that groups arrive
    /// contiguously.
    pub fn validate(mut self) -> MergeResult<MergeSpec> {
        if self.width == 0 {
            return Err(MergeError::invalid_spec("row width must be at least 1"));
        }
        if self.order_by.len() > MAX_ORDER_COLS {
            return Err(MergeError::TooManyColumns {
                kind: "ORDER BY",
                count: self.order_by.len(),
                max: MAX_ORDER_COLS,
            });
        }
        if self.group_by.len() > MAX_GROUP_COLS {
            return Err(MergeError::TooManyColumns {
                kind: "GROUP BY",
                count: self.group_by.len(),
                max: MAX_GROUP_COLS,
            });
        }

        for column in &self.order_by {
            check_column(column, "ORDER BY", self.width)?;
        }
        let mut group_positions = HashSet::new();
        for column in &self.group_by {
            check_column(column, "GROUP BY", self.width)?;
            if !group_positions.insert(column.pos) {
                return Err(MergeError::invalid_spec(format!(
                    "GROUP BY lists position {} twice",
                    column.pos
                )));
            }
        }

        let mut aggregate_positions = HashSet::new();
        for aggregate in &self.aggregates {
            check_position("aggregate", aggregate.pos, self.width)?;
            if group_positions.contains(&aggregate.pos) {
                return Err(MergeError::invalid_spec(format!(
                    "{} at position {} overwrites a GROUP BY column",
                    aggregate.kind.as_str(),
                    aggregate.pos
                )));
            }
            if !aggregate_positions.insert(aggregate.pos) {
                return Err(MergeError::invalid_spec(format!(
                    "two aggregates target position {}",
                    aggregate.pos
                )));
            }
        }

        if let Some(pos) = self.having.as_ref().and_then(HavingExpr::max_position) {
            check_position("HAVING", pos, self.width)?;
        }

        if !self.group_by.is_empty() {
            if self.order_by.is_empty() {
                self.order_by = self
                    .group_by
                    .iter()
                    .map(|c| ColumnSpec {
                        direction: Default::default(),
                        ..c.clone()
                    })
                    .collect();
            } else {
                let leading: HashSet<usize> = self
                    .order_by
                    .iter()
                    .take(self.group_by.len())
                    .map(|c| c.pos)
                    .collect();
                if self.order_by.len() < self.group_by.len() || leading != group_positions {
                    return Err(MergeError::invalid_spec(
                        "GROUP BY columns must be the leading ORDER BY columns",
                    ));
                }
                // Sort ties must be group ties, or one key can arrive in pieces
                for group in &self.group_by {
                    let sorts_numeric = self
                        .order_by
                        .iter()
                        .find(|o| o.pos == group.pos)
                        .map(|o| o.column_type.is_numeric());
                    if sorts_numeric != Some(group.column_type.is_numeric()) {
                        return Err(MergeError::invalid_spec(format!(
                            "GROUP BY column at position {} is {} but is ordered with a different comparison",
                            group.pos,
                            group.column_type.as_str()
                        )));
                    }
                }
            }
        }

        self.limit = LimitSpec::new(self.limit.offset, self.limit.count);
        Ok(self)
    }
}

fn check_column(column: &ColumnSpec, context: &'static str, width: usize) -> MergeResult<()> {
    if column.name.len() > MAX_NAME_LEN || column.table.len() > MAX_NAME_LEN {
        return Err(MergeError::invalid_spec(format!(
            "{} column name longer than {} bytes",
            context, MAX_NAME_LEN
        )));
    }
    check_position(context, column.pos, width)
}

fn check_position(context: &'static str, pos: usize, width: usize) -> MergeResult<()> {
    if pos >= width {
        return Err(MergeError::PositionOutOfRange {
            context,
            pos,
            width,
        });
    }
    Ok(())
}
