//! Multi-column, type-aware row comparison
//!
//! Ordering rules:
//! - NULL sorts before every non-NULL value (ascending)
//! - Numeric columns compare by value, including numeric strings
//! - String and binary columns compare byte-wise
//! - Descending columns reverse the per-column result

use std::cmp::Ordering;

use crate::row::{ColumnSpec, ColumnType, Row, SortDirection, Value};

/// Compares two field values under a declared column type.
pub fn compare_values(a: &Value, b: &Value, column_type: ColumnType) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ if column_type.is_numeric() => match (a.as_numeric(), b.as_numeric()) {
            (Some(x), Some(y)) => x.cmp_numeric(y),
            // Unreadable values sort after every number so the order stays total
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.as_bytes().cmp(&b.as_bytes()),
        },
        _ => a.as_bytes().cmp(&b.as_bytes()),
    }
}

#[derive(Debug, Clone, Copy)]
struct SortKey {
    pos: usize,
    column_type: ColumnType,
    direction: SortDirection,
}

/// Row comparator over an ordered list of columns
#[derive(Debug, Clone)]
pub struct RowComparator {
    keys: Vec<SortKey>,
}

impl RowComparator {
    pub fn new(columns: &[ColumnSpec]) -> Self {
        let keys = columns
            .iter()
            .map(|c| SortKey {
                pos: c.pos,
                column_type: c.column_type,
                direction: c.direction,
            })
            .collect();
        Self { keys }
    }

    /// True when no columns are configured (every pair compares equal)
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares two rows; the first non-equal column decides.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for key in &self.keys {
            let ordering = compare_values(a.get_or_null(key.pos), b.get_or_null(key.pos), key.column_type);
            if ordering != Ordering::Equal {
                return match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
            }
        }
        Ordering::Equal
    }

    /// Equality on every column, ignoring direction. Used for group boundaries.
    pub fn keys_equal(&self, a: &Row, b: &Row) -> bool {
        self.keys.iter().all(|key| {
            compare_values(a.get_or_null(key.pos), b.get_or_null(key.pos), key.column_type)
                == Ordering::Equal
        })
    }
}
