//! Decoded result rows

use serde::{Deserialize, Serialize};

use super::value::{Value, NULL_VALUE};

/// An immutable, positionally indexed row.
///
/// Column identity is established by position once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from its field values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true for a zero-width row
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Field at `pos`, if present
    pub fn get(&self, pos: usize) -> Option<&Value> {
        self.values.get(pos)
    }

    /// Field at `pos`, NULL when absent
    pub fn get_or_null(&self, pos: usize) -> &Value {
        self.values.get(pos).unwrap_or(&NULL_VALUE)
    }

    /// All fields in order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row into its fields
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Reorders a shard-local row into the logical column layout.
    ///
    /// `field_index[i]` is the physical position of logical column `i`.
    /// Returns None when the row is too narrow for the mapping.
    pub fn remap(&self, field_index: &[usize]) -> Option<Row> {
        let values = field_index
            .iter()
            .map(|&pos| self.values.get(pos).cloned())
            .collect::<Option<Vec<Value>>>()?;
        Some(Row { values })
    }

    /// Builds a new row with the given positions replaced
    pub fn with_replaced<I>(self, replacements: I) -> Row
    where
        I: IntoIterator<Item = (usize, Value)>,
    {
        let mut values = self.values;
        for (pos, value) in replacements {
            if let Some(slot) = values.get_mut(pos) {
                *slot = value;
            }
        }
        Row { values }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}
