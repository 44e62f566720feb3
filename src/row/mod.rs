//! Row and schema model shared by every merge stage
//!
//! Rows are immutable once decoded. Columns are addressed by logical
//! position; per-shard physical layouts are normalised with a
//! `field_index` remapping before rows enter the merge.

mod row;
mod schema;
mod value;

pub use row::Row;
pub use schema::{ColumnSpec, ColumnType, SortDirection};
pub use value::{Numeric, Value};
