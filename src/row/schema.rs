//! Column metadata for ORDER BY / GROUP BY specifications

use serde::Deserialize;

/// Declared type of a column, as reported in the shard's field metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "int", alias = "bigint")]
    Integer,
    #[serde(alias = "double")]
    Float,
    Decimal,
    #[serde(alias = "varchar", alias = "text")]
    String,
    #[serde(alias = "blob")]
    Binary,
}

impl ColumnType {
    /// Numeric columns compare and aggregate by value, never lexically
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float | ColumnType::Decimal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::String => "string",
            ColumnType::Binary => "binary",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One ORDER BY or GROUP BY column
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnSpec {
    /// Owning table name (may be empty)
    #[serde(default)]
    pub table: String,
    /// Column name
    pub name: String,
    /// Declared column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Sort direction (ignored for grouping)
    #[serde(default)]
    pub direction: SortDirection,
    /// Resolved logical position in the row
    pub pos: usize,
}

impl ColumnSpec {
    /// Ascending column at `pos`
    pub fn asc(name: impl Into<String>, column_type: ColumnType, pos: usize) -> Self {
        Self {
            table: String::new(),
            name: name.into(),
            column_type,
            direction: SortDirection::Asc,
            pos,
        }
    }

    /// Descending column at `pos`
    pub fn desc(name: impl Into<String>, column_type: ColumnType, pos: usize) -> Self {
        Self {
            direction: SortDirection::Desc,
            ..Self::asc(name, column_type, pos)
        }
    }

    /// Sets the owning table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}
