//! HAVING predicate evaluation
//!
//! Predicates follow SQL three-valued logic: a comparison involving NULL is
//! unknown, and a row passes only when the whole tree evaluates to true.

use std::cmp::Ordering;

use serde::Deserialize;

use super::comparator::compare_values;
use crate::row::{ColumnType, Row, Value};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=", alias = "eq")]
    Eq,
    #[serde(rename = "<>", alias = "!=", alias = "ne")]
    Ne,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "lte")]
    Le,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "gte")]
    Ge,
}

impl CompareOp {
    /// Whether an ordering satisfies this operator
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// HAVING predicate tree over output column positions
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HavingExpr {
    /// `row[pos] <op> value`
    Compare {
        pos: usize,
        op: CompareOp,
        value: Value,
        /// Comparison type; inferred from the literal when absent
        #[serde(default, rename = "type")]
        column_type: Option<ColumnType>,
    },
    And(Vec<HavingExpr>),
    Or(Vec<HavingExpr>),
    Not(Box<HavingExpr>),
}

impl HavingExpr {
    pub fn compare(pos: usize, op: CompareOp, value: impl Into<Value>) -> Self {
        HavingExpr::Compare {
            pos,
            op,
            value: value.into(),
            column_type: None,
        }
    }

    pub fn gt(pos: usize, value: impl Into<Value>) -> Self {
        Self::compare(pos, CompareOp::Gt, value)
    }

    pub fn lt(pos: usize, value: impl Into<Value>) -> Self {
        Self::compare(pos, CompareOp::Lt, value)
    }

    pub fn eq(pos: usize, value: impl Into<Value>) -> Self {
        Self::compare(pos, CompareOp::Eq, value)
    }

    pub fn and(exprs: Vec<HavingExpr>) -> Self {
        HavingExpr::And(exprs)
    }

    pub fn or(exprs: Vec<HavingExpr>) -> Self {
        HavingExpr::Or(exprs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: HavingExpr) -> Self {
        HavingExpr::Not(Box::new(expr))
    }

    /// True when the row passes the predicate
    pub fn matches(&self, row: &Row) -> bool {
        self.eval(row) == Some(true)
    }

    /// Three-valued evaluation; `None` is SQL unknown.
    pub fn eval(&self, row: &Row) -> Option<bool> {
        match self {
            HavingExpr::Compare {
                pos,
                op,
                value,
                column_type,
            } => {
                let actual = row.get_or_null(*pos);
                if actual.is_null() || value.is_null() {
                    return None;
                }
                let ty = column_type.unwrap_or_else(|| infer_type(value));
                Some(op.holds(compare_values(actual, value, ty)))
            }
            HavingExpr::And(exprs) => {
                let mut result = Some(true);
                for expr in exprs {
                    match expr.eval(row) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            HavingExpr::Or(exprs) => {
                let mut result = Some(false);
                for expr in exprs {
                    match expr.eval(row) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            HavingExpr::Not(expr) => expr.eval(row).map(|b| !b),
        }
    }

    /// Highest column position referenced by the tree
    pub fn max_position(&self) -> Option<usize> {
        match self {
            HavingExpr::Compare { pos, .. } => Some(*pos),
            HavingExpr::And(exprs) | HavingExpr::Or(exprs) => {
                exprs.iter().filter_map(HavingExpr::max_position).max()
            }
            HavingExpr::Not(expr) => expr.max_position(),
        }
    }
}

fn infer_type(literal: &Value) -> ColumnType {
    match literal {
        Value::Int(_) => ColumnType::Integer,
        Value::Float(_) => ColumnType::Float,
        Value::Binary(_) => ColumnType::Binary,
        Value::Null | Value::Str(_) => ColumnType::String,
    }
}
