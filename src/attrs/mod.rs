//! Columnar attribute table and predicate evaluation
//!
//! Columns are typed scalars aligned row-for-row with a global id column
//! that spans every partition. A predicate `(column, operator, literal)`
//! evaluates to a row-aligned boolean mask; the coordinator consumes the
//! mask either before distance computation (pre-filtering) or after the
//! scan (post-filtering).

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::VectorId;
use crate::{Error, Result};

/// Scalar literal carried by a filter predicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

/// Comparison operator recognized by the predicate evaluator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl FromStr for PredicateOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equal" => Ok(PredicateOp::Equal),
            "not_equal" => Ok(PredicateOp::NotEqual),
            "less" => Ok(PredicateOp::Less),
            "less_equal" => Ok(PredicateOp::LessEqual),
            "greater" => Ok(PredicateOp::Greater),
            "greater_equal" => Ok(PredicateOp::GreaterEqual),
            other => Err(Error::invalid_input(format!(
                "unknown predicate operator: {other}"
            ))),
        }
    }
}

impl PredicateOp {
    fn ordered(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            PredicateOp::Equal => ord == Equal,
            PredicateOp::NotEqual => ord != Equal,
            PredicateOp::Less => ord == Less,
            PredicateOp::LessEqual => ord != Greater,
            PredicateOp::Greater => ord == Greater,
            PredicateOp::GreaterEqual => ord != Less,
        }
    }

    fn is_ordering(self) -> bool {
        !matches!(self, PredicateOp::Equal | PredicateOp::NotEqual)
    }
}

/// A single typed column.
#[derive(Debug, Clone)]
pub enum Column {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<String>),
    Boolean(Vec<bool>),
}

impl Column {
    fn len(&self) -> usize {
        match self {
            Column::Integer(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::String(v) => v.len(),
            Column::Boolean(v) => v.len(),
        }
    }
}

/// Columnar store of scalar attributes aligned with vector ids.
///
/// Read-only during search; shared via `Arc` with the coordinator.
#[derive(Debug, Clone, Default)]
pub struct AttributeTable {
    ids: Vec<VectorId>,
    columns: HashMap<String, Column>,
}

impl AttributeTable {
    /// Create a table over the given id column.
    pub fn new(ids: Vec<VectorId>) -> Self {
        Self {
            ids,
            columns: HashMap::new(),
        }
    }

    /// Attach a column. Its length must match the id column.
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        if column.len() != self.ids.len() {
            return Err(Error::invalid_input(format!(
                "column length {} did not match id column length {}",
                column.len(),
                self.ids.len()
            )));
        }
        self.columns.insert(name.into(), column);
        Ok(())
    }

    /// Number of rows in the table.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Evaluate `column <op> literal` into a mask aligned with the id column.
    pub fn evaluate(
        &self,
        column: &str,
        op: PredicateOp,
        literal: &AttributeValue,
    ) -> Result<Vec<bool>> {
        let col = self.columns.get(column).ok_or_else(|| {
            Error::backend(format!("attribute table has no column named {column}"))
        })?;

        match (col, literal) {
            (Column::Integer(values), AttributeValue::Integer(needle)) => {
                let needle = *needle as f64;
                Ok(values
                    .iter()
                    .map(|v| op.ordered((*v as f64).total_cmp(&needle)))
                    .collect())
            }
            (Column::Integer(values), AttributeValue::Float(needle)) => Ok(values
                .iter()
                .map(|v| op.ordered((*v as f64).total_cmp(needle)))
                .collect()),
            (Column::Float(values), AttributeValue::Float(needle)) => Ok(values
                .iter()
                .map(|v| op.ordered(v.total_cmp(needle)))
                .collect()),
            (Column::Float(values), AttributeValue::Integer(needle)) => {
                let needle = *needle as f64;
                Ok(values
                    .iter()
                    .map(|v| op.ordered(v.total_cmp(&needle)))
                    .collect())
            }
            (Column::String(values), AttributeValue::String(needle)) => {
                if op.is_ordering() {
                    return Err(Error::invalid_input(format!(
                        "operator {op:?} is not defined for string column {column}"
                    )));
                }
                Ok(values
                    .iter()
                    .map(|v| op.ordered(v.as_str().cmp(needle.as_str())))
                    .collect())
            }
            (Column::Boolean(values), AttributeValue::Boolean(needle)) => {
                if op.is_ordering() {
                    return Err(Error::invalid_input(format!(
                        "operator {op:?} is not defined for boolean column {column}"
                    )));
                }
                Ok(values.iter().map(|v| op.ordered(v.cmp(needle))).collect())
            }
            (col, literal) => Err(Error::invalid_input(format!(
                "filter literal {literal:?} cannot be compared against column {column} of type {}",
                match col {
                    Column::Integer(_) => "integer",
                    Column::Float(_) => "float",
                    Column::String(_) => "string",
                    Column::Boolean(_) => "boolean",
                }
            ))),
        }
    }

    /// Ids whose row satisfies the predicate, for scan-time lookups.
    pub fn passing_ids(
        &self,
        column: &str,
        op: PredicateOp,
        literal: &AttributeValue,
    ) -> Result<HashSet<VectorId>> {
        let mask = self.evaluate(column, op, literal)?;
        Ok(self
            .ids
            .iter()
            .zip(mask)
            .filter_map(|(id, keep)| keep.then_some(*id))
            .collect())
    }
}
