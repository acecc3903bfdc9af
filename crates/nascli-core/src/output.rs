//! Statement results handed to the renderer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::remote::{ChildEntry, NodePath};
use crate::value::Value;

/// One row of a [`ResultSet`], keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// An ordered table with a fixed column order.
///
/// Rows store values by column name; `columns` decides display order and is
/// the only ordering renderers should rely on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_columns(columns: &[&str]) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect())
    }

    /// Append a row given in column order. Missing trailing cells are none.
    pub fn push_row(&mut self, values: Vec<Value>) {
        let mut values = values.into_iter();
        let row = self
            .columns
            .iter()
            .map(|c| (c.clone(), values.next().unwrap_or(Value::Null)))
            .collect();
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Cells of `row` in column order.
    pub fn cells<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = &'a Value> + 'a {
        self.columns
            .iter()
            .map(move |c| row.get(c).unwrap_or(&Value::Null))
    }

    /// Rows as dict values, for binding into the environment.
    pub fn to_value(&self) -> Value {
        Value::List(self.rows.iter().cloned().map(Value::Dict).collect())
    }
}

/// Result of one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Output {
    #[default]
    None,
    Value(Value),
    /// Reference to a (possibly newly created) namespace node.
    Item(NodePath),
    Table(ResultSet),
    /// Children of the namespace just entered.
    Listing(Vec<ChildEntry>),
    /// The session asked to end.
    Exit,
}

impl Output {
    /// Convert to a plain value, as `$( ... )` does.
    pub fn into_value(self) -> Value {
        match self {
            Output::None | Output::Exit => Value::Null,
            Output::Value(v) => v,
            Output::Item(path) => Value::String(path.to_string()),
            Output::Table(rs) => rs.to_value(),
            Output::Listing(children) => Value::List(
                children
                    .into_iter()
                    .map(|c| Value::String(c.name))
                    .collect(),
            ),
        }
    }
}
