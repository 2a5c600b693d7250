use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rows::{Row, param_string, value_as_f64};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhereOperator {
    Eq,
    Ne,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Row predicate applied once when a metadata table is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WherePredicate {
    pub column: String,
    pub operator: WhereOperator,
    #[serde(default)]
    pub value: Value,
}

impl WherePredicate {
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(&self.column).unwrap_or(&Value::Null);
        match self.operator {
            WhereOperator::Eq => same_scalar(cell, &self.value),
            WhereOperator::Ne => !same_scalar(cell, &self.value),
            WhereOperator::In => self.list().iter().any(|v| same_scalar(cell, v)),
            WhereOperator::NotIn => !self.list().iter().any(|v| same_scalar(cell, v)),
            WhereOperator::Gt => compare(cell, &self.value, |a, b| a > b),
            WhereOperator::Gte => compare(cell, &self.value, |a, b| a >= b),
            WhereOperator::Lt => compare(cell, &self.value, |a, b| a < b),
            WhereOperator::Lte => compare(cell, &self.value, |a, b| a <= b),
        }
    }

    fn list(&self) -> &[Value] {
        match &self.value {
            Value::Array(items) => items,
            other => std::slice::from_ref(other),
        }
    }
}

fn same_scalar(a: &Value, b: &Value) -> bool {
    match (value_as_f64(a), value_as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => param_string(a) == param_string(b),
    }
}

fn compare(cell: &Value, bound: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (value_as_f64(cell), value_as_f64(bound)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataTableConfig {
    pub name: String,
    pub path: String,
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<WherePredicate>,
}

/// A fetched reference table used for filter options and cross-validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataTable {
    pub name: String,
    pub rows: Vec<Row>,
}

impl MetadataTable {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Builds a table from fetched rows, keeping only rows every predicate accepts.
    pub fn from_fetched(config: &MetadataTableConfig, rows: Vec<Row>) -> Self {
        let rows = rows
            .into_iter()
            .filter(|row| config.predicates.iter().all(|p| p.matches(row)))
            .collect();
        Self::new(config.name.clone(), rows)
    }

    /// Distinct string keys found in `column`.
    pub fn column_keys(&self, column: &str) -> BTreeSet<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(param_string))
            .collect()
    }

    /// Rows whose `column` value is one of `keys`.
    pub fn rows_matching<'a>(
        &'a self,
        column: &'a str,
        keys: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = &'a Row> + 'a {
        self.rows.iter().filter(move |row| {
            row.get(column)
                .and_then(param_string)
                .is_some_and(|k| keys.contains(&k))
        })
    }
}
