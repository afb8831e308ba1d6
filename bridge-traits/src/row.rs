//! Loosely typed rows and bundles
//!
//! Provider queries return rows as a map of column names to values; RPC
//! calls exchange bundles with the same shape. Both are deliberately untyped
//! at this layer: the transport does not know what a media row is.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single row returned by a provider query
pub type Row = HashMap<String, RowValue>;

/// Arguments and results of a provider `call`
pub type Bundle = HashMap<String, RowValue>;

/// Rows returned by a provider query plus cursor-level extras.
///
/// Providers report paging tokens (resume keys) and similar metadata in
/// `extras` rather than in the rows themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub extras: Bundle,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            extras: Bundle::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: RowValue) -> Self {
        self.extras.insert(key.into(), value);
        self
    }
}

/// Represents a value that can be null, integer, real, text, boolean or a text list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    TextList(Vec<String>),
}

impl RowValue {
    /// Convert to i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RowValue::Integer(i) => Some(*i),
            RowValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert to &str if possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RowValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Providers encode booleans either natively or as 0/1 integers.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValue::Bool(b) => Some(*b),
            RowValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            RowValue::TextList(list) => Some(list.as_slice()),
            _ => None,
        }
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }
}

impl From<&str> for RowValue {
    fn from(value: &str) -> Self {
        RowValue::Text(value.to_string())
    }
}

impl From<String> for RowValue {
    fn from(value: String) -> Self {
        RowValue::Text(value)
    }
}

impl From<i64> for RowValue {
    fn from(value: i64) -> Self {
        RowValue::Integer(value)
    }
}

impl From<bool> for RowValue {
    fn from(value: bool) -> Self {
        RowValue::Bool(value)
    }
}

impl From<Vec<String>> for RowValue {
    fn from(value: Vec<String>) -> Self {
        RowValue::TextList(value)
    }
}

impl<T: Into<RowValue>> From<Option<T>> for RowValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RowValue::Null)
    }
}

/// Column accessors shared by [`Row`] and [`Bundle`].
///
/// Every getter treats a missing column and an explicit `Null` the same way.
pub trait RowExt {
    fn value(&self, column: &str) -> Option<&RowValue>;

    fn text(&self, column: &str) -> Option<String> {
        self.value(column)
            .and_then(RowValue::as_str)
            .map(str::to_string)
    }

    fn int(&self, column: &str) -> Option<i64> {
        self.value(column).and_then(RowValue::as_i64)
    }

    fn flag(&self, column: &str) -> Option<bool> {
        self.value(column).and_then(RowValue::as_bool)
    }

    fn text_list(&self, column: &str) -> Option<Vec<String>> {
        self.value(column)
            .and_then(RowValue::as_text_list)
            .map(<[String]>::to_vec)
    }
}

impl RowExt for HashMap<String, RowValue> {
    fn value(&self, column: &str) -> Option<&RowValue> {
        self.get(column).filter(|v| !v.is_null())
    }
}

/// Build a row/bundle from `(column, value)` pairs.
///
/// ```
/// use bridge_traits::row::{row_of, RowExt, RowValue};
///
/// let row = row_of([
///     ("authority", RowValue::Text("com.example.cloud".to_string())),
///     ("uid", RowValue::Integer(1000)),
/// ]);
/// assert_eq!(row.int("uid"), Some(1000));
/// ```
pub fn row_of<I, K>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, RowValue)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_missing_are_equivalent() {
        let row = row_of([("a", RowValue::Null)]);
        assert_eq!(row.text("a"), None);
        assert_eq!(row.text("b"), None);
    }

    #[test]
    fn test_integer_coercions() {
        let row = row_of([
            ("n", RowValue::Integer(7)),
            ("s", RowValue::Text(" 42 ".into())),
            ("b", RowValue::Integer(1)),
        ]);
        assert_eq!(row.int("n"), Some(7));
        assert_eq!(row.int("s"), Some(42));
        assert_eq!(row.flag("b"), Some(true));
    }

    #[test]
    fn test_option_into_row_value() {
        let none: Option<String> = None;
        assert!(RowValue::from(none).is_null());
        assert_eq!(RowValue::from(Some("x")), RowValue::Text("x".into()));
    }
}
