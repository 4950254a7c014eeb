use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar projected out of a record for filtering and sorting.
///
/// Variants of different kinds order by declaration; numeric kinds
/// (`Integer`, `Timestamp`) are compared by value in predicates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Timestamp(i64),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Timestamp(_) => "timestamp",
            Value::Text(_) => "text",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "@{v}"),
            Value::Text(v) => write!(f, "'{v}'"),
        }
    }
}

/// A value type that can live in a [`crate::version_store::VersionStore`] and
/// be served through a [`crate::live::LiveCollection`].
///
/// Property names returned by `sortable_properties` form the sort allow-list;
/// `filterable_properties` bounds what predicates may reference. `value`
/// returning `None` for an allow-listed sort property means the record no
/// longer carries that field, and materialization fails for it.
pub trait Record: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    type Key: Ord + Clone + fmt::Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    /// Latest-wins merge clock. Higher revisions replace lower ones; equal
    /// revisions resolve to the later arrival.
    fn revision(&self) -> i64;

    fn sortable_properties() -> &'static [&'static str];

    fn filterable_properties() -> &'static [&'static str];

    fn value(&self, property: &str) -> Option<Value>;
}

#[cfg(test)]
mod tests {
    use super::Value;

    #[test]
    fn numeric_kinds_are_distinct_variants() {
        assert_ne!(Value::Integer(5), Value::Timestamp(5));
        assert_eq!(Value::from(5_i64).kind(), "integer");
        assert_eq!(Value::from("a").as_text(), Some("a"));
    }

    #[test]
    fn display_quotes_text() {
        assert_eq!(Value::from("p1").to_string(), "'p1'");
        assert_eq!(Value::Timestamp(9).to_string(), "@9");
    }
}
