use crate::error::PermviewError;
use crate::permission::AccessLevel;
use crate::record::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending { Order::Asc } else { Order::Desc }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub property: String,
    pub order: Order,
}

impl SortKey {
    pub fn new(property: impl Into<String>, ascending: bool) -> Self {
        Self {
            property: property.into(),
            order: Order::from_ascending(ascending),
        }
    }

    pub fn asc(property: impl Into<String>) -> Self {
        Self::new(property, true)
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self::new(property, false)
    }
}

/// Predicate over record properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    Between(String, Value, Value),
    IsNull(String),
    IsNotNull(String),
    Like(String, String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn depth(&self) -> usize {
        match self {
            Expr::Eq(_, _)
            | Expr::Ne(_, _)
            | Expr::Lt(_, _)
            | Expr::Lte(_, _)
            | Expr::Gt(_, _)
            | Expr::Gte(_, _)
            | Expr::In(_, _)
            | Expr::Between(_, _, _)
            | Expr::IsNull(_)
            | Expr::IsNotNull(_)
            | Expr::Like(_, _) => 1,
            Expr::Not(inner) => 1 + inner.depth(),
            Expr::And(left, right) | Expr::Or(left, right) => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn validate_depth(&self, max_depth: usize) -> Result<(), PermviewError> {
        let depth = self.depth();
        if depth > max_depth {
            return Err(PermviewError::InvalidPredicate {
                reason: format!(
                    "expression depth {depth} exceeds maximum allowed depth of {max_depth}"
                ),
            });
        }
        Ok(())
    }
}

pub struct PropertyRef(String);

pub fn prop(name: &str) -> PropertyRef {
    PropertyRef(name.to_string())
}

pub trait IntoQueryValue {
    fn into_query_value(self) -> Value;
}

impl IntoQueryValue for Value {
    fn into_query_value(self) -> Value {
        self
    }
}

impl IntoQueryValue for bool {
    fn into_query_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl IntoQueryValue for i64 {
    fn into_query_value(self) -> Value {
        Value::Integer(self)
    }
}

impl IntoQueryValue for String {
    fn into_query_value(self) -> Value {
        Value::Text(self)
    }
}

impl IntoQueryValue for &str {
    fn into_query_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoQueryValue for AccessLevel {
    fn into_query_value(self) -> Value {
        self.into()
    }
}

pub fn lit<T: IntoQueryValue>(value: T) -> Value {
    value.into_query_value()
}

/// A timestamp literal, for comparisons against `updatedAt`.
pub fn at(millis: i64) -> Value {
    Value::Timestamp(millis)
}

impl PropertyRef {
    pub fn eq<V: IntoQueryValue>(self, value: V) -> Expr {
        Expr::Eq(self.0, value.into_query_value())
    }

    pub fn neq<V: IntoQueryValue>(self, value: V) -> Expr {
        Expr::Ne(self.0, value.into_query_value())
    }

    pub fn gt<V: IntoQueryValue>(self, value: V) -> Expr {
        Expr::Gt(self.0, value.into_query_value())
    }

    pub fn gte<V: IntoQueryValue>(self, value: V) -> Expr {
        Expr::Gte(self.0, value.into_query_value())
    }

    pub fn lt<V: IntoQueryValue>(self, value: V) -> Expr {
        Expr::Lt(self.0, value.into_query_value())
    }

    pub fn lte<V: IntoQueryValue>(self, value: V) -> Expr {
        Expr::Lte(self.0, value.into_query_value())
    }

    pub fn between<V: IntoQueryValue>(self, low: V, high: V) -> Expr {
        Expr::Between(self.0, low.into_query_value(), high.into_query_value())
    }

    pub fn in_(self, values: Vec<Value>) -> Expr {
        Expr::In(self.0, values)
    }

    /// SQL-style pattern: `%` matches any run, `_` one byte.
    pub fn like(self, pattern: &str) -> Expr {
        Expr::Like(self.0, pattern.to_string())
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(self.0)
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{Expr, Order, SortKey, lit, prop};
    use crate::permission::AccessLevel;
    use crate::record::Value;

    #[test]
    fn builders_produce_expected_nodes() {
        let expr = prop("userId")
            .eq("u1")
            .and(prop("accessLevel").gte(AccessLevel::Read));
        assert_eq!(
            expr,
            Expr::And(
                Box::new(Expr::Eq("userId".into(), lit("u1"))),
                Box::new(Expr::Gte("accessLevel".into(), Value::Integer(1))),
            )
        );
        assert_eq!(SortKey::new("path", false).order, Order::Desc);
    }

    #[test]
    fn depth_limit_rejects_deep_nesting() {
        let mut expr = prop("path").eq("/a");
        for _ in 0..40 {
            expr = expr.not();
        }
        assert_eq!(expr.depth(), 41);
        assert!(expr.validate_depth(32).is_err());
        assert!(prop("path").eq("/a").validate_depth(1).is_ok());
    }
}
