use crate::error::PermviewError;
use crate::query::plan::{Expr, Order, SortKey};
use crate::record::{Record, Value};
use std::cmp::Ordering;

/// An [`Expr`] whose property names have been resolved against a record's
/// filter allow-list.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledExpr {
    Eq(&'static str, Value),
    Ne(&'static str, Value),
    Lt(&'static str, Value),
    Lte(&'static str, Value),
    Gt(&'static str, Value),
    Gte(&'static str, Value),
    In(&'static str, Vec<Value>),
    Between(&'static str, Value, Value),
    IsNull(&'static str),
    IsNotNull(&'static str),
    Like(&'static str, String),
    And(Box<CompiledExpr>, Box<CompiledExpr>),
    Or(Box<CompiledExpr>, Box<CompiledExpr>),
    Not(Box<CompiledExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledSortKey {
    pub property: &'static str,
    pub order: Order,
}

pub fn compile_expr<T: Record>(expr: &Expr, max_depth: usize) -> Result<CompiledExpr, PermviewError> {
    expr.validate_depth(max_depth)?;
    compile_expr_inner::<T>(expr)
}

fn compile_expr_inner<T: Record>(expr: &Expr) -> Result<CompiledExpr, PermviewError> {
    let p = find_filter_property::<T>;
    match expr {
        Expr::Eq(c, v) => Ok(CompiledExpr::Eq(p(c)?, v.clone())),
        Expr::Ne(c, v) => Ok(CompiledExpr::Ne(p(c)?, v.clone())),
        Expr::Lt(c, v) => Ok(CompiledExpr::Lt(p(c)?, v.clone())),
        Expr::Lte(c, v) => Ok(CompiledExpr::Lte(p(c)?, v.clone())),
        Expr::Gt(c, v) => Ok(CompiledExpr::Gt(p(c)?, v.clone())),
        Expr::Gte(c, v) => Ok(CompiledExpr::Gte(p(c)?, v.clone())),
        Expr::In(c, values) => Ok(CompiledExpr::In(p(c)?, values.clone())),
        Expr::Between(c, lo, hi) => Ok(CompiledExpr::Between(p(c)?, lo.clone(), hi.clone())),
        Expr::IsNull(c) => Ok(CompiledExpr::IsNull(p(c)?)),
        Expr::IsNotNull(c) => Ok(CompiledExpr::IsNotNull(p(c)?)),
        Expr::Like(c, pattern) => Ok(CompiledExpr::Like(p(c)?, pattern.clone())),
        Expr::And(a, b) => Ok(CompiledExpr::And(
            Box::new(compile_expr_inner::<T>(a)?),
            Box::new(compile_expr_inner::<T>(b)?),
        )),
        Expr::Or(a, b) => Ok(CompiledExpr::Or(
            Box::new(compile_expr_inner::<T>(a)?),
            Box::new(compile_expr_inner::<T>(b)?),
        )),
        Expr::Not(inner) => Ok(CompiledExpr::Not(Box::new(compile_expr_inner::<T>(inner)?))),
    }
}

pub fn compile_sort_keys<T: Record>(
    keys: &[SortKey],
    max_keys: usize,
) -> Result<Vec<CompiledSortKey>, PermviewError> {
    if keys.len() > max_keys {
        return Err(PermviewError::Validation(format!(
            "{} sort keys exceed max_sort_keys={max_keys}",
            keys.len()
        )));
    }
    keys.iter()
        .map(|key| {
            let property = T::sortable_properties()
                .iter()
                .copied()
                .find(|p| *p == key.property)
                .ok_or_else(|| PermviewError::InvalidSortProperty {
                    property: key.property.clone(),
                })?;
            Ok(CompiledSortKey {
                property,
                order: key.order,
            })
        })
        .collect()
}

fn find_filter_property<T: Record>(name: &str) -> Result<&'static str, PermviewError> {
    T::filterable_properties()
        .iter()
        .copied()
        .find(|p| *p == name)
        .ok_or_else(|| PermviewError::InvalidPredicate {
            reason: format!("unknown property '{name}'"),
        })
}

/// Pulls the sort tuple out of a record. A missing value means the record no
/// longer carries the property it is sorted by.
pub fn extract_sort_values<T: Record>(
    record: &T,
    keys: &[CompiledSortKey],
) -> Result<Vec<Value>, PermviewError> {
    keys.iter()
        .map(|key| {
            record
                .value(key.property)
                .ok_or_else(|| PermviewError::InvalidSortProperty {
                    property: key.property.to_string(),
                })
        })
        .collect()
}

pub fn compare_sort_values(left: &[Value], right: &[Value], keys: &[CompiledSortKey]) -> Ordering {
    for ((l, r), key) in left.iter().zip(right.iter()).zip(keys.iter()) {
        let ord = match key.order {
            Order::Asc => l.cmp(r),
            Order::Desc => r.cmp(l),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

pub fn eval_compiled_expr<T: Record>(expr: &CompiledExpr, record: &T) -> bool {
    match expr {
        CompiledExpr::Eq(p, v) => {
            record.value(p).is_some_and(|rv| compare_values(&rv, v).is_some_and(|o| o.is_eq()))
        }
        CompiledExpr::Ne(p, v) => {
            record.value(p).is_some_and(|rv| compare_values(&rv, v).is_some_and(|o| !o.is_eq()))
        }
        CompiledExpr::Lt(p, v) => {
            record.value(p).is_some_and(|rv| compare_values(&rv, v).is_some_and(|o| o.is_lt()))
        }
        CompiledExpr::Lte(p, v) => {
            record.value(p).is_some_and(|rv| compare_values(&rv, v).is_some_and(|o| o.is_le()))
        }
        CompiledExpr::Gt(p, v) => {
            record.value(p).is_some_and(|rv| compare_values(&rv, v).is_some_and(|o| o.is_gt()))
        }
        CompiledExpr::Gte(p, v) => {
            record.value(p).is_some_and(|rv| compare_values(&rv, v).is_some_and(|o| o.is_ge()))
        }
        CompiledExpr::In(p, values) => record.value(p).is_some_and(|rv| {
            values
                .iter()
                .any(|v| compare_values(&rv, v).is_some_and(|o| o.is_eq()))
        }),
        CompiledExpr::Between(p, lo, hi) => record.value(p).is_some_and(|rv| {
            compare_values(&rv, lo).is_some_and(|o| o.is_ge())
                && compare_values(&rv, hi).is_some_and(|o| o.is_le())
        }),
        CompiledExpr::IsNull(p) => record.value(p).is_none_or(|rv| matches!(rv, Value::Null)),
        CompiledExpr::IsNotNull(p) => record.value(p).is_some_and(|rv| !matches!(rv, Value::Null)),
        CompiledExpr::Like(p, pattern) => record.value(p).is_some_and(|rv| match rv {
            Value::Text(s) => like_match(&s, pattern),
            _ => false,
        }),
        CompiledExpr::And(a, b) => eval_compiled_expr(a, record) && eval_compiled_expr(b, record),
        CompiledExpr::Or(a, b) => eval_compiled_expr(a, record) || eval_compiled_expr(b, record),
        CompiledExpr::Not(inner) => !eval_compiled_expr(inner, record),
    }
}

fn like_match(value: &str, pattern: &str) -> bool {
    let text = value.as_bytes();
    let pat = pattern.as_bytes();
    let mut ti = 0usize;
    let mut pi = 0usize;
    let mut star_pi: Option<usize> = None;
    let mut star_ti = 0usize;

    while ti < text.len() {
        if pi < pat.len() && (pat[pi] == b'_' || pat[pi] == text[ti]) {
            ti += 1;
            pi += 1;
            continue;
        }
        if pi < pat.len() && pat[pi] == b'%' {
            star_pi = Some(pi);
            pi += 1;
            star_ti = ti;
            continue;
        }
        if let Some(saved_pi) = star_pi {
            pi = saved_pi + 1;
            star_ti += 1;
            ti = star_ti;
            continue;
        }
        return false;
    }

    while pi < pat.len() && pat[pi] == b'%' {
        pi += 1;
    }

    pi == pat.len()
}

/// `None` when the two values are not comparable (null or mismatched kinds).
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Timestamp(a), Value::Integer(b)) | (Value::Integer(a), Value::Timestamp(b)) => {
            Some(a.cmp(b))
        }
        (Value::Integer(a), Value::Integer(b)) | (Value::Timestamp(a), Value::Timestamp(b)) => {
            Some(a.cmp(b))
        }
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
