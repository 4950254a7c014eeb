use crate::config::PermviewConfig;
use crate::error::PermviewError;
use crate::query::operators::{
    CompiledExpr, CompiledSortKey, compare_sort_values, compile_expr, compile_sort_keys,
    eval_compiled_expr, extract_sort_values,
};
use crate::query::plan::{Expr, SortKey};
use crate::record::{Record, Value};
use crate::snapshot::{Lineage, Snapshot};
use crate::version_store::{ReadViewGuard, SharedStore};
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub max_sort_keys: usize,
    pub max_expr_depth: usize,
}

impl From<&PermviewConfig> for QueryLimits {
    fn from(config: &PermviewConfig) -> Self {
        Self {
            max_sort_keys: config.max_sort_keys,
            max_expr_depth: config.max_expr_depth,
        }
    }
}

impl Default for QueryLimits {
    fn default() -> Self {
        (&PermviewConfig::default()).into()
    }
}

/// Validated filter and sort order of a collection.
///
/// Construction compiles both against the record's allow-lists, so anything
/// that builds successfully can be materialized without name lookups.
#[derive(Debug, Clone)]
pub struct QueryDescriptor<T: Record> {
    filter: Option<Expr>,
    sort_keys: Vec<SortKey>,
    compiled_filter: Option<CompiledExpr>,
    compiled_sort: Vec<CompiledSortKey>,
    limits: QueryLimits,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> QueryDescriptor<T> {
    /// No filter, identity-key order.
    pub fn identity(limits: QueryLimits) -> Self {
        Self {
            filter: None,
            sort_keys: Vec::new(),
            compiled_filter: None,
            compiled_sort: Vec::new(),
            limits,
            _record: PhantomData,
        }
    }

    pub fn new(
        filter: Option<Expr>,
        sort_keys: Vec<SortKey>,
        limits: QueryLimits,
    ) -> Result<Self, PermviewError> {
        let compiled_filter = filter
            .as_ref()
            .map(|expr| compile_expr::<T>(expr, limits.max_expr_depth))
            .transpose()?;
        let compiled_sort = compile_sort_keys::<T>(&sort_keys, limits.max_sort_keys)?;
        Ok(Self {
            filter,
            sort_keys,
            compiled_filter,
            compiled_sort,
            limits,
            _record: PhantomData,
        })
    }

    /// This descriptor's filter AND `predicate`, same sort order.
    pub fn and_filter(&self, predicate: Expr) -> Result<Self, PermviewError> {
        let filter = match &self.filter {
            Some(existing) => existing.clone().and(predicate),
            None => predicate,
        };
        Self::new(Some(filter), self.sort_keys.clone(), self.limits)
    }

    /// Same filter, `sort_keys` replacing the current order.
    pub fn with_sort(&self, sort_keys: Vec<SortKey>) -> Result<Self, PermviewError> {
        Self::new(self.filter.clone(), sort_keys, self.limits)
    }

    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort_keys
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }
}

/// Builds the snapshot of `source` under `descriptor`.
///
/// One pass over the version's mapping in identity-key order, then a stable
/// sort on the extracted sort tuples. Because input arrives in key order and
/// the sort is stable, ties end up ordered by identity key.
pub fn materialize<T: Record>(
    source: ReadViewGuard<T>,
    descriptor: &QueryDescriptor<T>,
    lineage: Lineage,
) -> Result<Snapshot<T>, PermviewError> {
    let mut rows: Vec<(Vec<Value>, Arc<T>)> = Vec::new();
    for entry in source.view().entries.values() {
        if let Some(filter) = &descriptor.compiled_filter
            && !eval_compiled_expr(filter, entry.as_ref())
        {
            continue;
        }
        let sort_values = extract_sort_values(entry.as_ref(), &descriptor.compiled_sort)?;
        rows.push((sort_values, Arc::clone(entry)));
    }
    if !descriptor.compiled_sort.is_empty() {
        let keys = &descriptor.compiled_sort;
        rows.sort_by(|(left, _), (right, _)| compare_sort_values(left, right, keys));
    }
    let items = rows.into_iter().map(|(_, entry)| entry).collect();
    Ok(Snapshot::new(
        lineage,
        descriptor.filter.clone(),
        descriptor.sort_keys.clone(),
        items,
        source,
    ))
}

/// [`materialize`] against a specific retained version of `store`.
pub fn materialize_at<T: Record>(
    store: &SharedStore<T>,
    version: u64,
    descriptor: &QueryDescriptor<T>,
    lineage: Lineage,
) -> Result<Snapshot<T>, PermviewError> {
    let source = store.read(version)?;
    materialize(source, descriptor, lineage)
}
