pub mod diff;
pub mod reader;

use crate::query::plan::{Expr, SortKey};
use crate::record::Record;
use crate::version_store::ReadViewGuard;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LINEAGE: AtomicU64 = AtomicU64::new(1);

/// Identifies the chain of snapshots produced for one collection. Only
/// snapshots sharing a lineage can be diffed against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lineage(u64);

impl Lineage {
    pub fn next() -> Self {
        Lineage(NEXT_LINEAGE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Filtered, ordered entries of one store version.
///
/// Holds a guard on its source version so the store keeps that version
/// while the snapshot is alive.
#[derive(Debug)]
pub struct Snapshot<T: Record> {
    lineage: Lineage,
    filter: Option<Expr>,
    sort_keys: Vec<SortKey>,
    items: Vec<Arc<T>>,
    source: ReadViewGuard<T>,
}

impl<T: Record> Snapshot<T> {
    pub(crate) fn new(
        lineage: Lineage,
        filter: Option<Expr>,
        sort_keys: Vec<SortKey>,
        items: Vec<Arc<T>>,
        source: ReadViewGuard<T>,
    ) -> Self {
        Self {
            lineage,
            filter,
            sort_keys,
            items,
            source,
        }
    }

    pub fn lineage(&self) -> Lineage {
        self.lineage
    }

    pub fn source_version(&self) -> u64 {
        self.source.version()
    }

    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort_keys
    }

    pub fn items(&self) -> &[Arc<T>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        self.items.get(index)
    }

    pub fn position(&self, key: &T::Key) -> Option<usize> {
        self.items.iter().position(|item| &item.key() == key)
    }

    pub(crate) fn same_definition(&self, other: &Snapshot<T>) -> bool {
        self.filter == other.filter && self.sort_keys == other.sort_keys
    }
}
