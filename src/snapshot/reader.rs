use crate::record::Record;
use im::OrdMap;
use std::sync::Arc;

/// The immutable identity-key → entry mapping of one published store version.
#[derive(Debug, Clone)]
pub struct StoreReadView<T: Record> {
    pub entries: OrdMap<T::Key, Arc<T>>,
    pub version: u64,
}

impl<T: Record> StoreReadView<T> {
    pub fn get(&self, key: &T::Key) -> Option<&Arc<T>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
