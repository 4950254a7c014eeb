use crate::error::PermviewError;
use crate::live::LiveCollection;
use crate::record::Record;
use crate::snapshot::diff::EditScript;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a subscriber is told on one refresh pass.
///
/// `Initial` carries nothing: the collection passed alongside it holds the
/// baseline contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange {
    Initial,
    Update(EditScript),
    Error(PermviewError),
}

impl CollectionChange {
    pub fn is_initial(&self) -> bool {
        matches!(self, CollectionChange::Initial)
    }

    pub fn edit_script(&self) -> Option<&EditScript> {
        match self {
            CollectionChange::Update(script) => Some(script),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&PermviewError> {
        match self {
            CollectionChange::Error(err) => Some(err),
            _ => None,
        }
    }
}

pub type ChangeCallback<T> = Box<dyn FnMut(&LiveCollection<T>, CollectionChange) + Send>;

struct Subscription<T: Record> {
    callback: Arc<Mutex<ChangeCallback<T>>>,
    initial_delivered: bool,
}

pub(crate) struct Delivery<T: Record> {
    pub id: u64,
    pub callback: Arc<Mutex<ChangeCallback<T>>>,
    pub change: CollectionChange,
}

/// Subscriptions of one collection, kept in subscription order.
pub struct ObserverRegistry<T: Record> {
    next_id: u64,
    subscriptions: BTreeMap<u64, Subscription<T>>,
}

impl<T: Record> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            subscriptions: BTreeMap::new(),
        }
    }
}

impl<T: Record> ObserverRegistry<T> {
    pub fn register(&mut self, callback: ChangeCallback<T>) -> u64 {
        self.next_id += 1;
        self.subscriptions.insert(
            self.next_id,
            Subscription {
                callback: Arc::new(Mutex::new(callback)),
                initial_delivered: false,
            },
        );
        self.next_id
    }

    /// Returns whether the id was still registered.
    pub fn remove(&mut self, id: u64) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.subscriptions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn has_pending_initial(&self) -> bool {
        self.subscriptions.values().any(|s| !s.initial_delivered)
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    /// Decides who hears what on this pass and marks initial callbacks as
    /// delivered. A subscriber still waiting for its initial callback gets
    /// only that, never the update or error of the same pass.
    pub(crate) fn plan_delivery(
        &mut self,
        update: Option<&EditScript>,
        failure: Option<&PermviewError>,
    ) -> Vec<Delivery<T>> {
        let mut out = Vec::new();
        for (id, subscription) in self.subscriptions.iter_mut() {
            let change = if !subscription.initial_delivered {
                subscription.initial_delivered = true;
                CollectionChange::Initial
            } else if let Some(err) = failure {
                CollectionChange::Error(err.clone())
            } else if let Some(script) = update {
                CollectionChange::Update(script.clone())
            } else {
                continue;
            };
            out.push(Delivery {
                id: *id,
                callback: Arc::clone(&subscription.callback),
                change,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionChange, ObserverRegistry};
    use crate::error::PermviewError;
    use crate::permission::PermissionEntry;
    use crate::snapshot::diff::EditScript;

    fn noop() -> super::ChangeCallback<PermissionEntry> {
        Box::new(|_, _| {})
    }

    #[test]
    fn initial_precedes_updates() {
        let mut registry = ObserverRegistry::<PermissionEntry>::default();
        let first = registry.register(noop());
        let script = EditScript {
            insertions: vec![0],
            ..Default::default()
        };

        let plan = registry.plan_delivery(Some(&script), None);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, first);
        assert!(plan[0].change.is_initial());

        let second = registry.register(noop());
        let plan = registry.plan_delivery(Some(&script), None);
        let changes: Vec<_> = plan.iter().map(|d| (d.id, d.change.clone())).collect();
        assert_eq!(
            changes,
            vec![
                (first, CollectionChange::Update(script.clone())),
                (second, CollectionChange::Initial),
            ]
        );

        assert!(registry.plan_delivery(None, None).is_empty());
    }

    #[test]
    fn errors_replace_updates() {
        let mut registry = ObserverRegistry::<PermissionEntry>::default();
        registry.register(noop());
        let _ = registry.plan_delivery(None, None);
        let plan = registry.plan_delivery(
            Some(&EditScript::default()),
            Some(&PermviewError::Detached),
        );
        assert_eq!(plan[0].change.error(), Some(&PermviewError::Detached));
        assert!(plan[0].change.edit_script().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = ObserverRegistry::<PermissionEntry>::default();
        let id = registry.register(noop());
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }
}
