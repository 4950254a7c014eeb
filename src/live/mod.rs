//! Live, thread-confined result collections.
//!
//! A [`LiveCollection`] owns the current [`Snapshot`] of a query over a
//! [`SharedStore`]. It never refreshes on its own: the
//! [`RefreshScheduler`] it was opened through swaps in a new snapshot on each
//! tick in which the store has advanced, and tells subscribers what changed.
//! Reads always return the last materialized snapshot, never a partially
//! refreshed one.

pub mod observer;
pub mod owner;
pub mod scheduler;

use crate::error::PermviewError;
use crate::query::executor::{QueryDescriptor, QueryLimits, materialize};
use crate::query::plan::{Expr, SortKey};
use crate::record::Record;
use crate::snapshot::diff::{EditScript, diff};
use crate::snapshot::{Lineage, Snapshot};
use crate::version_store::{ReadViewGuard, SharedStore};
use observer::{ChangeCallback, CollectionChange, ObserverRegistry};
use owner::OwnerToken;
use parking_lot::Mutex;
use scheduler::{RefreshOutcome, RefreshScheduler, Refreshable};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Live,
    Detached,
}

/// What a live collection holds on to. Detaching drops both.
struct LiveState<T: Record> {
    snapshot: Arc<Snapshot<T>>,
    store: SharedStore<T>,
}

impl<T: Record> Clone for LiveState<T> {
    fn clone(&self) -> Self {
        Self {
            snapshot: Arc::clone(&self.snapshot),
            store: self.store.clone(),
        }
    }
}

enum CollectionState<T: Record> {
    Live(LiveState<T>),
    Detached,
}

struct CollectionInner<T: Record> {
    owner: OwnerToken,
    lineage: Lineage,
    store_id: u64,
    descriptor: QueryDescriptor<T>,
    scheduler: RefreshScheduler,
    state: Mutex<CollectionState<T>>,
    observers: Mutex<ObserverRegistry<T>>,
}

/// Thread-confined handle to a live query result.
///
/// Handles are cheap to clone and may be moved between threads, but every
/// read, subscription and derivation checks the calling thread against the
/// owner and fails with [`PermviewError::WrongThread`] elsewhere. The
/// collection has no mutating surface; entries change only through commits
/// on the store.
pub struct LiveCollection<T: Record> {
    inner: Arc<CollectionInner<T>>,
}

impl<T: Record> Clone for LiveCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record> std::fmt::Debug for LiveCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveCollection")
            .field("lineage", &self.inner.lineage.id())
            .field("lifecycle", &self.lifecycle())
            .field("filter", &self.inner.descriptor.filter())
            .field("sort_keys", &self.inner.descriptor.sort_keys())
            .finish()
    }
}

impl<T: Record> LiveCollection<T> {
    pub(crate) fn root(
        scheduler: RefreshScheduler,
        store: SharedStore<T>,
        limits: QueryLimits,
    ) -> Result<Self, PermviewError> {
        let source = store.read_latest()?;
        Self::create(scheduler, store, QueryDescriptor::identity(limits), source)
    }

    fn create(
        scheduler: RefreshScheduler,
        store: SharedStore<T>,
        descriptor: QueryDescriptor<T>,
        source: ReadViewGuard<T>,
    ) -> Result<Self, PermviewError> {
        let lineage = Lineage::next();
        let snapshot = materialize(source, &descriptor, lineage)?;
        debug!(
            lineage = lineage.id(),
            version = snapshot.source_version(),
            items = snapshot.len(),
            "collection materialized"
        );
        let inner = Arc::new(CollectionInner {
            owner: scheduler.owner(),
            lineage,
            store_id: store.id(),
            descriptor,
            scheduler: scheduler.clone(),
            state: Mutex::new(CollectionState::Live(LiveState {
                snapshot: Arc::new(snapshot),
                store,
            })),
            observers: Mutex::new(ObserverRegistry::default()),
        });
        let member: Weak<CollectionInner<T>> = Arc::downgrade(&inner);
        let member: Weak<dyn Refreshable> = member;
        scheduler.register(member);
        Ok(Self { inner })
    }

    fn derive(&self, operation: &'static str, descriptor: QueryDescriptor<T>) -> Result<Self, PermviewError> {
        self.inner.owner.check(operation)?;
        let current = self.inner.live_state().ok_or(PermviewError::Detached)?;
        // The child starts from the parent's version so both agree until the next tick.
        let source = current.store.read(current.snapshot.source_version())?;
        Self::create(self.inner.scheduler.clone(), current.store, descriptor, source)
    }

    fn live_snapshot(&self) -> Result<Arc<Snapshot<T>>, PermviewError> {
        self.inner
            .live_state()
            .map(|state| state.snapshot)
            .ok_or(PermviewError::Detached)
    }

    fn checked_snapshot(&self, operation: &'static str) -> Result<Arc<Snapshot<T>>, PermviewError> {
        self.inner.owner.check(operation)?;
        self.live_snapshot()
    }

    /// A collection of this one's entries matching `predicate` as well.
    pub fn filtered(&self, predicate: Expr) -> Result<Self, PermviewError> {
        self.inner.owner.check("filtered")?;
        let descriptor = self.inner.descriptor.and_filter(predicate)?;
        self.derive("filtered", descriptor)
    }

    /// Same entries ordered by `sort_keys`, replacing any previous order.
    pub fn sorted(&self, sort_keys: Vec<SortKey>) -> Result<Self, PermviewError> {
        self.inner.owner.check("sorted")?;
        let descriptor = self.inner.descriptor.with_sort(sort_keys)?;
        self.derive("sorted", descriptor)
    }

    pub fn sort(&self, property: &str, ascending: bool) -> Result<Self, PermviewError> {
        self.sorted(vec![SortKey::new(property, ascending)])
    }

    pub fn items(&self) -> Result<Vec<Arc<T>>, PermviewError> {
        Ok(self.checked_snapshot("items")?.items().to_vec())
    }

    pub fn snapshot(&self) -> Result<Arc<Snapshot<T>>, PermviewError> {
        self.checked_snapshot("snapshot")
    }

    pub fn len(&self) -> Result<usize, PermviewError> {
        Ok(self.checked_snapshot("len")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, PermviewError> {
        Ok(self.checked_snapshot("is_empty")?.is_empty())
    }

    pub fn get(&self, index: usize) -> Result<Option<Arc<T>>, PermviewError> {
        Ok(self.checked_snapshot("get")?.get(index).cloned())
    }

    pub fn first(&self) -> Result<Option<Arc<T>>, PermviewError> {
        Ok(self.checked_snapshot("first")?.items().first().cloned())
    }

    pub fn last(&self) -> Result<Option<Arc<T>>, PermviewError> {
        Ok(self.checked_snapshot("last")?.items().last().cloned())
    }

    pub fn index_of(&self, key: &T::Key) -> Result<Option<usize>, PermviewError> {
        Ok(self.checked_snapshot("index_of")?.position(key))
    }

    /// Store version the current snapshot was built from.
    pub fn version(&self) -> Result<u64, PermviewError> {
        Ok(self.checked_snapshot("version")?.source_version())
    }

    /// Registers `callback` for change notifications.
    ///
    /// The next tick calls it once with [`CollectionChange::Initial`]; later
    /// ticks pass the edit script of each non-empty refresh, or the error
    /// that prevented one.
    pub fn subscribe<F>(&self, callback: F) -> Result<NotificationToken<T>, PermviewError>
    where
        F: FnMut(&LiveCollection<T>, CollectionChange) + Send + 'static,
    {
        self.inner.owner.check("subscribe")?;
        self.live_snapshot()?;
        let boxed: ChangeCallback<T> = Box::new(callback);
        let id = self.inner.observers.lock().register(boxed);
        Ok(NotificationToken {
            id,
            collection: Arc::clone(&self.inner),
        })
    }

    /// Stops notifications for `token`. Unknown or already invalidated
    /// tokens are ignored.
    pub fn unsubscribe(&self, token: &NotificationToken<T>) {
        if Arc::ptr_eq(&self.inner, &token.collection) {
            token.invalidate();
        }
    }

    /// Ends the collection: drops its snapshot (releasing the store version
    /// it pinned), its store handle and all subscriptions. Terminal.
    pub fn detach(&self) -> Result<(), PermviewError> {
        self.inner.owner.check("detach")?;
        let previous = std::mem::replace(&mut *self.inner.state.lock(), CollectionState::Detached);
        self.inner.observers.lock().clear();
        if let CollectionState::Live(state) = previous {
            debug!(
                lineage = self.inner.lineage.id(),
                version = state.snapshot.source_version(),
                "collection detached"
            );
        }
        Ok(())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match &*self.inner.state.lock() {
            CollectionState::Live(_) => Lifecycle::Live,
            CollectionState::Detached => Lifecycle::Detached,
        }
    }

    pub fn owner(&self) -> OwnerToken {
        self.inner.owner
    }

    pub fn lineage(&self) -> Lineage {
        self.inner.lineage
    }

    pub fn filter(&self) -> Option<&Expr> {
        self.inner.descriptor.filter()
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        self.inner.descriptor.sort_keys()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Read-only handle to the backing store, gone once detached.
    pub fn store(&self) -> Result<SharedStore<T>, PermviewError> {
        self.inner
            .live_state()
            .map(|state| state.store)
            .ok_or(PermviewError::Detached)
    }
}

impl<T: Record> CollectionInner<T> {
    fn live_state(&self) -> Option<LiveState<T>> {
        match &*self.state.lock() {
            CollectionState::Live(state) => Some(state.clone()),
            CollectionState::Detached => None,
        }
    }

    fn advance(&self, current: &LiveState<T>) -> Result<(Snapshot<T>, EditScript), PermviewError> {
        let next = materialize(current.store.read_latest()?, &self.descriptor, self.lineage)?;
        let script = diff(&current.snapshot, &next)?;
        Ok((next, script))
    }
}

impl<T: Record> Refreshable for CollectionInner<T> {
    fn refresh(self: Arc<Self>) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::default();
        let Some(current) = self.live_state() else {
            return outcome;
        };

        let mut update = None;
        let mut failure = None;
        if current.store.latest_version() > current.snapshot.source_version() {
            match self.advance(&current) {
                Ok((next, script)) => {
                    if let CollectionState::Live(state) = &mut *self.state.lock() {
                        state.snapshot = Arc::new(next);
                        outcome.refreshed = true;
                        if !script.is_empty() {
                            update = Some(script);
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        lineage = self.lineage.id(),
                        version = current.snapshot.source_version(),
                        error = %err,
                        "collection refresh failed; keeping current snapshot"
                    );
                    outcome.failed = true;
                    failure = Some(err);
                }
            }
        }
        drop(current);

        let deliveries = self
            .observers
            .lock()
            .plan_delivery(update.as_ref(), failure.as_ref());
        if deliveries.is_empty() {
            return outcome;
        }
        let handle = LiveCollection {
            inner: Arc::clone(&self),
        };
        for delivery in deliveries {
            // A callback earlier in this pass may have unsubscribed this one.
            if !self.observers.lock().contains(delivery.id) {
                continue;
            }
            let mut callback = delivery.callback.lock();
            if catch_unwind(AssertUnwindSafe(|| (*callback)(&handle, delivery.change))).is_err() {
                warn!(
                    lineage = self.lineage.id(),
                    subscription = delivery.id,
                    "change callback panicked"
                );
            }
            outcome.notified += 1;
        }
        outcome
    }

    fn is_live(&self) -> bool {
        matches!(*self.state.lock(), CollectionState::Live(_))
    }

    fn store_id(&self) -> u64 {
        self.store_id
    }

    fn gc_store(&self) -> Option<usize> {
        self.live_state().map(|state| state.store.gc())
    }
}

impl<T: Record> Drop for CollectionInner<T> {
    fn drop(&mut self) {
        debug!(lineage = self.lineage.id(), "collection released");
    }
}

/// Keeps a subscription (and its collection) alive.
///
/// Notifications stop when the token is invalidated or dropped, whichever
/// comes first.
pub struct NotificationToken<T: Record> {
    id: u64,
    collection: Arc<CollectionInner<T>>,
}

impl<T: Record> NotificationToken<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn invalidate(&self) {
        self.collection.observers.lock().remove(self.id);
    }

    pub fn is_active(&self) -> bool {
        self.collection.observers.lock().contains(self.id)
    }
}

impl<T: Record> Drop for NotificationToken<T> {
    fn drop(&mut self) {
        self.invalidate();
    }
}

impl<T: Record> std::fmt::Debug for NotificationToken<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationToken")
            .field("id", &self.id)
            .field("lineage", &self.collection.lineage.id())
            .finish()
    }
}
