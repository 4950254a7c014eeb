use crate::error::PermviewError;
use crate::live::LiveCollection;
use crate::live::owner::OwnerToken;
use crate::query::executor::QueryLimits;
use crate::record::Record;
use crate::version_store::SharedStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Result of one collection's part in a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub refreshed: bool,
    pub failed: bool,
    pub notified: usize,
}

/// Seam between the scheduler and collections of any record type.
pub(crate) trait Refreshable: Send + Sync {
    fn refresh(self: Arc<Self>) -> RefreshOutcome;

    fn is_live(&self) -> bool;

    fn store_id(&self) -> u64;

    /// `None` once the collection no longer holds its store.
    fn gc_store(&self) -> Option<usize>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub collections: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub notifications: usize,
    pub released: usize,
    pub reclaimed_versions: usize,
}

pub(crate) struct SchedulerShared {
    owner: OwnerToken,
    members: Mutex<Vec<Weak<dyn Refreshable>>>,
    ticks: AtomicU64,
    in_tick: AtomicBool,
}

/// Marks a pass as running until dropped, so a callback cannot start a
/// nested one.
struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Result<Self, PermviewError> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(PermviewError::Validation(
                "tick re-entered from a change callback".into(),
            ));
        }
        Ok(Self { flag })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives the refresh cycle of every collection opened through it.
///
/// The host calls [`RefreshScheduler::tick`] once per iteration of its
/// cooperative loop, on the thread that created the scheduler. Nothing
/// refreshes between ticks.
#[derive(Clone)]
pub struct RefreshScheduler {
    shared: Arc<SchedulerShared>,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("owner", &self.shared.owner)
            .field("ticks", &self.shared.ticks.load(Ordering::Relaxed))
            .finish()
    }
}

impl RefreshScheduler {
    /// Binds a new scheduler to the calling thread.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                owner: OwnerToken::current(),
                members: Mutex::new(Vec::new()),
                ticks: AtomicU64::new(0),
                in_tick: AtomicBool::new(false),
            }),
        }
    }

    pub fn owner(&self) -> OwnerToken {
        self.shared.owner
    }

    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    /// Root collection over `store`: no filter, identity-key order.
    pub fn open<T: Record>(&self, store: &SharedStore<T>) -> Result<LiveCollection<T>, PermviewError> {
        self.open_with_limits(store, QueryLimits::default())
    }

    pub fn open_with_limits<T: Record>(
        &self,
        store: &SharedStore<T>,
        limits: QueryLimits,
    ) -> Result<LiveCollection<T>, PermviewError> {
        self.shared.owner.check("open")?;
        LiveCollection::root(self.clone(), store.read_only(), limits)
    }

    /// Collections still referenced by a handle or notification token.
    pub fn live_collections(&self) -> usize {
        self.shared
            .members
            .lock()
            .iter()
            .filter(|m| m.upgrade().is_some_and(|m| m.is_live()))
            .count()
    }

    pub(crate) fn register(&self, member: Weak<dyn Refreshable>) {
        self.shared.members.lock().push(member);
    }

    /// One refresh pass over every registered collection, then version GC on
    /// each store they read.
    ///
    /// Passes never overlap: calling `tick` from inside a change callback
    /// fails with [`PermviewError::Validation`] and leaves the running pass
    /// untouched.
    pub fn tick(&self) -> Result<TickReport, PermviewError> {
        self.shared.owner.check("tick")?;
        let _running = TickGuard::enter(&self.shared.in_tick)?;
        let tick = self.shared.ticks.fetch_add(1, Ordering::AcqRel) + 1;

        // Collected up front so callbacks may open or derive collections.
        let (members, released) = {
            let mut registered = self.shared.members.lock();
            let before = registered.len();
            registered.retain(|m| m.strong_count() > 0);
            let released = before - registered.len();
            let members: Vec<Arc<dyn Refreshable>> =
                registered.iter().filter_map(Weak::upgrade).collect();
            (members, released)
        };

        let mut report = TickReport {
            tick,
            collections: members.len(),
            released,
            ..TickReport::default()
        };
        for member in &members {
            let outcome = Arc::clone(member).refresh();
            report.refreshed += usize::from(outcome.refreshed);
            report.failed += usize::from(outcome.failed);
            report.notifications += outcome.notified;
        }

        let mut collected = HashSet::new();
        for member in &members {
            if collected.contains(&member.store_id()) {
                continue;
            }
            if let Some(reclaimed) = member.gc_store() {
                collected.insert(member.store_id());
                report.reclaimed_versions += reclaimed;
            }
        }
        drop(members);

        if report.refreshed > 0 || report.failed > 0 || report.released > 0 {
            debug!(
                tick,
                collections = report.collections,
                refreshed = report.refreshed,
                failed = report.failed,
                notifications = report.notifications,
                released = report.released,
                reclaimed_versions = report.reclaimed_versions,
                "refresh tick"
            );
        }
        Ok(report)
    }
}
