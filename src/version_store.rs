use crate::config::PermviewConfig;
use crate::error::PermviewError;
use crate::record::Record;
use crate::snapshot::reader::StoreReadView;
use im::OrdMap;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct Version<T: Record> {
    seq: u64,
    entries: OrdMap<T::Key, Arc<T>>,
    ref_count: Arc<AtomicU64>,
}

/// Ordered history of published versions. Version 0 is the empty store.
#[derive(Debug, Clone)]
pub struct VersionStore<T: Record> {
    versions: VecDeque<Version<T>>,
    max_retained_versions: usize,
}

/// Pins one version for as long as it is alive.
#[derive(Debug)]
pub struct ReadViewGuard<T: Record> {
    view: StoreReadView<T>,
    ref_count: Arc<AtomicU64>,
}

impl<T: Record> Drop for ReadViewGuard<T> {
    fn drop(&mut self) {
        self.ref_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: Record> Clone for ReadViewGuard<T> {
    fn clone(&self) -> Self {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
        Self {
            view: self.view.clone(),
            ref_count: Arc::clone(&self.ref_count),
        }
    }
}

impl<T: Record> ReadViewGuard<T> {
    pub fn view(&self) -> &StoreReadView<T> {
        &self.view
    }

    pub fn version(&self) -> u64 {
        self.view.version
    }
}

impl<T: Record> VersionStore<T> {
    pub fn new(max_retained_versions: usize) -> Self {
        let mut versions = VecDeque::new();
        versions.push_back(Version {
            seq: 0,
            entries: OrdMap::new(),
            ref_count: Arc::new(AtomicU64::new(0)),
        });
        Self {
            versions,
            max_retained_versions,
        }
    }

    pub fn latest_seq(&self) -> u64 {
        self.versions.back().map(|v| v.seq).unwrap_or(0)
    }

    pub fn oldest_seq(&self) -> u64 {
        self.versions.front().map(|v| v.seq).unwrap_or(0)
    }

    pub fn retained_seqs(&self) -> Vec<u64> {
        self.versions.iter().map(|v| v.seq).collect()
    }

    /// Clone of the latest mapping; cheap thanks to structural sharing.
    pub fn latest_entries(&self) -> OrdMap<T::Key, Arc<T>> {
        self.versions
            .back()
            .map(|v| v.entries.clone())
            .unwrap_or_default()
    }

    pub fn publish(&mut self, seq: u64, entries: OrdMap<T::Key, Arc<T>>) -> Result<(), PermviewError> {
        let latest = self.latest_seq();
        if seq <= latest {
            return Err(PermviewError::Validation(format!(
                "version {seq} does not advance latest version {latest}"
            )));
        }
        self.versions.push_back(Version {
            seq,
            entries,
            ref_count: Arc::new(AtomicU64::new(0)),
        });
        self.prune();
        Ok(())
    }

    pub fn acquire_latest(&self) -> Result<ReadViewGuard<T>, PermviewError> {
        self.versions
            .back()
            .map(acquire)
            .ok_or_else(|| PermviewError::Validation("version store is empty".into()))
    }

    pub fn acquire_at_seq(&self, seq: u64) -> Result<ReadViewGuard<T>, PermviewError> {
        let latest = self.latest_seq();
        if seq > latest {
            return Err(PermviewError::VersionNotVisible {
                requested: seq,
                latest,
            });
        }
        match self.versions.iter().find(|v| v.seq == seq) {
            Some(version) => Ok(acquire(version)),
            None => Err(PermviewError::StaleVersion {
                requested: seq,
                oldest_retained: self.oldest_seq(),
            }),
        }
    }

    /// Returns the number of versions reclaimed.
    pub fn gc(&mut self) -> usize {
        self.prune()
    }

    fn prune(&mut self) -> usize {
        let latest = self.latest_seq();
        let unreferenced = self
            .versions
            .iter()
            .filter(|v| v.seq != latest && v.ref_count.load(Ordering::Acquire) == 0)
            .count();
        let mut to_drop = unreferenced.saturating_sub(self.max_retained_versions);
        if to_drop == 0 {
            return 0;
        }
        let before = self.versions.len();
        // Oldest unreferenced versions go first.
        self.versions.retain(|v| {
            if to_drop > 0 && v.seq != latest && v.ref_count.load(Ordering::Acquire) == 0 {
                to_drop -= 1;
                return false;
            }
            true
        });
        before - self.versions.len()
    }
}

fn acquire<T: Record>(version: &Version<T>) -> ReadViewGuard<T> {
    version.ref_count.fetch_add(1, Ordering::AcqRel);
    ReadViewGuard {
        view: StoreReadView {
            entries: version.entries.clone(),
            version: version.seq,
        },
        ref_count: Arc::clone(&version.ref_count),
    }
}

#[derive(Debug)]
struct StoreInner<T: Record> {
    id: u64,
    versions: RwLock<VersionStore<T>>,
    latest: AtomicU64,
    commit_lock: Mutex<()>,
    max_batch_entries: usize,
}

/// Cross-thread handle to a version store.
///
/// This is the one structure shared between the synchronization write path
/// and thread-confined readers. Commits are serialized; each builds its new
/// mapping from the previous version and becomes visible through
/// [`SharedStore::latest_version`] only once fully published.
#[derive(Debug)]
pub struct SharedStore<T: Record> {
    inner: Arc<StoreInner<T>>,
    writable: bool,
}

impl<T: Record> Clone for SharedStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            writable: self.writable,
        }
    }
}

impl<T: Record> SharedStore<T> {
    pub fn new(config: &PermviewConfig) -> Result<Self, PermviewError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                versions: RwLock::new(VersionStore::new(config.max_retained_versions)),
                latest: AtomicU64::new(0),
                commit_lock: Mutex::new(()),
                max_batch_entries: config.max_batch_entries,
            }),
            writable: true,
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// A handle over the same versions that refuses to commit.
    pub fn read_only(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            writable: false,
        }
    }

    pub fn is_read_only(&self) -> bool {
        !self.writable
    }

    pub fn latest_version(&self) -> u64 {
        self.inner.latest.load(Ordering::Acquire)
    }

    /// Merges `updates` latest-wins by revision and publishes a new version.
    ///
    /// An update older than the stored entry for its key is dropped; an equal
    /// revision replaces it. Every successful call publishes exactly one new
    /// version, even if every update in the batch was superseded.
    pub fn commit<I>(&self, updates: I) -> Result<u64, PermviewError>
    where
        I: IntoIterator<Item = T>,
    {
        if !self.writable {
            return Err(PermviewError::UnsupportedOperation {
                operation: "commit through a read-only store handle",
            });
        }
        let updates: Vec<T> = updates.into_iter().collect();
        if updates.len() > self.inner.max_batch_entries {
            return Err(PermviewError::Validation(format!(
                "batch of {} entries exceeds max_batch_entries={}",
                updates.len(),
                self.inner.max_batch_entries
            )));
        }

        let _commit = self.inner.commit_lock.lock();
        let (mut entries, latest) = {
            let versions = self.inner.versions.read();
            (versions.latest_entries(), versions.latest_seq())
        };
        let mut applied = 0usize;
        let mut superseded = 0usize;
        for update in updates {
            let key = update.key();
            if let Some(existing) = entries.get(&key)
                && existing.revision() > update.revision()
            {
                superseded += 1;
                continue;
            }
            entries.insert(key, Arc::new(update));
            applied += 1;
        }

        let seq = latest + 1;
        self.inner.versions.write().publish(seq, entries)?;
        self.inner.latest.store(seq, Ordering::Release);
        debug!(store = self.inner.id, seq, applied, superseded, "published version");
        Ok(seq)
    }

    pub fn read(&self, version: u64) -> Result<ReadViewGuard<T>, PermviewError> {
        self.inner.versions.read().acquire_at_seq(version)
    }

    pub fn read_latest(&self) -> Result<ReadViewGuard<T>, PermviewError> {
        self.inner.versions.read().acquire_latest()
    }

    pub fn gc(&self) -> usize {
        let reclaimed = self.inner.versions.write().gc();
        if reclaimed > 0 {
            debug!(store = self.inner.id, reclaimed, "reclaimed versions");
        }
        reclaimed
    }

    pub fn retained_versions(&self) -> Vec<u64> {
        self.inner.versions.read().retained_seqs()
    }

    pub fn same_store(&self, other: &SharedStore<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{SharedStore, VersionStore};
    use crate::config::PermviewConfig;
    use crate::error::PermviewError;
    use crate::permission::{AccessLevel, PermissionEntry, PermissionKey};
    use im::OrdMap;
    use std::sync::Arc;
    use std::thread;

    fn entry(path: &str, user: &str, level: AccessLevel, at: i64) -> PermissionEntry {
        PermissionEntry::new(path, user, level, at)
    }

    fn store(retained: usize) -> SharedStore<PermissionEntry> {
        SharedStore::new(&PermviewConfig::default().with_max_retained_versions(retained))
            .expect("store")
    }

    #[test]
    fn versions_strictly_increase() {
        let store = store(16);
        assert_eq!(store.latest_version(), 0);
        let mut last = 0;
        for i in 0..10 {
            let v = store
                .commit([entry("/p", "u", AccessLevel::Read, i)])
                .expect("commit");
            assert!(v > last);
            last = v;
        }
        assert_eq!(store.latest_version(), 10);
    }

    #[test]
    fn latest_wins_by_revision_then_arrival() {
        let store = store(16);
        store
            .commit([entry("/p", "u", AccessLevel::Admin, 20)])
            .expect("commit");
        let v = store
            .commit([entry("/p", "u", AccessLevel::Read, 10)])
            .expect("older update");
        let key = PermissionKey::new("/p", "u");
        let view = store.read(v).expect("read");
        assert_eq!(
            view.view().get(&key).expect("entry").access_level(),
            AccessLevel::Admin
        );

        let v = store
            .commit([
                entry("/p", "u", AccessLevel::Read, 20),
                entry("/p", "u", AccessLevel::ReadWrite, 20),
            ])
            .expect("equal revisions");
        let view = store.read(v).expect("read");
        assert_eq!(
            view.view().get(&key).expect("entry").access_level(),
            AccessLevel::ReadWrite
        );
    }

    #[test]
    fn published_versions_are_stable_while_referenced() {
        let store = store(0);
        let v1 = store
            .commit([entry("/p1", "u1", AccessLevel::Read, 1)])
            .expect("v1");
        let pinned = store.read(v1).expect("pin v1");
        for i in 2..6 {
            store
                .commit([entry("/p1", "u1", AccessLevel::Admin, i)])
                .expect("commit");
        }
        store.gc();
        let again = store.read(v1).expect("v1 still retained");
        let key = PermissionKey::new("/p1", "u1");
        assert_eq!(
            again.view().get(&key).expect("entry").access_level(),
            AccessLevel::Read
        );
        assert_eq!(pinned.view().len(), 1);
        drop(again);
        drop(pinned);
        store.gc();
        let err = store.read(v1).expect_err("reclaimed");
        assert!(matches!(err, PermviewError::StaleVersion { requested: 1, .. }));
        assert_eq!(store.retained_versions(), vec![5]);
    }

    #[test]
    fn retention_window_keeps_recent_unreferenced_versions() {
        let store = store(2);
        for i in 1..=5 {
            store
                .commit([entry("/p", "u", AccessLevel::Read, i)])
                .expect("commit");
        }
        assert_eq!(store.retained_versions(), vec![3, 4, 5]);
        assert!(store.read(3).is_ok());
        assert!(matches!(
            store.read(2),
            Err(PermviewError::StaleVersion { .. })
        ));
        assert!(matches!(
            store.read(9),
            Err(PermviewError::VersionNotVisible {
                requested: 9,
                latest: 5
            })
        ));
    }

    #[test]
    fn read_only_handle_rejects_commits() {
        let store = store(4);
        let reader = store.read_only();
        let err = reader
            .commit([entry("/p", "u", AccessLevel::Read, 1)])
            .expect_err("read only");
        assert!(matches!(err, PermviewError::UnsupportedOperation { .. }));
        assert_eq!(reader.latest_version(), 0);
        assert!(reader.same_store(&store));
    }

    #[test]
    fn oversized_batches_publish_nothing() {
        let store = SharedStore::<PermissionEntry>::new(
            &PermviewConfig::default().with_max_batch_entries(1),
        )
        .expect("store");
        let err = store
            .commit([
                entry("/a", "u", AccessLevel::Read, 1),
                entry("/b", "u", AccessLevel::Read, 1),
            ])
            .expect_err("too large");
        assert!(matches!(err, PermviewError::Validation(_)));
        assert_eq!(store.latest_version(), 0);
    }

    #[test]
    fn publish_rejects_non_advancing_versions() {
        let mut versions = VersionStore::<PermissionEntry>::new(4);
        versions.publish(1, OrdMap::new()).expect("v1");
        assert!(versions.publish(1, OrdMap::new()).is_err());
    }

    #[test]
    fn concurrent_writers_publish_every_update() {
        let store = Arc::new(store(0));
        let handles: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        store
                            .commit([entry(&format!("/p{i}"), &format!("u{w}"), AccessLevel::Read, i)])
                            .expect("commit");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer");
        }
        assert_eq!(store.latest_version(), 100);
        assert_eq!(store.read_latest().expect("latest").view().len(), 100);
    }

    #[test]
    fn empty_store_reports_instead_of_panicking() {
        let mut versions = VersionStore::<PermissionEntry>::new(4);
        versions.acquire_latest().expect("version 0");
        versions.versions.clear();
        let err = versions.acquire_latest().expect_err("no versions");
        assert_eq!(err, PermviewError::Validation("version store is empty".into()));
    }
}
