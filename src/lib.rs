pub mod config;
pub mod error;
pub mod host;
pub mod live;
pub mod permission;
pub mod query;
pub mod record;
pub mod snapshot;
pub mod sync_bridge;
pub mod version_store;

pub use crate::config::PermviewConfig;
pub use crate::error::{PermviewError, PermviewErrorCode};
pub use crate::live::observer::CollectionChange;
pub use crate::live::scheduler::{RefreshScheduler, TickReport};
pub use crate::live::{Lifecycle, LiveCollection, NotificationToken};
pub use crate::permission::{AccessLevel, PermissionEntry, PermissionKey};
pub use crate::record::{Record, Value};
pub use crate::snapshot::Snapshot;
pub use crate::snapshot::diff::{EditScript, diff};
pub use crate::version_store::SharedStore;

use crate::query::executor::QueryLimits;
use crate::sync_bridge::SyncIngest;
use tracing::info;

/// Live view over every permission entry known to a store.
pub type PermissionResults = LiveCollection<PermissionEntry>;

/// A permission store plus the configuration it was opened with.
///
/// The instance is the write collaborator's entry point; hosts open result
/// collections from it through their own [`RefreshScheduler`].
#[derive(Debug, Clone)]
pub struct PermviewInstance {
    config: PermviewConfig,
    store: SharedStore<PermissionEntry>,
}

impl PermviewInstance {
    pub fn open(config: PermviewConfig) -> Result<Self, PermviewError> {
        config.validate()?;
        info!(
            max_retained_versions = config.max_retained_versions,
            max_sort_keys = config.max_sort_keys,
            max_expr_depth = config.max_expr_depth,
            max_batch_entries = config.max_batch_entries,
            refresh_interval_ms = config.refresh_interval_ms,
            "opening permview instance"
        );
        let store = SharedStore::new(&config)?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &PermviewConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore<PermissionEntry> {
        &self.store
    }

    pub fn latest_version(&self) -> u64 {
        self.store.latest_version()
    }

    pub fn commit<I>(&self, entries: I) -> Result<u64, PermviewError>
    where
        I: IntoIterator<Item = PermissionEntry>,
    {
        self.store.commit(entries)
    }

    /// Root results collection owned by `scheduler`'s thread, using this
    /// instance's query limits.
    pub fn results(&self, scheduler: &RefreshScheduler) -> Result<PermissionResults, PermviewError> {
        scheduler.open_with_limits(&self.store, QueryLimits::from(&self.config))
    }

    /// Starts a tokio ingest task committing into this instance's store.
    pub fn spawn_ingest(&self, capacity: usize) -> Result<SyncIngest<PermissionEntry>, PermviewError> {
        SyncIngest::spawn(self.store.clone(), capacity)
    }
}
