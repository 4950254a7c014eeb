//! Tokio host loop for a [`RefreshScheduler`].
//!
//! The driver runs on a `LocalSet` so every tick lands on the thread that
//! owns the scheduler. Hosts with their own event loop can skip this and
//! call [`RefreshScheduler::tick`] directly.

use crate::config::PermviewConfig;
use crate::live::scheduler::RefreshScheduler;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct RefreshDriver {
    scheduler: RefreshScheduler,
    handle: Option<JoinHandle<()>>,
}

impl RefreshDriver {
    /// Starts ticking `scheduler` every `interval`.
    ///
    /// Must be called from inside a `tokio::task::LocalSet` on the
    /// scheduler's owning thread. The loop ends on the first tick that fails.
    pub fn spawn_local(scheduler: RefreshScheduler, interval: Duration) -> Self {
        let period = interval.max(Duration::from_millis(1));
        let looped = scheduler.clone();
        let handle = tokio::task::spawn_local(async move {
            loop {
                tokio::time::sleep(period).await;
                if let Err(err) = looped.tick() {
                    warn!(error = %err, "refresh driver stopped");
                    break;
                }
            }
        });
        debug!(interval_ms = period.as_millis() as u64, "refresh driver started");
        Self {
            scheduler,
            handle: Some(handle),
        }
    }

    pub fn from_config(scheduler: RefreshScheduler, config: &PermviewConfig) -> Self {
        Self::spawn_local(scheduler, Duration::from_millis(config.refresh_interval_ms))
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the loop and waits for it to wind down.
    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        debug!(ticks = self.scheduler.ticks(), "refresh driver stopped");
    }
}

impl Drop for RefreshDriver {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RefreshDriver;
    use crate::config::PermviewConfig;
    use crate::live::observer::CollectionChange;
    use crate::live::scheduler::RefreshScheduler;
    use crate::permission::{AccessLevel, PermissionEntry};
    use crate::version_store::SharedStore;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn driver_delivers_changes_without_manual_ticks() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let store = SharedStore::<PermissionEntry>::new(&PermviewConfig::default())
                    .expect("store");
                let scheduler = RefreshScheduler::new();
                let results = scheduler.open(&store).expect("open");
                let seen = Arc::new(Mutex::new(Vec::new()));
                let sink = Arc::clone(&seen);
                let _token = results
                    .subscribe(move |_, change| sink.lock().push(change))
                    .expect("subscribe");

                let driver = RefreshDriver::spawn_local(scheduler.clone(), Duration::from_millis(2));
                store
                    .commit([PermissionEntry::new("/a", "u1", AccessLevel::Read, 1)])
                    .expect("commit");

                for _ in 0..200 {
                    if results.len().expect("len") == 1 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                assert!(driver.is_running());
                driver.stop().await;

                assert_eq!(results.len().expect("len"), 1);
                let seen = seen.lock();
                assert!(seen.first().is_some_and(CollectionChange::is_initial));
                assert!(scheduler.ticks() > 0);
            })
            .await;
    }

    #[tokio::test]
    async fn stop_halts_ticking() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let scheduler = RefreshScheduler::new();
                let driver = RefreshDriver::spawn_local(scheduler.clone(), Duration::from_millis(1));
                tokio::time::sleep(Duration::from_millis(10)).await;
                driver.stop().await;
                let after_stop = scheduler.ticks();
                tokio::time::sleep(Duration::from_millis(10)).await;
                assert_eq!(scheduler.ticks(), after_stop);
            })
            .await;
    }
}
