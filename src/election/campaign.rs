//! Background campaign: renew while leading, watch and race while following

use crate::common::{jittered, RenewWith, Result, StoreError};
use crate::election::watchdog::Leadership;
use crate::store::{Client, Precondition, Wait};
use futures_util::{pin_mut, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of one attempt to claim the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Won,
    /// Someone else holds it
    Lost,
    /// The store could not answer; worth retrying after a pause
    Failed,
}

pub(crate) struct Campaign {
    pub(crate) client: Client,
    pub(crate) path: String,
    pub(crate) identifier: String,
    pub(crate) ttl_secs: u64,
    pub(crate) interval: Duration,
    pub(crate) renew_with: RenewWith,
    /// modifiedIndex of our last confirmed write, 0 before the first one
    pub(crate) last_index: AtomicU64,
    pub(crate) leadership: Arc<Leadership>,
}

impl Campaign {
    pub(crate) async fn run(self: Arc<Self>) {
        self.try_acquire().await;
        loop {
            if self.leadership.is_leader() {
                tokio::time::sleep(self.interval).await;
                self.renew().await;
            } else {
                self.follow().await;
            }
        }
    }

    /// Claim the lock if nobody holds it.
    async fn try_acquire(&self) -> Attempt {
        let started = Instant::now();
        let result = self
            .client
            .set(
                &self.path,
                Some(self.identifier.as_str()),
                Some(Precondition::Absent),
                Some(self.ttl_secs),
            )
            .await;

        match result {
            Ok(response) => {
                self.last_index
                    .store(response.modified_index(), Ordering::SeqCst);
                if self.leadership.confirm(started) {
                    Attempt::Won
                } else {
                    Attempt::Lost
                }
            }
            Err(e) if e.is_precondition_failed() => {
                tracing::debug!("Lock is already held");
                Attempt::Lost
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to acquire lock");
                Attempt::Failed
            }
        }
    }

    /// Refresh our lease, only if we still hold the lock.
    async fn renew(&self) {
        let started = Instant::now();
        let result = self
            .client
            .set(
                &self.path,
                Some(self.identifier.as_str()),
                Some(self.held_precondition()),
                Some(self.ttl_secs),
            )
            .await;

        match result {
            Ok(response) => {
                self.last_index
                    .store(response.modified_index(), Ordering::SeqCst);
                if self.leadership.confirm(started) {
                    tracing::debug!(index = response.modified_index(), "Renewed lock");
                }
            }
            Err(e) => {
                if e.is_precondition_failed() {
                    tracing::warn!(error = %e, "Renewal rejected, lock was taken or lost");
                } else {
                    tracing::warn!(error = %e, "Renewal failed");
                }
                self.leadership.revoke();
            }
        }
    }

    /// Wait for the lock to become free and race for it. Returns once we are
    /// leader, or when the watch must be restarted.
    async fn follow(&self) {
        let after = match self.client.get(&self.path, Wait::No).await {
            Ok(current) => {
                tracing::debug!(holder = ?current.value(), "Following");
                current.modified_index()
            }
            Err(e) if e.is_key_not_found() => {
                if self.try_acquire().await == Attempt::Failed {
                    self.pause().await;
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read lock");
                self.pause().await;
                return;
            }
        };

        let events = self.client.watch_after(&self.path, after);
        pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(event) if event.action.removes_key() => {
                    tracing::debug!(action = %event.action, "Lock is free");
                    match self.try_acquire().await {
                        Attempt::Won => return,
                        Attempt::Lost => {}
                        // The key stays free and no further event will come; re-read it.
                        Attempt::Failed => {
                            self.pause().await;
                            return;
                        }
                    }
                }
                Ok(event) => {
                    tracing::debug!(action = %event.action, holder = ?event.value(), "Lock changed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Watch on lock ended, restarting");
                    if !e.store_error().is_some_and(StoreError::is_index_cleared) {
                        self.pause().await;
                    }
                    return;
                }
            }
        }
    }

    async fn pause(&self) {
        let delay = jittered(self.client.retry_interval(), self.client.retry_jitter());
        tokio::time::sleep(delay).await;
    }

    fn held_precondition(&self) -> Precondition {
        let index = self.last_index.load(Ordering::SeqCst);
        match self.renew_with {
            RenewWith::Index if index > 0 => Precondition::Index(index),
            _ => Precondition::Value(self.identifier.clone()),
        }
    }

    /// Delete the lock if it is still ours. Losing the compare is not an error.
    pub(crate) async fn release(&self) -> Result<()> {
        match self
            .client
            .delete(&self.path, Some(self.held_precondition()))
            .await
        {
            Ok(_) => {
                tracing::info!("Released lock");
                Ok(())
            }
            Err(e) if e.is_precondition_failed() => {
                tracing::debug!("Lock not held by us, nothing to release");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
