//! Leader election over a single lock key
//!
//! All participants of one election use the same lock path. The holder of
//! the key is the leader; it renews the key's lease every `interval` and is
//! trusted for at most one lease after its last confirmed renewal. Everyone
//! else watches the key and races to create it when it is deleted or expires.
//!
//! ```no_run
//! use syncrony::{ElectionConfig, Election, store::Client};
//!
//! # async fn example() -> syncrony::Result<()> {
//! let client = Client::connect(["http://127.0.0.1:4001"])?;
//! let election = Election::new(client, ElectionConfig::new("jobs/scheduler"))?;
//! election.run();
//! election.wait_for_leader().await;
//! // ... do leader work, checking election.is_leader() ...
//! election.cancel().await?;
//! # Ok(())
//! # }
//! ```

mod campaign;
mod watchdog;

use crate::common::{Config, ElectionConfig, Result};
use crate::store::{Client, Wait};
use campaign::Campaign;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span};
use watchdog::Leadership;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    /// Not running: before `run` or after `cancel`
    NotCandidate,
    Following,
    Leading,
}

impl std::fmt::Display for ElectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionState::NotCandidate => write!(f, "not-candidate"),
            ElectionState::Following => write!(f, "following"),
            ElectionState::Leading => write!(f, "leading"),
        }
    }
}

/// One participant in an election.
///
/// The identifier written into the lock must be unique among participants:
/// renewal by value cannot tell two holders with the same identifier apart.
/// Use [`RenewWith::Index`](crate::RenewWith::Index) to renew on the lock's
/// modification index instead.
///
/// Dropping an `Election` stops its tasks without releasing the lock; call
/// [`Election::cancel`] to step down promptly.
pub struct Election {
    campaign: Arc<Campaign>,
    runner: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl Election {
    pub fn new(client: Client, config: ElectionConfig) -> Result<Self> {
        let identifier = resolve_identifier(&config);
        let span = tracing::info_span!("election", path = %config.path, id = %identifier);
        Self::build(client, config, identifier, span)
    }

    /// Like [`Election::new`], with the campaign's logs recorded under `span`.
    pub fn with_span(client: Client, config: ElectionConfig, span: Span) -> Result<Self> {
        let identifier = resolve_identifier(&config);
        Self::build(client, config, identifier, span)
    }

    /// Build the client and election from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::new(&config.store)?;
        Self::new(client, config.election.clone())
    }

    fn build(client: Client, config: ElectionConfig, identifier: String, span: Span) -> Result<Self> {
        config.validate()?;

        let leadership = Leadership::new(config.ttl(), span.clone());
        let campaign = Campaign {
            client,
            path: config.path.trim_matches('/').to_string(),
            identifier,
            ttl_secs: config.ttl_secs,
            interval: config.interval(),
            renew_with: config.renew_with,
            last_index: AtomicU64::new(0),
            leadership,
        };

        Ok(Self {
            campaign: Arc::new(campaign),
            runner: Mutex::new(None),
            span,
        })
    }

    fn runner(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identifier(&self) -> &str {
        &self.campaign.identifier
    }

    pub fn path(&self) -> &str {
        &self.campaign.path
    }

    /// Enter the election. Does nothing if already running.
    ///
    /// The first thing the campaign does is try to claim the lock outright,
    /// so an unowned lock is taken without waiting for a watch event.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self) {
        let mut runner = self.runner();
        if runner.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        tracing::debug!(parent: &self.span, "Starting campaign");
        let campaign = self.campaign.clone();
        *runner = Some(tokio::spawn(campaign.run().instrument(self.span.clone())));
    }

    /// Whether we currently hold leadership. Never stale by more than one lease.
    pub fn is_leader(&self) -> bool {
        self.campaign.leadership.is_leader()
    }

    pub fn state(&self) -> ElectionState {
        let running = self
            .runner()
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        match (running, self.is_leader()) {
            (false, _) => ElectionState::NotCandidate,
            (true, true) => ElectionState::Leading,
            (true, false) => ElectionState::Following,
        }
    }

    /// Leadership changes, starting from the current value.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.campaign.leadership.subscribe()
    }

    /// Block until we are the leader. Waits forever if the election is not running.
    pub async fn wait_for_leader(&self) {
        let mut changes = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = changes.wait_for(|leading| *leading).await;
    }

    /// Identifier of the current lock holder, as stored.
    pub async fn leader(&self) -> Result<Option<String>> {
        match self.campaign.client.get(&self.campaign.path, Wait::No).await {
            Ok(response) => Ok(response.node.value),
            Err(e) if e.is_key_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Leave the election: stop the campaign, disarm the watchdog, drop
    /// leadership, and delete the lock if we still hold it so another
    /// participant can take over without waiting for the lease to run out.
    ///
    /// Safe to call in any state and more than once. `run` may be called again
    /// afterwards. Releasing goes through the store client, which retries while
    /// no endpoint is reachable; wrap in a timeout to bound it.
    pub async fn cancel(&self) -> Result<()> {
        let runner = self.runner().take();
        let Some(runner) = runner else {
            return Ok(());
        };

        runner.abort();
        let _ = runner.await;
        self.campaign.leadership.revoke();

        self.campaign.release().instrument(self.span.clone()).await
    }
}

fn resolve_identifier(config: &ElectionConfig) -> String {
    config
        .identifier
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

impl Drop for Election {
    fn drop(&mut self) {
        if let Some(runner) = self.runner().take() {
            runner.abort();
        }
        self.campaign.leadership.revoke();
    }
}
