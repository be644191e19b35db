//! Leadership flag and the watchdog that revokes it
//!
//! Leadership is only ever trusted for one lease after the request that
//! confirmed it was sent. Each confirmation arms a fresh timer; if no newer
//! confirmation arrives before it fires, the flag drops to false no matter
//! what the campaign task is doing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, Span};

struct Armed {
    /// Bumped on every confirm/revoke so a superseded timer is a no-op
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

pub(crate) struct Leadership {
    armed: Mutex<Armed>,
    flag: watch::Sender<bool>,
    ttl: Duration,
    span: Span,
}

impl Leadership {
    pub(crate) fn new(ttl: Duration, span: Span) -> Arc<Self> {
        let (flag, _) = watch::channel(false);
        Arc::new(Self {
            armed: Mutex::new(Armed {
                generation: 0,
                timer: None,
            }),
            flag,
            ttl,
            span,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Armed> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_leader(&self) -> bool {
        *self.flag.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }

    /// Record a confirmed hold on the lock, obtained by a request sent at `since`.
    ///
    /// Returns false, leaving us not leading, if a whole lease has already
    /// passed since the request was sent.
    pub(crate) fn confirm(self: &Arc<Self>, since: Instant) -> bool {
        let deadline = since + self.ttl;
        if deadline <= Instant::now() {
            tracing::warn!(
                elapsed = ?since.elapsed(),
                "Write confirmed after the lease it granted had run out, not taking leadership"
            );
            self.revoke();
            return false;
        }

        let mut armed = self.lock();
        if let Some(timer) = armed.timer.take() {
            timer.abort();
        }
        armed.generation += 1;

        let generation = armed.generation;
        let this = Arc::downgrade(self);
        armed.timer = Some(tokio::spawn(
            fire_at(this, deadline, generation).instrument(self.span.clone()),
        ));

        if !self.flag.send_replace(true) {
            tracing::info!("We are now the leader");
        }
        true
    }

    /// Step down. Returns whether we were leading.
    pub(crate) fn revoke(&self) -> bool {
        let mut armed = self.lock();
        if let Some(timer) = armed.timer.take() {
            timer.abort();
        }
        armed.generation += 1;

        let was_leader = self.flag.send_replace(false);
        if was_leader {
            tracing::warn!("We are no longer the leader!");
        }
        was_leader
    }

    fn expire(&self, generation: u64) {
        let mut armed = self.lock();
        if armed.generation != generation {
            return;
        }
        armed.timer = None;

        if self.flag.send_replace(false) {
            tracing::warn!(
                "Setting is_leader false after {:?} without a confirmed renewal - is something preventing renewal?",
                self.ttl
            );
        }
    }
}

impl Drop for Leadership {
    fn drop(&mut self) {
        let armed = self.armed.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = armed.timer.take() {
            timer.abort();
        }
    }
}

async fn fire_at(leadership: Weak<Leadership>, deadline: Instant, generation: u64) {
    tokio::time::sleep_until(deadline).await;
    if let Some(leadership) = leadership.upgrade() {
        leadership.expire(generation);
    }
}
