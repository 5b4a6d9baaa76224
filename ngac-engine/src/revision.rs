// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trackers for the revision a replica applied and the latest revision of the log.
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use ngac_core::Revision;
use ngac_log::{Backoff, BackoffConfig, EventLog, EventLogError, TailSubscription};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, trace, warn};

/// Revision of the last event this replica applied.
#[derive(Debug, Default)]
pub struct CurrentRevision {
    revision: AtomicU64,
    notify: Notify,
}

impl CurrentRevision {
    pub fn new(revision: Revision) -> Self {
        Self {
            revision: AtomicU64::new(revision),
            notify: Notify::new(),
        }
    }

    pub fn get(&self) -> Revision {
        self.revision.load(Ordering::SeqCst)
    }

    /// Advances the revision and wakes up all waiters. Never moves backwards.
    pub fn set(&self, revision: Revision) {
        let previous = self.revision.fetch_max(revision, Ordering::SeqCst);
        if revision > previous {
            trace!(revision, "current revision advanced");
            self.notify.notify_waiters();
        }
    }

    /// Waits until the revision reached at least `target`.
    ///
    /// Returns `true` right away if it did already, otherwise waits to be woken up by [`set`] for
    /// at most `timeout`. Returns `false` if the target was not reached in time.
    ///
    /// [`set`]: CurrentRevision::set
    pub async fn await_revision(&self, target: Revision, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            // Register before checking, so a `set` in between is not missed.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if self.get() >= target {
                return true;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.get() >= target;
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("latest revision unknown after waiting {0:?}")]
    Timeout(Duration),
}

/// Highest revision observed at the tail of the log.
///
/// Unknown until the first successful observation, [`LatestRevision::get`] waits for it.
#[derive(Debug, Default)]
pub struct LatestRevision {
    revision: AtomicU64,
    initialized: AtomicBool,
    notify: Notify,
}

impl LatestRevision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a revision seen in the log. Never moves backwards.
    pub fn observe(&self, revision: Revision) {
        self.revision.fetch_max(revision, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Returns the latest revision, waiting at most `timeout` for it to become known.
    pub async fn get(&self, timeout: Duration) -> Result<Revision, TrackerError> {
        let deadline = Instant::now() + timeout;

        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if self.is_initialized() {
                return Ok(self.revision.load(Ordering::SeqCst));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                if self.is_initialized() {
                    return Ok(self.revision.load(Ordering::SeqCst));
                }

                return Err(TrackerError::Timeout(timeout));
            }
        }
    }
}

/// Follows the tail of the policy stream in a background task and keeps a [`LatestRevision`]
/// up-to-date.
///
/// Nothing gets applied, the tracker only observes revisions. Lost subscriptions are
/// re-established with an exponential backoff. The task stops when the tracker is dropped.
#[derive(Debug)]
pub struct LatestRevisionTracker {
    latest: Arc<LatestRevision>,
    #[allow(dead_code)]
    handle: AbortOnDropHandle<()>,
}

impl LatestRevisionTracker {
    pub fn spawn<L>(log: L, stream: impl Into<String>, backoff: BackoffConfig) -> Self
    where
        L: EventLog + 'static,
        L::TailSubscription: 'static,
    {
        let latest = Arc::new(LatestRevision::new());
        let stream = stream.into();

        let handle = tokio::spawn({
            let latest = latest.clone();
            async move {
                let mut backoff = Backoff::from_config(backoff);

                loop {
                    match follow_tail(&log, &stream, &latest, &mut backoff).await {
                        Ok(()) => debug!(%stream, "tail subscription ended"),
                        Err(err) => warn!(%stream, %err, "could not follow tail of stream"),
                    }

                    backoff.sleep().await;
                    backoff.increment();
                }
            }
        });

        Self {
            latest,
            handle: AbortOnDropHandle::new(handle),
        }
    }

    pub fn latest(&self) -> Arc<LatestRevision> {
        self.latest.clone()
    }
}

async fn follow_tail<L>(
    log: &L,
    stream: &str,
    latest: &LatestRevision,
    backoff: &mut Backoff,
) -> Result<(), EventLogError>
where
    L: EventLog,
{
    // Subscribe first, events appended while reading the tail are delivered by the subscription.
    let mut subscription = log.subscribe_from_tail(stream).await?;

    let tail = match log.read_from_end(stream, 1).await {
        Ok(events) => events.first().map(|event| event.revision).unwrap_or_default(),
        Err(EventLogError::StreamNotFound(_)) => 0,
        Err(err) => return Err(err),
    };
    latest.observe(tail);
    backoff.reset();
    debug!(%stream, revision = tail, "following tail of stream");

    while let Some(event) = subscription.next().await? {
        latest.observe(event.revision);
    }

    Ok(())
}
