// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures and test doubles shared by unit and integration tests.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ngac_core::{NodeId, PmlCompiler, Revision, UserContext};
use ngac_log::{
    BackoffConfig, EventLog, EventLogError, EventRecord, MemoryEventLog, RecordedEvent,
};
use ngac_store::{MemoryPolicyStore, PmlParser};
use tokio::time::Instant;
use tokio_util::task::AbortOnDropHandle;

use crate::adjudicator::Adjudicator;
use crate::command::CommandHandler;
use crate::config::{AdjudicatorConfig, Config, SubscriberConfig};
use crate::recorder::PluginRoutines;
use crate::replay::{Lockdown, PolicyEventHandler, PolicyEventSubscriber};
use crate::replica::{Replica, SharedReplica};
use crate::revision::CurrentRevision;

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

pub fn compiler() -> Arc<dyn PmlCompiler> {
    Arc::new(PmlParser::new())
}

pub fn author() -> UserContext {
    UserContext::new(NodeId(0))
}

/// Configuration with short intervals so tests don't spend their time sleeping.
pub fn test_config() -> Config {
    Config {
        adjudicator: AdjudicatorConfig::new()
            .max_attempts(3)
            .retry_interval(Duration::from_millis(10))
            .apply_timeout(Duration::from_secs(2)),
        subscriber: SubscriberConfig::new().backoff(BackoffConfig {
            initial_value: Duration::from_millis(5),
            multiplier: 2,
            max_jitter: Duration::from_millis(5),
            max_value: Duration::from_millis(50),
        }),
        ..Config::default()
    }
}

/// A replica with its adjudicator and a subscriber running in the background.
///
/// The subscriber task is aborted when the node is dropped.
pub struct TestNode<L> {
    pub adjudicator: Adjudicator<L, MemoryPolicyStore>,
    pub replica: SharedReplica<MemoryPolicyStore>,
    pub current: Arc<CurrentRevision>,
    pub lockdown: Arc<Lockdown>,
    subscriber: AbortOnDropHandle<()>,
}

impl<L> TestNode<L>
where
    L: EventLog + Clone + 'static,
    L::Subscription: 'static,
{
    pub fn spawn(log: L, config: &Config) -> Self {
        let replica = Replica::new(MemoryPolicyStore::new()).shared();
        let current = Arc::new(CurrentRevision::new(0));
        let lockdown = Arc::new(Lockdown::new());

        let subscriber = PolicyEventSubscriber::new(
            log.clone(),
            config,
            replica.clone(),
            PolicyEventHandler::new(compiler()),
            current.clone(),
            lockdown.clone(),
        )
        .spawn();

        let adjudicator = Adjudicator::new(
            log,
            config,
            replica.clone(),
            CommandHandler::new(compiler()),
            Arc::new(PluginRoutines::new()),
            current.clone(),
        );

        Self {
            adjudicator,
            replica,
            current,
            lockdown,
            subscriber,
        }
    }

    /// Waits until the replica applied the given revision. Returns `false` on timeout.
    pub async fn wait_for_replica(&self, revision: Revision, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            if self.replica.lock().await.revision() >= revision {
                return true;
            }

            if Instant::now() >= deadline {
                return false;
            }

            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Returns `true` once the background subscriber stopped.
    pub fn is_subscriber_finished(&self) -> bool {
        self.subscriber.is_finished()
    }
}

/// Event log whose appends always conflict, as if another writer always got there first.
///
/// Everything else is served by an inner [`MemoryEventLog`].
#[derive(Clone, Debug, Default)]
pub struct ConflictingLog {
    inner: MemoryEventLog,
    appends: Arc<AtomicUsize>,
}

impl ConflictingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of appends attempted so far.
    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

impl EventLog for ConflictingLog {
    type Subscription = <MemoryEventLog as EventLog>::Subscription;

    type TailSubscription = <MemoryEventLog as EventLog>::TailSubscription;

    async fn append(
        &self,
        stream: &str,
        expected: Revision,
        _records: Vec<EventRecord>,
    ) -> Result<Revision, EventLogError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        Err(EventLogError::Conflict {
            stream: stream.to_owned(),
            expected,
            actual: expected + 1,
        })
    }

    async fn read_from(
        &self,
        stream: &str,
        from: Revision,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventLogError> {
        self.inner.read_from(stream, from, max_count).await
    }

    async fn read_from_end(
        &self,
        stream: &str,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventLogError> {
        self.inner.read_from_end(stream, max_count).await
    }

    async fn create_consumer_group(&self, stream: &str, group: &str) -> Result<(), EventLogError> {
        self.inner.create_consumer_group(stream, group).await
    }

    async fn subscribe_durable(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<Self::Subscription, EventLogError> {
        self.inner.subscribe_durable(stream, group).await
    }

    async fn subscribe_from_tail(
        &self,
        stream: &str,
    ) -> Result<Self::TailSubscription, EventLogError> {
        self.inner.subscribe_from_tail(stream).await
    }
}
