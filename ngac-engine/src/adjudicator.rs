// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write path: turning administrative requests into durably ordered events.
//!
//! Every attempt runs the request against a [`DisposableContext`] on the shared replica, wrapped
//! in an [`EventRecorder`]. The store validates the mutations, the recorder captures them as
//! events and the context throws the store changes away again. The events are then appended to
//! the log at the revision the replica was at. When another writer was faster, the append
//! conflicts and the whole attempt starts over from a fresh context.
//!
//! The adjudicator never advances the [`CurrentRevision`] itself, only the subscriber applying
//! the log does. After publishing, a write waits for the local replica to apply its events, so
//! reads admitted by the consistency check observe them and the next write is validated against
//! them.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ngac_core::cbor::EncodeError;
use ngac_core::{
    AdminCommand, CommandOutcome, PolicyError, PolicyEvent, PolicyStore, Revision, Transactional,
    UserContext,
};
use ngac_log::{EventLog, EventLogError, EventRecord};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::command::{CommandError, CommandHandler};
use crate::config::{AdjudicatorConfig, Config};
use crate::context::DisposableContext;
use crate::error::ErrorKind;
use crate::recorder::{EventRecorder, PluginRoutines};
use crate::replica::SharedReplica;
use crate::revision::CurrentRevision;

/// What requests get to mutate during adjudication.
pub type Recorder<'a, S> = EventRecorder<DisposableContext<'a, S>>;

/// Result of a successful adjudication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adjudicated<T> {
    /// Value produced by the request.
    pub value: T,

    /// Events appended to the log, empty if the request did not change anything.
    pub events: Vec<PolicyEvent>,

    /// Revision of the last appended event, or the revision the request was validated against
    /// if nothing was appended.
    pub revision: Revision,
}

#[derive(Debug)]
pub struct Adjudicator<L, S> {
    log: L,
    stream: String,
    replica: SharedReplica<S>,
    commands: CommandHandler,
    plugins: Arc<PluginRoutines>,
    current: Arc<CurrentRevision>,
    /// Highest revision this adjudicator appended.
    published: AtomicU64,
    config: AdjudicatorConfig,
}

impl<L, S> Adjudicator<L, S>
where
    L: EventLog,
    S: PolicyStore,
{
    pub fn new(
        log: L,
        config: &Config,
        replica: SharedReplica<S>,
        commands: CommandHandler,
        plugins: Arc<PluginRoutines>,
        current: Arc<CurrentRevision>,
    ) -> Self {
        Self {
            log,
            stream: config.stream.clone(),
            replica,
            commands,
            plugins,
            current,
            published: AtomicU64::new(0),
            config: config.adjudicator.clone(),
        }
    }

    /// Runs a mutating request and publishes the events it produced.
    ///
    /// The request may run several times, once per attempt, and must not have side effects other
    /// than those on the recorder it is given.
    pub async fn adjudicate<T, F>(&self, mut request: F) -> Result<Adjudicated<T>, AdjudicationError>
    where
        F: FnMut(&mut Recorder<'_, S>) -> Result<T, CommandError>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            // Validating before our own previous events are applied would only conflict.
            self.await_applied(self.published.load(Ordering::SeqCst)).await;

            let (value, events, expected) = self.execute(&mut request).await?;

            if events.is_empty() {
                trace!(revision = expected, "nothing to publish");
                return Ok(Adjudicated {
                    value,
                    events,
                    revision: expected,
                });
            }

            let records = events
                .iter()
                .map(|event| Ok(EventRecord::new(event.schema_name(), event.to_bytes()?)))
                .collect::<Result<Vec<_>, EncodeError>>()?;

            match self.log.append(&self.stream, expected, records).await {
                Ok(revision) => {
                    debug!(attempt, revision, count = events.len(), "published events");
                    self.published.fetch_max(revision, Ordering::SeqCst);

                    // The events are durable at this point, a slow replica does not fail the
                    // write.
                    self.await_applied(revision).await;

                    return Ok(Adjudicated {
                        value,
                        events,
                        revision,
                    });
                }
                Err(err) if err.is_conflict() => {
                    if attempt >= max_attempts {
                        warn!(attempt, %err, "give up after conflicting appends");
                        return Err(AdjudicationError::ConflictRetriesExhausted {
                            attempts: attempt,
                            source: err,
                        });
                    }

                    debug!(attempt, %err, "conflicting append, retry");
                    tokio::time::sleep(self.config.retry_interval).await;
                    attempt += 1;
                }
                Err(err) => return Err(AdjudicationError::EventLog(err)),
            }
        }
    }

    /// Runs a read-only request against the replica. Nothing is published or retried.
    pub async fn adjudicate_query<T, F>(&self, query: F) -> Result<T, AdjudicationError>
    where
        F: FnOnce(&S) -> Result<T, PolicyError>,
    {
        let replica = self.replica.lock().await;
        Ok(query(replica.store())?)
    }

    /// Executes one administrative command on behalf of `author`.
    pub async fn adjudicate_command(
        &self,
        author: &UserContext,
        command: &AdminCommand,
    ) -> Result<Adjudicated<CommandOutcome>, AdjudicationError> {
        self.adjudicate(|recorder| self.commands.execute(recorder, author, command))
            .await
    }

    /// Executes a batch of administrative commands on behalf of `author`, all or nothing.
    pub async fn adjudicate_commands(
        &self,
        author: &UserContext,
        commands: &[AdminCommand],
    ) -> Result<Adjudicated<Vec<CommandOutcome>>, AdjudicationError> {
        self.adjudicate(|recorder| self.commands.execute_batch(recorder, author, commands))
            .await
    }

    /// Waits for the local replica to apply `revision`, bounded by the apply timeout.
    async fn await_applied(&self, revision: Revision) {
        let applied = self
            .current
            .await_revision(revision, self.config.apply_timeout)
            .await;

        if !applied {
            warn!(
                revision,
                current = self.current.get(),
                "replica did not apply published events in time"
            );
        }
    }

    /// One attempt: runs the request in a fresh disposable context and returns its value, the
    /// recorded events and the revision the replica was at.
    async fn execute<T, F>(
        &self,
        request: &mut F,
    ) -> Result<(T, Vec<PolicyEvent>, Revision), AdjudicationError>
    where
        F: FnMut(&mut Recorder<'_, S>) -> Result<T, CommandError>,
    {
        let mut replica = self.replica.lock().await;
        let expected = replica.revision();

        let context = DisposableContext::new(replica.store_mut());
        let mut recorder = EventRecorder::new(context, self.plugins.clone());
        recorder.begin_tx()?;

        let result = request(&mut recorder);
        let (mut context, events) = recorder.into_parts();

        match result {
            Ok(value) => {
                context.commit_tx()?;
                Ok((value, events, expected))
            }
            Err(err) => {
                context.rollback_tx()?;
                Err(err.into())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AdjudicationError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Appending kept conflicting with other writers until no attempts were left.
    #[error("appending events kept conflicting, gave up after {attempts} attempts")]
    ConflictRetriesExhausted {
        attempts: u32,
        source: EventLogError,
    },

    #[error(transparent)]
    EventLog(EventLogError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl AdjudicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdjudicationError::Command(err) => err.kind(),
            AdjudicationError::ConflictRetriesExhausted { .. } => ErrorKind::Conflict,
            AdjudicationError::EventLog(_) | AdjudicationError::Encode(_) => ErrorKind::Internal,
        }
    }
}

impl From<PolicyError> for AdjudicationError {
    fn from(err: PolicyError) -> Self {
        AdjudicationError::Command(CommandError::Policy(err))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use ngac_core::{
        AdminCommand, CommandOutcome, NodeId, NodeKind, PolicyError, PolicyEvent, PolicyModifier,
        PolicyQuery, UserContext,
    };
    use ngac_log::{EventLog, EventLogError, EventRecord, MemoryEventLog};
    use ngac_store::{MemoryPolicyStore, PmlParser};
    use tokio::time::Instant;

    use crate::command::{CommandError, CommandHandler};
    use crate::config::{AdjudicatorConfig, Config};
    use crate::recorder::PluginRoutines;
    use crate::replica::{Replica, SharedReplica};
    use crate::revision::CurrentRevision;

    use super::{AdjudicationError, Adjudicator};

    type Fixture = (
        Adjudicator<MemoryEventLog, MemoryPolicyStore>,
        SharedReplica<MemoryPolicyStore>,
        Arc<CurrentRevision>,
    );

    /// Adjudicator without a subscriber, nothing ever gets applied to its replica.
    fn adjudicator(log: MemoryEventLog) -> Fixture {
        adjudicator_with(
            log,
            AdjudicatorConfig::new()
                .max_attempts(3)
                .retry_interval(Duration::from_millis(5))
                .apply_timeout(Duration::from_millis(20)),
        )
    }

    fn adjudicator_with(log: MemoryEventLog, adjudicator: AdjudicatorConfig) -> Fixture {
        let config = Config {
            adjudicator,
            ..Config::default()
        };
        let replica = Replica::new(MemoryPolicyStore::new()).shared();
        let current = Arc::new(CurrentRevision::new(0));

        let adjudicator = Adjudicator::new(
            log,
            &config,
            replica.clone(),
            CommandHandler::new(Arc::new(PmlParser::new())),
            Arc::new(PluginRoutines::new()),
            current.clone(),
        );

        (adjudicator, replica, current)
    }

    fn author() -> UserContext {
        UserContext::new(NodeId(0))
    }

    #[tokio::test]
    async fn publishes_events() {
        let log = MemoryEventLog::new();
        let (adjudicator, replica, current) = adjudicator(log.clone());

        let adjudicated = adjudicator
            .adjudicate_command(
                &author(),
                &AdminCommand::CreatePolicyClass { name: "pc1".into() },
            )
            .await
            .unwrap();

        assert_eq!(adjudicated.revision, 1);
        assert_eq!(adjudicated.events.len(), 1);
        assert_matches!(adjudicated.value, CommandOutcome::NodeCreated(_));
        assert_eq!(current.get(), 0);

        let recorded = log.read_from_start("policy", 10).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type, adjudicated.events[0].schema_name());

        // The writer's own replica only changes once the event is applied.
        let replica = replica.lock().await;
        assert_eq!(replica.revision(), 0);
        assert!(!replica.store().node_exists("pc1").unwrap());
        assert_eq!(replica.store().transaction_depth(), 0);
    }

    #[tokio::test]
    async fn batches_are_published_together() {
        let log = MemoryEventLog::new();
        let (adjudicator, _, _) = adjudicator(log.clone());

        let adjudicated = adjudicator
            .adjudicate(|recorder| {
                let pc = recorder.create_node(NodeKind::PolicyClass, "pc1", &[])?;
                let ua = recorder.create_node(NodeKind::UserAttribute, "ua1", &[pc])?;
                Ok((pc, ua))
            })
            .await
            .unwrap();

        let (pc, ua) = adjudicated.value;
        assert_eq!(adjudicated.revision, 2);
        assert_eq!(
            adjudicated.events,
            vec![
                PolicyEvent::node_created(NodeKind::PolicyClass, pc, "pc1", &[]),
                PolicyEvent::node_created(NodeKind::UserAttribute, ua, "ua1", &[pc]),
            ]
        );
        assert_eq!(log.tail("policy").await, 2);
    }

    #[tokio::test]
    async fn rejected_requests_publish_nothing() {
        let log = MemoryEventLog::new();
        let (adjudicator, replica, current) = adjudicator(log.clone());

        let result = adjudicator
            .adjudicate(|recorder| {
                recorder.create_node(NodeKind::PolicyClass, "pc1", &[])?;
                recorder.create_node(NodeKind::PolicyClass, "pc1", &[])?;
                Ok(())
            })
            .await;

        assert_matches!(
            result,
            Err(AdjudicationError::Command(CommandError::Policy(
                PolicyError::NodeNameExists(_)
            )))
        );
        assert_matches!(
            log.read_from_start("policy", 10).await,
            Err(EventLogError::StreamNotFound(_))
        );
        assert_eq!(current.get(), 0);
        assert_eq!(replica.lock().await.store().transaction_depth(), 0);
    }

    #[tokio::test]
    async fn requests_without_changes() {
        let log = MemoryEventLog::new();
        let (adjudicator, _, _) = adjudicator(log.clone());

        let adjudicated = adjudicator
            .adjudicate(|recorder| Ok(recorder.node_exists("pc1")?))
            .await
            .unwrap();

        assert!(!adjudicated.value);
        assert!(adjudicated.events.is_empty());
        assert_eq!(adjudicated.revision, 0);
        assert_eq!(log.tail("policy").await, 0);
    }

    #[tokio::test]
    async fn queries() {
        let (adjudicator, replica, _) = adjudicator(MemoryEventLog::new());
        replica
            .lock()
            .await
            .store_mut()
            .create_node(NodeKind::PolicyClass, "pc1", &[])
            .unwrap();

        let exists = adjudicator
            .adjudicate_query(|store| store.node_exists("pc1"))
            .await
            .unwrap();
        assert!(exists);

        assert_matches!(
            adjudicator
                .adjudicate_query(|store| store.node_id("missing"))
                .await,
            Err(AdjudicationError::Command(CommandError::Policy(
                PolicyError::UnknownNodeName(_)
            )))
        );
    }

    #[tokio::test]
    async fn stale_replica_exhausts_retries() {
        let log = MemoryEventLog::new();
        let foreign = PolicyEvent::node_created(NodeKind::PolicyClass, NodeId(7), "other", &[]);
        log.append(
            "policy",
            0,
            vec![EventRecord::new(
                foreign.schema_name(),
                foreign.to_bytes().unwrap(),
            )],
        )
        .await
        .unwrap();

        // Nothing applies the foreign event, every attempt is validated against revision 0.
        let (adjudicator, _, current) = adjudicator(log.clone());
        let result = adjudicator
            .adjudicate_command(
                &author(),
                &AdminCommand::CreatePolicyClass { name: "pc1".into() },
            )
            .await;

        assert_matches!(
            result,
            Err(AdjudicationError::ConflictRetriesExhausted {
                attempts: 3,
                source: EventLogError::Conflict {
                    expected: 0,
                    actual: 1,
                    ..
                }
            })
        );
        assert_eq!(log.tail("policy").await, 1);
        assert_eq!(current.get(), 0);
    }

    #[tokio::test]
    async fn waits_for_replica_to_apply() {
        let log = MemoryEventLog::new();
        let (adjudicator, _, current) = adjudicator_with(
            log,
            AdjudicatorConfig::new().apply_timeout(Duration::from_secs(2)),
        );

        tokio::spawn({
            let current = current.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                current.set(1);
            }
        });

        let started = Instant::now();
        let adjudicated = adjudicator
            .adjudicate_command(
                &author(),
                &AdminCommand::CreatePolicyClass { name: "pc1".into() },
            )
            .await
            .unwrap();

        assert_eq!(adjudicated.revision, 1);
        assert_eq!(current.get(), 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn slow_replica_does_not_fail_writes() {
        let log = MemoryEventLog::new();
        let (adjudicator, _, current) = adjudicator(log.clone());

        let started = Instant::now();
        let adjudicated = adjudicator
            .adjudicate_command(
                &author(),
                &AdminCommand::CreatePolicyClass { name: "pc1".into() },
            )
            .await
            .unwrap();

        assert_eq!(adjudicated.revision, 1);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(current.get(), 0);
        assert_eq!(log.tail("policy").await, 1);
    }
}
