// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ngac_core::{PolicyStore, Revision};
use ngac_log::{
    Backoff, Delivery, EventLog, EventLogError, NackAction, PersistentSubscription,
};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, trace, warn};

use crate::config::{Config, SubscriberConfig};
use crate::replay::{PolicyEventHandler, ReplayError, decode_event};
use crate::replica::SharedReplica;
use crate::revision::CurrentRevision;

/// Fail-safe flag halting event application after an event could not be applied.
///
/// Once engaged the replica keeps serving its last consistent state instead of applying events
/// on top of a state which already diverged from the log. Only an operator can lift it, by
/// restarting the replica after fixing the cause.
#[derive(Debug, Default)]
pub struct Lockdown {
    engaged: AtomicBool,
}

impl Lockdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engages the lockdown. Returns `false` if it was engaged already.
    pub fn engage(&self, revision: Revision, reason: &str) -> bool {
        let engaged = !self.engaged.swap(true, Ordering::SeqCst);
        if engaged {
            error!(revision, %reason, "replica locked down, no further events will be applied");
        }
        engaged
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }
}

/// Keeps a replica in sync by consuming a durable subscription to the policy stream.
///
/// Deliveries are handled one at a time. Applied events are acknowledged and advance the current
/// revision, events already reflected by the replica are acknowledged without applying them
/// again. An event failing to apply is retried for the configured number of redeliveries, after
/// that it gets parked and the [`Lockdown`] engaged.
#[derive(Debug)]
pub struct PolicyEventSubscriber<L, S> {
    log: L,
    stream: String,
    group: String,
    replica: SharedReplica<S>,
    handler: PolicyEventHandler,
    current: Arc<CurrentRevision>,
    lockdown: Arc<Lockdown>,
    config: SubscriberConfig,
}

impl<L, S> PolicyEventSubscriber<L, S>
where
    L: EventLog,
    S: PolicyStore,
{
    pub fn new(
        log: L,
        config: &Config,
        replica: SharedReplica<S>,
        handler: PolicyEventHandler,
        current: Arc<CurrentRevision>,
        lockdown: Arc<Lockdown>,
    ) -> Self {
        Self {
            log,
            stream: config.stream.clone(),
            group: config.consumer_group.clone(),
            replica,
            handler,
            current,
            lockdown,
            config: config.subscriber.clone(),
        }
    }

    pub fn lockdown(&self) -> &Arc<Lockdown> {
        &self.lockdown
    }

    /// Consumes events until the lockdown is engaged.
    ///
    /// Lost subscriptions are re-established with an exponential backoff, without any limit on
    /// the number of attempts.
    pub async fn run(&self) {
        let mut backoff = Backoff::from_config(self.config.backoff.clone());

        while !self.lockdown.is_engaged() {
            match self.subscribe().await {
                Ok(mut subscription) => {
                    debug!(stream = %self.stream, group = %self.group, "subscribed to policy events");
                    backoff.reset();

                    match self.consume(&mut subscription).await {
                        Ok(()) => debug!("policy event subscription ended"),
                        Err(err) => warn!(%err, "policy event subscription failed"),
                    }
                }
                Err(err) => warn!(%err, "could not subscribe to policy events"),
            }

            if self.lockdown.is_engaged() {
                break;
            }

            backoff.sleep().await;
            backoff.increment();
        }

        warn!("replica is locked down, stop consuming policy events");
    }

    /// Makes sure the consumer group exists and joins it.
    pub async fn subscribe(&self) -> Result<L::Subscription, EventLogError> {
        match self
            .log
            .create_consumer_group(&self.stream, &self.group)
            .await
        {
            Ok(()) | Err(EventLogError::ConsumerGroupExists { .. }) => (),
            Err(err) => return Err(err),
        }

        self.log.subscribe_durable(&self.stream, &self.group).await
    }

    /// Handles deliveries until the subscription ends or the lockdown gets engaged.
    pub async fn consume(&self, subscription: &mut L::Subscription) -> Result<(), ReplayError> {
        while !self.lockdown.is_engaged() {
            let Some(delivery) = subscription.next().await? else {
                return Ok(());
            };

            if self.lockdown.is_engaged() {
                debug!(revision = delivery.revision(), "ignore delivery during lockdown");
                break;
            }

            self.process(subscription, &delivery).await?;
        }

        Ok(())
    }

    async fn process(
        &self,
        subscription: &mut L::Subscription,
        delivery: &Delivery,
    ) -> Result<(), ReplayError> {
        let revision = delivery.revision();

        match self.apply(delivery).await {
            Ok(()) => {
                subscription.ack(delivery).await?;
                self.current.set(revision);
            }
            Err(err) if delivery.retry_count < self.config.max_redeliveries => {
                warn!(
                    revision,
                    retry_count = delivery.retry_count,
                    %err,
                    "could not apply event, retry"
                );
                subscription
                    .nack(delivery, NackAction::Retry, &err.to_string())
                    .await?;
            }
            Err(err) => {
                let reason = err.to_string();
                self.lockdown.engage(revision, &reason);
                subscription
                    .nack(delivery, NackAction::Park, &reason)
                    .await?;
            }
        }

        Ok(())
    }

    /// Applies the delivered event unless the replica already reflects it.
    async fn apply(&self, delivery: &Delivery) -> Result<(), ReplayError> {
        let revision = delivery.revision();
        let mut replica = self.replica.lock().await;

        if revision <= replica.revision() {
            trace!(revision, "skip event already applied");
            return Ok(());
        }

        let event = decode_event(&delivery.event)?;
        replica.apply(&self.handler, revision, &event)
    }
}

impl<L, S> PolicyEventSubscriber<L, S>
where
    L: EventLog + 'static,
    L::Subscription: 'static,
    S: PolicyStore + Send + 'static,
{
    /// Runs the subscriber in a background task which is aborted when the handle gets dropped.
    pub fn spawn(self) -> AbortOnDropHandle<()> {
        AbortOnDropHandle::new(tokio::spawn(async move { self.run().await }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use ngac_core::{NodeId, NodeKind, PolicyEvent, PolicyQuery, Revision};
    use ngac_log::{
        Delivery, EventLog, EventLogError, EventRecord, MemoryEventLog, MemorySubscription,
        NackAction, PersistentSubscription, RecordedEvent,
    };
    use ngac_store::MemoryPolicyStore;
    use tokio::time::Instant;

    use crate::config::Config;
    use crate::replay::PolicyEventHandler;
    use crate::replica::Replica;
    use crate::revision::CurrentRevision;
    use crate::test_utils::{compiler, setup_logging};

    use super::{Lockdown, PolicyEventSubscriber};

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Outcome {
        Delivered(Revision, u32),
        Acked(Revision),
        Nacked(Revision, NackAction),
    }

    /// Memory log whose durable subscriptions keep a journal of what happened to each delivery.
    #[derive(Clone, Debug, Default)]
    struct JournalingLog {
        inner: MemoryEventLog,
        journal: Arc<Mutex<Vec<Outcome>>>,
    }

    impl JournalingLog {
        fn journal(&self) -> Vec<Outcome> {
            self.journal.lock().unwrap().clone()
        }
    }

    struct JournalingSubscription {
        inner: MemorySubscription,
        journal: Arc<Mutex<Vec<Outcome>>>,
    }

    impl PersistentSubscription for JournalingSubscription {
        async fn next(&mut self) -> Result<Option<Delivery>, EventLogError> {
            let delivery = self.inner.next().await?;
            if let Some(delivery) = &delivery {
                self.journal
                    .lock()
                    .unwrap()
                    .push(Outcome::Delivered(delivery.revision(), delivery.retry_count));
            }
            Ok(delivery)
        }

        async fn ack(&mut self, delivery: &Delivery) -> Result<(), EventLogError> {
            self.journal
                .lock()
                .unwrap()
                .push(Outcome::Acked(delivery.revision()));
            self.inner.ack(delivery).await
        }

        async fn nack(
            &mut self,
            delivery: &Delivery,
            action: NackAction,
            reason: &str,
        ) -> Result<(), EventLogError> {
            self.journal
                .lock()
                .unwrap()
                .push(Outcome::Nacked(delivery.revision(), action));
            self.inner.nack(delivery, action, reason).await
        }
    }

    impl EventLog for JournalingLog {
        type Subscription = JournalingSubscription;

        type TailSubscription = <MemoryEventLog as EventLog>::TailSubscription;

        async fn append(
            &self,
            stream: &str,
            expected: Revision,
            records: Vec<EventRecord>,
        ) -> Result<Revision, EventLogError> {
            self.inner.append(stream, expected, records).await
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

        async fn create_consumer_group(
            &self,
            stream: &str,
            group: &str,
        ) -> Result<(), EventLogError> {
            self.inner.create_consumer_group(stream, group).await
        }

        async fn subscribe_durable(
            &self,
            stream: &str,
            group: &str,
        ) -> Result<Self::Subscription, EventLogError> {
            Ok(JournalingSubscription {
                inner: self.inner.subscribe_durable(stream, group).await?,
                journal: self.journal.clone(),
            })
        }

        async fn subscribe_from_tail(
            &self,
            stream: &str,
        ) -> Result<Self::TailSubscription, EventLogError> {
            self.inner.subscribe_from_tail(stream).await
        }
    }

    fn record(event: &PolicyEvent) -> EventRecord {
        EventRecord::new(event.schema_name(), event.to_bytes().unwrap())
    }

    fn subscriber(
        log: &JournalingLog,
        config: &Config,
    ) -> PolicyEventSubscriber<JournalingLog, MemoryPolicyStore> {
        PolicyEventSubscriber::new(
            log.clone(),
            config,
            Replica::new(MemoryPolicyStore::new()).shared(),
            PolicyEventHandler::new(compiler()),
            Arc::new(CurrentRevision::new(0)),
            Arc::new(Lockdown::new()),
        )
    }

    #[tokio::test]
    async fn applied_events_are_acknowledged() {
        setup_logging();

        let log = JournalingLog::default();
        log.append(
            "policy",
            0,
            vec![
                record(&PolicyEvent::node_created(
                    NodeKind::PolicyClass,
                    NodeId(1),
                    "pc1",
                    &[],
                )),
                record(&PolicyEvent::node_created(
                    NodeKind::PolicyClass,
                    NodeId(2),
                    "pc2",
                    &[],
                )),
            ],
        )
        .await
        .unwrap();

        let subscriber = subscriber(&log, &Config::default());
        let mut subscription = subscriber.subscribe().await.unwrap();

        // Two deliveries, then cancel so consuming ends.
        let consumed = tokio::spawn(async move {
            let result = subscriber.consume(&mut subscription).await;
            (subscriber, result)
        });
        let deadline = Instant::now() + Duration::from_secs(2);
        while log.journal().len() < 4 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        log.inner.cancel_subscriptions().await;

        let (subscriber, result) = consumed.await.unwrap();
        assert!(result.is_ok());
        assert!(!subscriber.lockdown().is_engaged());
        assert_eq!(subscriber.current.get(), 2);
        assert_eq!(
            log.journal(),
            vec![
                Outcome::Delivered(1, 0),
                Outcome::Acked(1),
                Outcome::Delivered(2, 0),
                Outcome::Acked(2),
            ]
        );
    }

    #[tokio::test]
    async fn poison_event_is_redelivered_three_times_then_parked() {
        setup_logging();

        let log = JournalingLog::default();
        log.append(
            "policy",
            0,
            vec![
                // Deleting an unknown node can never be applied.
                record(&PolicyEvent::NodeDeleted { id: NodeId(99) }),
                record(&PolicyEvent::node_created(
                    NodeKind::PolicyClass,
                    NodeId(1),
                    "pc1",
                    &[],
                )),
            ],
        )
        .await
        .unwrap();

        let config = Config::default();
        assert_eq!(config.subscriber.max_redeliveries, 3);
        let subscriber = subscriber(&log, &config);
        let mut subscription = subscriber.subscribe().await.unwrap();

        // Returns by itself once the lockdown is engaged.
        subscriber.consume(&mut subscription).await.unwrap();

        assert_eq!(
            log.journal(),
            vec![
                Outcome::Delivered(1, 0),
                Outcome::Nacked(1, NackAction::Retry),
                Outcome::Delivered(1, 1),
                Outcome::Nacked(1, NackAction::Retry),
                Outcome::Delivered(1, 2),
                Outcome::Nacked(1, NackAction::Retry),
                Outcome::Delivered(1, 3),
                Outcome::Nacked(1, NackAction::Park),
            ]
        );
        assert!(subscriber.lockdown().is_engaged());
        assert_eq!(
            log.inner.parked(&config.stream, &config.consumer_group).await,
            vec![1]
        );

        // The event after the parked one is not applied.
        assert_eq!(subscriber.current.get(), 0);
        let replica = subscriber.replica.lock().await;
        assert_eq!(replica.revision(), 0);
        assert!(!replica.store().node_exists("pc1").unwrap());
    }
}
