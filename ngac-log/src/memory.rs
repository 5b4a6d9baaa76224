// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory event log implementation.
use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;

use ngac_core::Revision;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace, warn};

use crate::error::EventLogError;
use crate::record::{Delivery, EventRecord, NackAction, RecordedEvent};
use crate::traits::{EventLog, PersistentSubscription, TailSubscription};

type GroupKey = (String, String);

#[derive(Debug, Default)]
struct ConsumerGroup {
    /// Index of the next event to deliver.
    position: usize,

    /// Number of times the event at `position` was negatively acknowledged for a retry.
    retry_count: u32,

    /// Revisions of events the group gave up on.
    parked: Vec<Revision>,
}

#[derive(Debug, Default)]
struct State {
    streams: HashMap<String, Vec<RecordedEvent>>,
    groups: HashMap<GroupKey, ConsumerGroup>,

    /// Bumped when all subscriptions get cancelled, subscriptions of an older generation end.
    generation: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

/// An in-memory event log with consumer groups and tail subscriptions.
///
/// Cloned instances share the same streams, which makes it possible to hand one to a writer and
/// another to a replica.
#[derive(Clone, Debug, Default)]
pub struct MemoryEventLog {
    shared: Arc<Shared>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends all currently open subscriptions, as if the connection to the log was lost.
    pub async fn cancel_subscriptions(&self) {
        let mut state = self.shared.state.lock().await;
        state.generation += 1;
        debug!(generation = state.generation, "cancel all subscriptions");
        self.shared.notify.notify_waiters();
    }

    /// Revisions of events parked by a consumer group.
    pub async fn parked(&self, stream: &str, group: &str) -> Vec<Revision> {
        let state = self.shared.state.lock().await;
        state
            .groups
            .get(&(stream.to_owned(), group.to_owned()))
            .map(|group| group.parked.clone())
            .unwrap_or_default()
    }

    /// Revision of the latest event in a stream, `0` when it is empty.
    pub async fn tail(&self, stream: &str) -> Revision {
        let state = self.shared.state.lock().await;
        state
            .streams
            .get(stream)
            .map(|events| events.len() as Revision)
            .unwrap_or_default()
    }
}

impl EventLog for MemoryEventLog {
    type Subscription = MemorySubscription;

    type TailSubscription = MemoryTailSubscription;

    async fn append(
        &self,
        stream: &str,
        expected: Revision,
        records: Vec<EventRecord>,
    ) -> Result<Revision, EventLogError> {
        let mut state = self.shared.state.lock().await;

        let actual = state
            .streams
            .get(stream)
            .map(|events| events.len() as Revision)
            .unwrap_or_default();
        if actual != expected {
            return Err(EventLogError::Conflict {
                stream: stream.to_owned(),
                expected,
                actual,
            });
        }

        if records.is_empty() {
            return Ok(actual);
        }

        let events = state.streams.entry(stream.to_owned()).or_default();
        for record in records {
            let revision = events.len() as Revision + 1;
            trace!(%stream, revision, event_type = %record.event_type, "append event");
            events.push(RecordedEvent {
                stream: stream.to_owned(),
                revision,
                event_type: record.event_type,
                data: record.data,
            });
        }
        let revision = events.len() as Revision;

        self.shared.notify.notify_waiters();
        Ok(revision)
    }

    async fn read_from(
        &self,
        stream: &str,
        from: Revision,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventLogError> {
        let state = self.shared.state.lock().await;
        let events = existing_stream(&state, stream)?;

        let skip = from.saturating_sub(1) as usize;
        Ok(events.iter().skip(skip).take(max_count).cloned().collect())
    }

    async fn read_from_end(
        &self,
        stream: &str,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventLogError> {
        let state = self.shared.state.lock().await;
        let events = existing_stream(&state, stream)?;

        Ok(events.iter().rev().take(max_count).cloned().collect())
    }

    async fn create_consumer_group(&self, stream: &str, group: &str) -> Result<(), EventLogError> {
        let mut state = self.shared.state.lock().await;

        let key = (stream.to_owned(), group.to_owned());
        if state.groups.contains_key(&key) {
            return Err(EventLogError::ConsumerGroupExists {
                stream: stream.to_owned(),
                group: group.to_owned(),
            });
        }

        debug!(%stream, %group, "create consumer group");
        state.groups.insert(key, ConsumerGroup::default());
        Ok(())
    }

    async fn subscribe_durable(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<MemorySubscription, EventLogError> {
        let state = self.shared.state.lock().await;

        let key = (stream.to_owned(), group.to_owned());
        if !state.groups.contains_key(&key) {
            return Err(EventLogError::ConsumerGroupNotFound {
                stream: stream.to_owned(),
                group: group.to_owned(),
            });
        }

        Ok(MemorySubscription {
            shared: self.shared.clone(),
            key,
            generation: state.generation,
        })
    }

    async fn subscribe_from_tail(
        &self,
        stream: &str,
    ) -> Result<MemoryTailSubscription, EventLogError> {
        let state = self.shared.state.lock().await;

        let position = state
            .streams
            .get(stream)
            .map(|events| events.len())
            .unwrap_or_default();

        Ok(MemoryTailSubscription {
            shared: self.shared.clone(),
            stream: stream.to_owned(),
            position,
            generation: state.generation,
        })
    }
}

fn existing_stream<'a>(
    state: &'a State,
    stream: &str,
) -> Result<&'a Vec<RecordedEvent>, EventLogError> {
    state
        .streams
        .get(stream)
        .filter(|events| !events.is_empty())
        .ok_or_else(|| EventLogError::StreamNotFound(stream.to_owned()))
}

/// Membership in a consumer group of a [`MemoryEventLog`].
#[derive(Debug)]
pub struct MemorySubscription {
    shared: Arc<Shared>,
    key: GroupKey,
    generation: u64,
}

impl MemorySubscription {
    /// Looks up the consumer group, but only if the delivery is the one the group is currently
    /// waiting on. Stale acknowledgements return `None`.
    fn current_group<'a>(
        &self,
        state: &'a mut State,
        delivery: &Delivery,
    ) -> Result<Option<&'a mut ConsumerGroup>, EventLogError> {
        if state.generation != self.generation {
            return Err(EventLogError::SubscriptionCancelled);
        }

        let State {
            streams, groups, ..
        } = state;
        let group = groups
            .get_mut(&self.key)
            .ok_or_else(|| EventLogError::ConsumerGroupNotFound {
                stream: self.key.0.clone(),
                group: self.key.1.clone(),
            })?;

        let is_current = streams
            .get(&self.key.0)
            .and_then(|events| events.get(group.position))
            .is_some_and(|event| event.revision == delivery.revision());
        if !is_current {
            trace!(revision = delivery.revision(), "ignore stale acknowledgement");
            return Ok(None);
        }

        Ok(Some(group))
    }
}

impl PersistentSubscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<Delivery>, EventLogError> {
        loop {
            // Register for wake-ups before looking at the state, appends happening in between
            // will not get lost.
            let mut notified = pin!(self.shared.notify.notified());
            notified.as_mut().enable();

            {
                let state = self.shared.state.lock().await;
                if state.generation != self.generation {
                    return Ok(None);
                }

                let group = state.groups.get(&self.key).ok_or_else(|| {
                    EventLogError::ConsumerGroupNotFound {
                        stream: self.key.0.clone(),
                        group: self.key.1.clone(),
                    }
                })?;

                if let Some(event) = state
                    .streams
                    .get(&self.key.0)
                    .and_then(|events| events.get(group.position))
                {
                    return Ok(Some(Delivery {
                        event: event.clone(),
                        retry_count: group.retry_count,
                    }));
                }
            }

            notified.await;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), EventLogError> {
        let mut state = self.shared.state.lock().await;

        if let Some(group) = self.current_group(&mut state, delivery)? {
            group.position += 1;
            group.retry_count = 0;
        }

        Ok(())
    }

    async fn nack(
        &mut self,
        delivery: &Delivery,
        action: NackAction,
        reason: &str,
    ) -> Result<(), EventLogError> {
        let mut state = self.shared.state.lock().await;

        let Some(group) = self.current_group(&mut state, delivery)? else {
            return Ok(());
        };

        match action {
            NackAction::Retry => {
                debug!(revision = delivery.revision(), %reason, "retry delivery");
                group.retry_count += 1;
            }
            NackAction::Park => {
                warn!(revision = delivery.revision(), %reason, "park event");
                group.parked.push(delivery.revision());
                group.position += 1;
                group.retry_count = 0;
            }
        }

        Ok(())
    }
}

/// Subscription to the tail of a stream in a [`MemoryEventLog`].
#[derive(Debug)]
pub struct MemoryTailSubscription {
    shared: Arc<Shared>,
    stream: String,
    position: usize,
    generation: u64,
}

impl TailSubscription for MemoryTailSubscription {
    async fn next(&mut self) -> Result<Option<RecordedEvent>, EventLogError> {
        loop {
            let mut notified = pin!(self.shared.notify.notified());
            notified.as_mut().enable();

            {
                let state = self.shared.state.lock().await;
                if state.generation != self.generation {
                    return Ok(None);
                }

                if let Some(event) = state
                    .streams
                    .get(&self.stream)
                    .and_then(|events| events.get(self.position))
                {
                    self.position += 1;
                    return Ok(Some(event.clone()));
                }
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use crate::error::EventLogError;
    use crate::record::{EventRecord, NackAction};
    use crate::traits::{EventLog, PersistentSubscription, TailSubscription};

    use super::MemoryEventLog;

    fn record(event_type: &str) -> EventRecord {
        EventRecord::new(event_type, event_type.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn optimistic_append() {
        let log = MemoryEventLog::new();

        let revision = log
            .append("policy", 0, vec![record("a"), record("b")])
            .await
            .unwrap();
        assert_eq!(revision, 2);

        // Appending at an outdated revision fails and leaves the stream untouched.
        assert_matches!(
            log.append("policy", 1, vec![record("c")]).await,
            Err(EventLogError::Conflict {
                expected: 1,
                actual: 2,
                ..
            })
        );
        assert_eq!(log.tail("policy").await, 2);

        assert_eq!(log.append("policy", 2, vec![record("c")]).await, Ok(3));
    }

    #[tokio::test]
    async fn reading() {
        let log = MemoryEventLog::new();

        assert_matches!(
            log.read_from_end("policy", 1).await,
            Err(EventLogError::StreamNotFound(_))
        );

        log.append("policy", 0, vec![record("a"), record("b"), record("c")])
            .await
            .unwrap();

        let newest = log.read_from_end("policy", 2).await.unwrap();
        assert_eq!(
            newest.iter().map(|event| event.revision).collect::<Vec<_>>(),
            vec![3, 2]
        );

        let oldest = log.read_from_start("policy", 2).await.unwrap();
        assert_eq!(oldest[0].event_type, "a");
        assert_eq!(oldest[1].revision, 2);

        let page = log.read_from("policy", 3, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].data, b"c".to_vec());
    }

    #[tokio::test]
    async fn consumer_group() {
        let log = MemoryEventLog::new();
        log.append("policy", 0, vec![record("a"), record("b")])
            .await
            .unwrap();

        log.create_consumer_group("policy", "replica").await.unwrap();
        assert_matches!(
            log.create_consumer_group("policy", "replica").await,
            Err(EventLogError::ConsumerGroupExists { .. })
        );

        let mut subscription = log.subscribe_durable("policy", "replica").await.unwrap();

        // Retried events are delivered again with an increased retry count.
        let delivery = subscription.next().await.unwrap().unwrap();
        assert_eq!((delivery.revision(), delivery.retry_count), (1, 0));
        subscription
            .nack(&delivery, NackAction::Retry, "try again")
            .await
            .unwrap();

        let delivery = subscription.next().await.unwrap().unwrap();
        assert_eq!((delivery.revision(), delivery.retry_count), (1, 1));
        subscription.ack(&delivery).await.unwrap();

        // Acknowledging the same delivery twice has no effect.
        subscription.ack(&delivery).await.unwrap();

        let delivery = subscription.next().await.unwrap().unwrap();
        assert_eq!((delivery.revision(), delivery.retry_count), (2, 0));
        subscription
            .nack(&delivery, NackAction::Park, "broken")
            .await
            .unwrap();
        assert_eq!(log.parked("policy", "replica").await, vec![2]);

        // A new member of the group continues where the group stopped.
        let mut subscription = log.subscribe_durable("policy", "replica").await.unwrap();
        log.append("policy", 2, vec![record("c")]).await.unwrap();
        let delivery = subscription.next().await.unwrap().unwrap();
        assert_eq!(delivery.revision(), 3);
    }

    #[tokio::test]
    async fn subscription_waits_for_appends() {
        let log = MemoryEventLog::new();
        log.create_consumer_group("policy", "replica").await.unwrap();
        let mut subscription = log.subscribe_durable("policy", "replica").await.unwrap();

        let writer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append("policy", 0, vec![record("a")]).await.unwrap();
        });

        let delivery = tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .expect("delivery in time")
            .unwrap()
            .unwrap();
        assert_eq!(delivery.event.event_type, "a");
    }

    #[tokio::test]
    async fn tail_subscription() {
        let log = MemoryEventLog::new();
        log.append("policy", 0, vec![record("a")]).await.unwrap();

        // Events which existed before subscribing are not delivered.
        let mut tail = log.subscribe_from_tail("policy").await.unwrap();
        log.append("policy", 1, vec![record("b"), record("c")])
            .await
            .unwrap();

        assert_eq!(tail.next().await.unwrap().unwrap().revision, 2);
        assert_eq!(tail.next().await.unwrap().unwrap().revision, 3);
    }

    #[tokio::test]
    async fn cancel_subscriptions() {
        let log = MemoryEventLog::new();
        log.create_consumer_group("policy", "replica").await.unwrap();
        let mut subscription = log.subscribe_durable("policy", "replica").await.unwrap();
        let mut tail = log.subscribe_from_tail("policy").await.unwrap();

        let canceller = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel_subscriptions().await;
        });

        assert_eq!(subscription.next().await, Ok(None));
        assert_eq!(tail.next().await, Ok(None));

        // New subscriptions work again.
        let mut subscription = log.subscribe_durable("policy", "replica").await.unwrap();
        log.append("policy", 0, vec![record("a")]).await.unwrap();
        assert!(subscription.next().await.unwrap().is_some());
    }
}
