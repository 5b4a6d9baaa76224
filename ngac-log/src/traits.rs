// SPDX-License-Identifier: MIT OR Apache-2.0

use std::future::Future;

use ngac_core::Revision;

use crate::error::EventLogError;
use crate::record::{Delivery, EventRecord, NackAction, RecordedEvent};

/// Append-only, revision-numbered event log organised in streams.
pub trait EventLog: Send + Sync {
    type Subscription: PersistentSubscription;

    type TailSubscription: TailSubscription;

    /// Appends all records atomically, but only if the stream is still at the `expected`
    /// revision (`0` for a stream without events).
    ///
    /// Returns the revision of the last appended record.
    fn append(
        &self,
        stream: &str,
        expected: Revision,
        records: Vec<EventRecord>,
    ) -> impl Future<Output = Result<Revision, EventLogError>> + Send;

    /// Reads up to `max_count` events in log order, starting at revision `from`.
    fn read_from(
        &self,
        stream: &str,
        from: Revision,
        max_count: usize,
    ) -> impl Future<Output = Result<Vec<RecordedEvent>, EventLogError>> + Send;

    /// Reads up to `max_count` events from the beginning of the stream.
    fn read_from_start(
        &self,
        stream: &str,
        max_count: usize,
    ) -> impl Future<Output = Result<Vec<RecordedEvent>, EventLogError>> + Send {
        self.read_from(stream, 1, max_count)
    }

    /// Reads up to `max_count` events backwards from the end of the stream, newest first.
    fn read_from_end(
        &self,
        stream: &str,
        max_count: usize,
    ) -> impl Future<Output = Result<Vec<RecordedEvent>, EventLogError>> + Send;

    /// Creates a consumer group which starts consuming at the beginning of the stream.
    fn create_consumer_group(
        &self,
        stream: &str,
        group: &str,
    ) -> impl Future<Output = Result<(), EventLogError>> + Send;

    /// Joins a consumer group and receives its events until the subscription gets cancelled.
    fn subscribe_durable(
        &self,
        stream: &str,
        group: &str,
    ) -> impl Future<Output = Result<Self::Subscription, EventLogError>> + Send;

    /// Receives every event appended after subscribing.
    fn subscribe_from_tail(
        &self,
        stream: &str,
    ) -> impl Future<Output = Result<Self::TailSubscription, EventLogError>> + Send;
}

/// Subscription to a consumer group, delivering events at-least-once and in log order.
pub trait PersistentSubscription: Send {
    /// Waits for the next delivery. Returns `None` when the subscription was cancelled.
    fn next(&mut self) -> impl Future<Output = Result<Option<Delivery>, EventLogError>> + Send;

    /// Marks a delivery as processed.
    fn ack(&mut self, delivery: &Delivery) -> impl Future<Output = Result<(), EventLogError>> + Send;

    /// Rejects a delivery, either to receive it again or to park it.
    fn nack(
        &mut self,
        delivery: &Delivery,
        action: NackAction,
        reason: &str,
    ) -> impl Future<Output = Result<(), EventLogError>> + Send;
}

/// Subscription to everything appended to a stream from now on.
pub trait TailSubscription: Send {
    /// Waits for the next event. Returns `None` when the subscription was cancelled.
    fn next(&mut self) -> impl Future<Output = Result<Option<RecordedEvent>, EventLogError>> + Send;
}
