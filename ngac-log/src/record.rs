// SPDX-License-Identifier: MIT OR Apache-2.0

use ngac_core::Revision;

/// Event to be appended to a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    /// Schema name of the event, for example `PolicyClassCreated`.
    pub event_type: String,

    /// Encoded event.
    pub data: Vec<u8>,
}

impl EventRecord {
    pub fn new(event_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// Event as it was stored in a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    pub stream: String,
    pub revision: Revision,
    pub event_type: String,
    pub data: Vec<u8>,
}

/// Event handed out by a persistent subscription.
///
/// Each delivery needs to be acknowledged or negatively acknowledged before the consumer group
/// moves on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub event: RecordedEvent,

    /// How often this event was delivered to the consumer group before.
    pub retry_count: u32,
}

impl Delivery {
    pub fn revision(&self) -> Revision {
        self.event.revision
    }
}

/// What the event log should do with a negatively acknowledged delivery.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NackAction {
    /// Deliver the same event again.
    Retry,

    /// Give up on the event: it is set aside and the consumer group moves on.
    Park,
}
