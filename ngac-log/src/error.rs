// SPDX-License-Identifier: MIT OR Apache-2.0

use ngac_core::Revision;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EventLogError {
    /// Optimistic append failed as the stream moved on since the expected revision.
    #[error("expected stream \"{stream}\" at revision {expected} but it is at {actual}")]
    Conflict {
        stream: String,
        expected: Revision,
        actual: Revision,
    },

    #[error("stream \"{0}\" not found")]
    StreamNotFound(String),

    #[error("consumer group \"{group}\" already exists on stream \"{stream}\"")]
    ConsumerGroupExists { stream: String, group: String },

    #[error("consumer group \"{group}\" does not exist on stream \"{stream}\"")]
    ConsumerGroupNotFound { stream: String, group: String },

    /// Subscription was dropped by the event log, for example because the connection was lost.
    #[error("subscription cancelled")]
    SubscriptionCancelled,

    #[error("event log unavailable: {0}")]
    Unavailable(String),
}

impl EventLogError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, EventLogError::Conflict { .. })
    }
}
