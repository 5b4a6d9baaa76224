// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read side: keeping replicas in sync with the event log.
//!
//! [`PolicyEventHandler`] applies single events to a Policy Store. [`PolicyEventSubscriber`]
//! feeds it from a durable subscription, one event at a time and in log order, and engages the
//! [`Lockdown`] when an event can not be applied. [`replay_stream`] rebuilds a replica from the
//! beginning of the stream without a subscription.
mod handler;
mod subscriber;

use ngac_core::cbor::DecodeError;
use ngac_core::{PolicyError, PolicyEvent, PolicyStore, Revision, StatementKind};
use ngac_log::{EventLog, EventLogError, RecordedEvent};
use thiserror::Error;
use tracing::debug;

use crate::error::ErrorKind;
use crate::replica::Replica;

pub use handler::PolicyEventHandler;
pub use subscriber::{Lockdown, PolicyEventSubscriber};

/// Number of events read at once when replaying a whole stream.
const REPLAY_PAGE_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("source of {kind} \"{name}\" does not compile to this single declaration")]
    InvalidSource { kind: StatementKind, name: String },

    #[error(transparent)]
    EventLog(#[from] EventLogError),
}

impl ReplayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplayError::EventLog(_) => ErrorKind::Internal,
            _ => ErrorKind::ReplayFailure,
        }
    }
}

/// Decodes the policy event carried by a record.
pub fn decode_event(record: &RecordedEvent) -> Result<PolicyEvent, DecodeError> {
    PolicyEvent::from_bytes(&record.event_type, &record.data)
}

/// Applies all events of a stream the replica has not seen yet.
///
/// Reads the stream page by page, starting after the replica's revision. Returns the revision the
/// replica reached. A stream which does not exist yet leaves the replica untouched.
pub async fn replay_stream<L, S>(
    log: &L,
    stream: &str,
    handler: &PolicyEventHandler,
    replica: &mut Replica<S>,
) -> Result<Revision, ReplayError>
where
    L: EventLog,
    S: PolicyStore,
{
    loop {
        let from = replica.revision() + 1;
        let events = match log.read_from(stream, from, REPLAY_PAGE_SIZE).await {
            Ok(events) => events,
            Err(EventLogError::StreamNotFound(_)) => break,
            Err(err) => return Err(err.into()),
        };

        if events.is_empty() {
            break;
        }

        debug!(from, count = events.len(), "replay events");
        for record in events {
            let event = decode_event(&record)?;
            replica.apply(handler, record.revision, &event)?;
        }
    }

    Ok(replica.revision())
}
