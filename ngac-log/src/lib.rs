// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg_attr(docsrs, feature(doc_cfg))]

//! Boundary to the append-only event log policy events are stored in.
//!
//! The log is organised in named streams of revision-numbered events. Writers append with an
//! expected revision (optimistic concurrency), readers either read pages of a stream, join a
//! durable consumer group with acknowledgements or follow the tail of a stream.
//!
//! [`MemoryEventLog`] implements the boundary in memory and is used for tests and single-process
//! deployments.
mod backoff;
mod error;
mod memory;
mod record;
mod traits;

pub use backoff::{Backoff, BackoffConfig};
pub use error::EventLogError;
pub use memory::{MemoryEventLog, MemorySubscription, MemoryTailSubscription};
pub use record::{Delivery, EventRecord, NackAction, RecordedEvent};
pub use traits::{EventLog, PersistentSubscription, TailSubscription};
