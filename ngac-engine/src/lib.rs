// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg_attr(docsrs, feature(doc_cfg))]

//! Event-sourced write path and bounded-staleness replicas for NGAC policy stores.
//!
//! Every replica holds a local Policy Store. Writes are never applied to it directly: the
//! [`Adjudicator`] validates them against a throw-away transaction, records the resulting
//! [`PolicyEvent`](ngac_core::PolicyEvent)s and appends them to a single event log stream with
//! optimistic concurrency. All replicas, the writing one included, apply the log in order through
//! their [`PolicyEventSubscriber`], which engages a [`Lockdown`] instead of ever applying an event
//! partially or out of order.
//!
//! Reads are served from the local store. The [`ConsistencyInterceptor`] holds them back until
//! the replica caught up with the latest revision of the log, bounded by a timeout.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use ngac_core::{AdminCommand, NodeId, PolicyQuery, UserContext};
//! use ngac_engine::{
//!     Adjudicator, CommandHandler, Config, CurrentRevision, Lockdown, PluginRoutines,
//!     PolicyEventHandler, PolicyEventSubscriber, Replica,
//! };
//! use ngac_log::MemoryEventLog;
//! use ngac_store::{MemoryPolicyStore, PmlParser};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let log = MemoryEventLog::new();
//! let config = Config::default();
//! let replica = Replica::new(MemoryPolicyStore::new()).shared();
//! let current = Arc::new(CurrentRevision::new(0));
//!
//! // Applies the log to the replica in the background.
//! let _subscriber = PolicyEventSubscriber::new(
//!     log.clone(),
//!     &config,
//!     replica.clone(),
//!     PolicyEventHandler::new(Arc::new(PmlParser::new())),
//!     current.clone(),
//!     Arc::new(Lockdown::new()),
//! )
//! .spawn();
//!
//! let adjudicator = Adjudicator::new(
//!     log,
//!     &config,
//!     replica,
//!     CommandHandler::new(Arc::new(PmlParser::new())),
//!     Arc::new(PluginRoutines::new()),
//!     current.clone(),
//! );
//!
//! let adjudicated = adjudicator
//!     .adjudicate_command(
//!         &UserContext::new(NodeId(0)),
//!         &AdminCommand::CreatePolicyClass { name: "pc1".into() },
//!     )
//!     .await?;
//! assert_eq!(adjudicated.revision, 1);
//!
//! // Once a write returns, the local replica has applied it.
//! assert_eq!(current.get(), 1);
//! assert!(adjudicator.adjudicate_query(|store| store.node_exists("pc1")).await?);
//! # Ok(())
//! # }
//! ```
pub mod adjudicator;
pub mod command;
pub mod config;
pub mod context;
mod error;
pub mod interceptor;
pub mod recorder;
pub mod replay;
pub mod replica;
pub mod revision;
pub mod status;
#[cfg(any(test, feature = "test_utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test_utils")))]
pub mod test_utils;

pub use adjudicator::{AdjudicationError, Adjudicated, Adjudicator, Recorder};
pub use command::{CommandError, CommandHandler};
pub use config::{
    AdjudicatorConfig, Config, ConsistencyConfig, EventLogConfig, SubscriberConfig,
};
pub use context::DisposableContext;
pub use error::ErrorKind;
pub use interceptor::{ConsistencyError, ConsistencyInterceptor};
pub use recorder::{EventRecorder, PluginRoutines};
pub use replay::{
    Lockdown, PolicyEventHandler, PolicyEventSubscriber, ReplayError, decode_event, replay_stream,
};
pub use replica::{Replica, SharedReplica};
pub use revision::{CurrentRevision, LatestRevision, LatestRevisionTracker, TrackerError};
pub use status::{Code, Status};
