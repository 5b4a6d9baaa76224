// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use ngac_core::{PolicyEvent, PolicyStore, Revision};
use tokio::sync::Mutex;
use tracing::trace;

use crate::replay::{PolicyEventHandler, ReplayError};

/// Replica shared between the adjudicator and the event subscriber of one process.
pub type SharedReplica<S> = Arc<Mutex<Replica<S>>>;

/// A Policy Store together with the revision of the last event applied to it.
///
/// Both are kept behind the same lock, so whoever looks at the store also knows exactly which
/// revision it reflects.
#[derive(Debug)]
pub struct Replica<S> {
    store: S,
    revision: Revision,
}

impl<S> Replica<S> {
    /// Replica of an empty stream.
    pub fn new(store: S) -> Self {
        Self { store, revision: 0 }
    }

    /// Replica whose store already reflects the stream up to the given revision.
    pub fn with_revision(store: S, revision: Revision) -> Self {
        Self { store, revision }
    }

    pub fn shared(self) -> SharedReplica<S> {
        Arc::new(Mutex::new(self))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Revision of the last applied event, `0` if none was applied yet.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S> Replica<S>
where
    S: PolicyStore,
{
    /// Applies one event inside a store transaction.
    ///
    /// On failure the transaction is rolled back, the store stays exactly as it was and the
    /// revision does not move.
    pub fn apply(
        &mut self,
        handler: &PolicyEventHandler,
        revision: Revision,
        event: &PolicyEvent,
    ) -> Result<(), ReplayError> {
        self.store.begin_tx()?;

        match handler.handle(&mut self.store, event) {
            Ok(()) => {
                self.store.commit_tx()?;
                self.revision = revision;
                trace!(revision, event_type = event.schema_name(), "applied event");
                Ok(())
            }
            Err(err) => {
                self.store.rollback_tx()?;
                Err(err)
            }
        }
    }
}
