// SPDX-License-Identifier: MIT OR Apache-2.0

use ngac_core::{
    AccessRightSet, AdminOperation, AdminRoutine, Node, NodeId, NodeKind, Obligation,
    PolicyError, PolicyModifier, PolicyQuery, Prohibition, Properties, Transactional,
    UserContext,
};
use tracing::{trace, warn};

/// Scratch transaction over a shared Policy Store which never commits.
///
/// The store is only used to validate mutations and to learn the identifiers it assigns, the
/// durable effect of a write are the events recorded on top of this context. Closing the
/// outermost transaction, no matter if through `commit_tx` or `rollback_tx`, rolls the store
/// back. Nested transactions are counted and only open a real transaction on the first level.
#[derive(Debug)]
pub struct DisposableContext<'s, S>
where
    S: Transactional,
{
    store: &'s mut S,
    depth: usize,
}

impl<'s, S> DisposableContext<'s, S>
where
    S: Transactional,
{
    pub fn new(store: &'s mut S) -> Self {
        Self { store, depth: 0 }
    }

    /// Number of currently open (nested) transactions.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn close(&mut self) -> Result<(), PolicyError> {
        if self.depth == 0 {
            return Err(PolicyError::NoTransaction);
        }

        self.depth -= 1;
        if self.depth == 0 {
            trace!("discard disposable transaction");
            self.store.rollback_tx()?;
        }

        Ok(())
    }
}

impl<S> Transactional for DisposableContext<'_, S>
where
    S: Transactional,
{
    fn begin_tx(&mut self) -> Result<(), PolicyError> {
        if self.depth == 0 {
            self.store.begin_tx()?;
        }
        self.depth += 1;
        Ok(())
    }

    fn commit_tx(&mut self) -> Result<(), PolicyError> {
        self.close()
    }

    fn rollback_tx(&mut self) -> Result<(), PolicyError> {
        self.close()
    }
}

impl<S> Drop for DisposableContext<'_, S>
where
    S: Transactional,
{
    fn drop(&mut self) {
        if self.depth > 0 {
            self.depth = 0;
            if let Err(err) = self.store.rollback_tx() {
                warn!(%err, "could not discard disposable transaction");
            }
        }
    }
}

impl<S> PolicyQuery for DisposableContext<'_, S>
where
    S: PolicyQuery + Transactional,
{
    fn node(&self, id: NodeId) -> Result<Node, PolicyError> {
        self.store.node(id)
    }

    fn node_id(&self, name: &str) -> Result<NodeId, PolicyError> {
        self.store.node_id(name)
    }

    fn node_exists(&self, name: &str) -> Result<bool, PolicyError> {
        self.store.node_exists(name)
    }

    fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError> {
        self.store.descendants(id)
    }

    fn ascendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError> {
        self.store.ascendants(id)
    }

    fn associations(&self, ua: NodeId) -> Result<Vec<(NodeId, AccessRightSet)>, PolicyError> {
        self.store.associations(ua)
    }

    fn prohibition(&self, name: &str) -> Result<Option<Prohibition>, PolicyError> {
        self.store.prohibition(name)
    }

    fn obligation(&self, name: &str) -> Result<Option<Obligation>, PolicyError> {
        self.store.obligation(name)
    }

    fn admin_operation(&self, name: &str) -> Result<Option<AdminOperation>, PolicyError> {
        self.store.admin_operation(name)
    }

    fn admin_routine(&self, name: &str) -> Result<Option<AdminRoutine>, PolicyError> {
        self.store.admin_routine(name)
    }

    fn resource_operations(&self) -> Result<AccessRightSet, PolicyError> {
        self.store.resource_operations()
    }
}

impl<S> PolicyModifier for DisposableContext<'_, S>
where
    S: PolicyModifier + Transactional,
{
    fn create_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        descendants: &[NodeId],
    ) -> Result<NodeId, PolicyError> {
        self.store.create_node(kind, name, descendants)
    }

    fn delete_node(&mut self, id: NodeId) -> Result<(), PolicyError> {
        self.store.delete_node(id)
    }

    fn set_node_properties(
        &mut self,
        id: NodeId,
        properties: &Properties,
    ) -> Result<(), PolicyError> {
        self.store.set_node_properties(id, properties)
    }

    fn assign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError> {
        self.store.assign(ascendant, descendants)
    }

    fn deassign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError> {
        self.store.deassign(ascendant, descendants)
    }

    fn associate(
        &mut self,
        ua: NodeId,
        target: NodeId,
        access_rights: &AccessRightSet,
    ) -> Result<(), PolicyError> {
        self.store.associate(ua, target, access_rights)
    }

    fn dissociate(&mut self, ua: NodeId, target: NodeId) -> Result<(), PolicyError> {
        self.store.dissociate(ua, target)
    }

    fn create_prohibition(&mut self, prohibition: &Prohibition) -> Result<(), PolicyError> {
        self.store.create_prohibition(prohibition)
    }

    fn delete_prohibition(&mut self, name: &str) -> Result<(), PolicyError> {
        self.store.delete_prohibition(name)
    }

    fn create_obligation(
        &mut self,
        author: &UserContext,
        name: &str,
        source: &str,
    ) -> Result<(), PolicyError> {
        self.store.create_obligation(author, name, source)
    }

    fn delete_obligation(&mut self, name: &str) -> Result<(), PolicyError> {
        self.store.delete_obligation(name)
    }

    fn create_admin_operation(&mut self, operation: &AdminOperation) -> Result<(), PolicyError> {
        self.store.create_admin_operation(operation)
    }

    fn delete_admin_operation(&mut self, name: &str) -> Result<(), PolicyError> {
        self.store.delete_admin_operation(name)
    }

    fn set_resource_operations(&mut self, operations: &AccessRightSet) -> Result<(), PolicyError> {
        self.store.set_resource_operations(operations)
    }

    fn create_admin_routine(&mut self, routine: &AdminRoutine) -> Result<(), PolicyError> {
        self.store.create_admin_routine(routine)
    }

    fn delete_admin_routine(&mut self, name: &str) -> Result<(), PolicyError> {
        self.store.delete_admin_routine(name)
    }
}
