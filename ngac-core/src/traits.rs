// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces of the Policy Store.
//!
//! Read and write access are separated: [`PolicyQuery`] answers questions about the current
//! graph, [`PolicyModifier`] mutates it. Wrappers like the event recorder or disposable
//! transaction contexts implement the same traits and forward to the concrete store they hold,
//! which allows stacking them in any order.
use crate::error::PolicyError;
use crate::graph::{AccessRightSet, Node, NodeId, NodeKind, Properties};
use crate::policy::{AdminOperation, AdminRoutine, Obligation, Prohibition, UserContext};

/// Read-only queries over the policy graph.
pub trait PolicyQuery {
    /// Returns the node with the given id.
    fn node(&self, id: NodeId) -> Result<Node, PolicyError>;

    /// Resolves a node name to its id.
    fn node_id(&self, name: &str) -> Result<NodeId, PolicyError>;

    fn node_exists(&self, name: &str) -> Result<bool, PolicyError>;

    /// Nodes the given node is directly assigned to.
    fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError>;

    /// Nodes directly assigned to the given node.
    fn ascendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError>;

    /// Associations with the given user attribute as source, as `(target, access rights)`.
    fn associations(&self, ua: NodeId) -> Result<Vec<(NodeId, AccessRightSet)>, PolicyError>;

    fn prohibition(&self, name: &str) -> Result<Option<Prohibition>, PolicyError>;

    fn obligation(&self, name: &str) -> Result<Option<Obligation>, PolicyError>;

    fn admin_operation(&self, name: &str) -> Result<Option<AdminOperation>, PolicyError>;

    fn admin_routine(&self, name: &str) -> Result<Option<AdminRoutine>, PolicyError>;

    fn resource_operations(&self) -> Result<AccessRightSet, PolicyError>;
}

/// Mutation primitives of the policy graph.
///
/// Every method either applies the full change or fails without changing anything.
pub trait PolicyModifier: PolicyQuery {
    /// Creates a node and assigns it to the given descendants. Returns the identifier the store
    /// assigned to the new node.
    fn create_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        descendants: &[NodeId],
    ) -> Result<NodeId, PolicyError>;

    fn delete_node(&mut self, id: NodeId) -> Result<(), PolicyError>;

    fn set_node_properties(
        &mut self,
        id: NodeId,
        properties: &Properties,
    ) -> Result<(), PolicyError>;

    fn assign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError>;

    fn deassign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError>;

    fn associate(
        &mut self,
        ua: NodeId,
        target: NodeId,
        access_rights: &AccessRightSet,
    ) -> Result<(), PolicyError>;

    fn dissociate(&mut self, ua: NodeId, target: NodeId) -> Result<(), PolicyError>;

    fn create_prohibition(&mut self, prohibition: &Prohibition) -> Result<(), PolicyError>;

    fn delete_prohibition(&mut self, name: &str) -> Result<(), PolicyError>;

    fn create_obligation(
        &mut self,
        author: &UserContext,
        name: &str,
        source: &str,
    ) -> Result<(), PolicyError>;

    fn delete_obligation(&mut self, name: &str) -> Result<(), PolicyError>;

    fn create_admin_operation(&mut self, operation: &AdminOperation) -> Result<(), PolicyError>;

    fn delete_admin_operation(&mut self, name: &str) -> Result<(), PolicyError>;

    fn set_resource_operations(&mut self, operations: &AccessRightSet) -> Result<(), PolicyError>;

    fn create_admin_routine(&mut self, routine: &AdminRoutine) -> Result<(), PolicyError>;

    fn delete_admin_routine(&mut self, name: &str) -> Result<(), PolicyError>;
}

/// Nested transactions.
///
/// Every `begin_tx` is closed by exactly one `commit_tx` or `rollback_tx`. Implementations decide
/// what closing an inner transaction means, the outermost one decides the fate of all changes.
pub trait Transactional {
    fn begin_tx(&mut self) -> Result<(), PolicyError>;

    fn commit_tx(&mut self) -> Result<(), PolicyError>;

    fn rollback_tx(&mut self) -> Result<(), PolicyError>;
}

/// A concrete Policy Store.
pub trait PolicyStore: PolicyModifier + Transactional {
    /// Creates a node with an already assigned identifier.
    ///
    /// Used when replaying events: replicas must end up with exactly the identifiers the writer
    /// assigned and never generate their own.
    fn insert_node(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        name: &str,
        descendants: &[NodeId],
    ) -> Result<(), PolicyError>;
}

impl<T> PolicyQuery for &mut T
where
    T: PolicyQuery + ?Sized,
{
    fn node(&self, id: NodeId) -> Result<Node, PolicyError> {
        (**self).node(id)
    }

    fn node_id(&self, name: &str) -> Result<NodeId, PolicyError> {
        (**self).node_id(name)
    }

    fn node_exists(&self, name: &str) -> Result<bool, PolicyError> {
        (**self).node_exists(name)
    }

    fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError> {
        (**self).descendants(id)
    }

    fn ascendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError> {
        (**self).ascendants(id)
    }

    fn associations(&self, ua: NodeId) -> Result<Vec<(NodeId, AccessRightSet)>, PolicyError> {
        (**self).associations(ua)
    }

    fn prohibition(&self, name: &str) -> Result<Option<Prohibition>, PolicyError> {
        (**self).prohibition(name)
    }

    fn obligation(&self, name: &str) -> Result<Option<Obligation>, PolicyError> {
        (**self).obligation(name)
    }

    fn admin_operation(&self, name: &str) -> Result<Option<AdminOperation>, PolicyError> {
        (**self).admin_operation(name)
    }

    fn admin_routine(&self, name: &str) -> Result<Option<AdminRoutine>, PolicyError> {
        (**self).admin_routine(name)
    }

    fn resource_operations(&self) -> Result<AccessRightSet, PolicyError> {
        (**self).resource_operations()
    }
}

impl<T> PolicyModifier for &mut T
where
    T: PolicyModifier + ?Sized,
{
    fn create_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        descendants: &[NodeId],
    ) -> Result<NodeId, PolicyError> {
        (**self).create_node(kind, name, descendants)
    }

    fn delete_node(&mut self, id: NodeId) -> Result<(), PolicyError> {
        (**self).delete_node(id)
    }

    fn set_node_properties(
        &mut self,
        id: NodeId,
        properties: &Properties,
    ) -> Result<(), PolicyError> {
        (**self).set_node_properties(id, properties)
    }

    fn assign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError> {
        (**self).assign(ascendant, descendants)
    }

    fn deassign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError> {
        (**self).deassign(ascendant, descendants)
    }

    fn associate(
        &mut self,
        ua: NodeId,
        target: NodeId,
        access_rights: &AccessRightSet,
    ) -> Result<(), PolicyError> {
        (**self).associate(ua, target, access_rights)
    }

    fn dissociate(&mut self, ua: NodeId, target: NodeId) -> Result<(), PolicyError> {
        (**self).dissociate(ua, target)
    }

    fn create_prohibition(&mut self, prohibition: &Prohibition) -> Result<(), PolicyError> {
        (**self).create_prohibition(prohibition)
    }

    fn delete_prohibition(&mut self, name: &str) -> Result<(), PolicyError> {
        (**self).delete_prohibition(name)
    }

    fn create_obligation(
        &mut self,
        author: &UserContext,
        name: &str,
        source: &str,
    ) -> Result<(), PolicyError> {
        (**self).create_obligation(author, name, source)
    }

    fn delete_obligation(&mut self, name: &str) -> Result<(), PolicyError> {
        (**self).delete_obligation(name)
    }

    fn create_admin_operation(&mut self, operation: &AdminOperation) -> Result<(), PolicyError> {
        (**self).create_admin_operation(operation)
    }

    fn delete_admin_operation(&mut self, name: &str) -> Result<(), PolicyError> {
        (**self).delete_admin_operation(name)
    }

    fn set_resource_operations(&mut self, operations: &AccessRightSet) -> Result<(), PolicyError> {
        (**self).set_resource_operations(operations)
    }

    fn create_admin_routine(&mut self, routine: &AdminRoutine) -> Result<(), PolicyError> {
        (**self).create_admin_routine(routine)
    }

    fn delete_admin_routine(&mut self, name: &str) -> Result<(), PolicyError> {
        (**self).delete_admin_routine(name)
    }
}

impl<T> Transactional for &mut T
where
    T: Transactional + ?Sized,
{
    fn begin_tx(&mut self) -> Result<(), PolicyError> {
        (**self).begin_tx()
    }

    fn commit_tx(&mut self) -> Result<(), PolicyError> {
        (**self).commit_tx()
    }

    fn rollback_tx(&mut self) -> Result<(), PolicyError> {
        (**self).rollback_tx()
    }
}
