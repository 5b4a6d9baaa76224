// SPDX-License-Identifier: MIT OR Apache-2.0

//! Policy modifier wrapper recording one event per successful mutation.
//!
//! Every mutation is forwarded to the wrapped modifier first, so identifiers it assigns are known
//! when the event gets built. Failed mutations propagate unchanged and record nothing.
use std::collections::BTreeSet;
use std::sync::Arc;

use ngac_core::{
    AccessRightSet, AdminOperation, AdminRoutine, Definition, Node, NodeId, NodeKind, Obligation,
    PolicyError, PolicyEvent, PolicyModifier, PolicyQuery, Prohibition, Properties,
    Transactional, UserContext,
};
use tracing::trace;

/// Names of routines provided by plugins.
///
/// Plugins register their routines on every process themselves. These routines are therefore not
/// part of the replicated log: creating one records no event and deleting one is rejected.
#[derive(Clone, Debug, Default)]
pub struct PluginRoutines {
    names: BTreeSet<String>,
}

impl PluginRoutines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

impl<S: Into<String>> FromIterator<S> for PluginRoutines {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Records a [`PolicyEvent`] for every mutation applied through it.
#[derive(Debug)]
pub struct EventRecorder<M> {
    inner: M,
    events: Vec<PolicyEvent>,
    plugins: Arc<PluginRoutines>,
}

impl<M> EventRecorder<M> {
    pub fn new(inner: M, plugins: Arc<PluginRoutines>) -> Self {
        Self {
            inner,
            events: Vec::new(),
            plugins,
        }
    }

    /// Events recorded so far, in the order the mutations were applied.
    pub fn events(&self) -> &[PolicyEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<PolicyEvent> {
        self.events
    }

    /// Returns the wrapped modifier together with the recorded events.
    pub fn into_parts(self) -> (M, Vec<PolicyEvent>) {
        (self.inner, self.events)
    }

    fn record(&mut self, event: PolicyEvent) {
        trace!(event_type = event.schema_name(), "record event");
        self.events.push(event);
    }
}

impl<M> PolicyQuery for EventRecorder<M>
where
    M: PolicyQuery,
{
    fn node(&self, id: NodeId) -> Result<Node, PolicyError> {
        self.inner.node(id)
    }

    fn node_id(&self, name: &str) -> Result<NodeId, PolicyError> {
        self.inner.node_id(name)
    }

    fn node_exists(&self, name: &str) -> Result<bool, PolicyError> {
        self.inner.node_exists(name)
    }

    fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError> {
        self.inner.descendants(id)
    }

    fn ascendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError> {
        self.inner.ascendants(id)
    }

    fn associations(&self, ua: NodeId) -> Result<Vec<(NodeId, AccessRightSet)>, PolicyError> {
        self.inner.associations(ua)
    }

    fn prohibition(&self, name: &str) -> Result<Option<Prohibition>, PolicyError> {
        self.inner.prohibition(name)
    }

    fn obligation(&self, name: &str) -> Result<Option<Obligation>, PolicyError> {
        self.inner.obligation(name)
    }

    fn admin_operation(&self, name: &str) -> Result<Option<AdminOperation>, PolicyError> {
        self.inner.admin_operation(name)
    }

    fn admin_routine(&self, name: &str) -> Result<Option<AdminRoutine>, PolicyError> {
        self.inner.admin_routine(name)
    }

    fn resource_operations(&self) -> Result<AccessRightSet, PolicyError> {
        self.inner.resource_operations()
    }
}

impl<M> PolicyModifier for EventRecorder<M>
where
    M: PolicyModifier,
{
    fn create_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        descendants: &[NodeId],
    ) -> Result<NodeId, PolicyError> {
        let id = self.inner.create_node(kind, name, descendants)?;
        self.record(PolicyEvent::node_created(kind, id, name, descendants));
        Ok(id)
    }

    fn delete_node(&mut self, id: NodeId) -> Result<(), PolicyError> {
        self.inner.delete_node(id)?;
        self.record(PolicyEvent::NodeDeleted { id });
        Ok(())
    }

    fn set_node_properties(
        &mut self,
        id: NodeId,
        properties: &Properties,
    ) -> Result<(), PolicyError> {
        self.inner.set_node_properties(id, properties)?;
        self.record(PolicyEvent::NodePropertiesSet {
            id,
            properties: properties.clone(),
        });
        Ok(())
    }

    fn assign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError> {
        self.inner.assign(ascendant, descendants)?;
        self.record(PolicyEvent::AssignmentCreated {
            ascendant,
            descendants: descendants.to_vec(),
        });
        Ok(())
    }

    fn deassign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError> {
        self.inner.deassign(ascendant, descendants)?;
        self.record(PolicyEvent::AssignmentDeleted {
            ascendant,
            descendants: descendants.to_vec(),
        });
        Ok(())
    }

    fn associate(
        &mut self,
        ua: NodeId,
        target: NodeId,
        access_rights: &AccessRightSet,
    ) -> Result<(), PolicyError> {
        self.inner.associate(ua, target, access_rights)?;
        self.record(PolicyEvent::AssociationCreated {
            ua,
            target,
            access_rights: access_rights.clone(),
        });
        Ok(())
    }

    fn dissociate(&mut self, ua: NodeId, target: NodeId) -> Result<(), PolicyError> {
        self.inner.dissociate(ua, target)?;
        self.record(PolicyEvent::AssociationDeleted { ua, target });
        Ok(())
    }

    fn create_prohibition(&mut self, prohibition: &Prohibition) -> Result<(), PolicyError> {
        self.inner.create_prohibition(prohibition)?;
        self.record(PolicyEvent::ProhibitionCreated(prohibition.clone()));
        Ok(())
    }

    fn delete_prohibition(&mut self, name: &str) -> Result<(), PolicyError> {
        self.inner.delete_prohibition(name)?;
        self.record(PolicyEvent::ProhibitionDeleted {
            name: name.to_owned(),
        });
        Ok(())
    }

    fn create_obligation(
        &mut self,
        author: &UserContext,
        name: &str,
        source: &str,
    ) -> Result<(), PolicyError> {
        self.inner.create_obligation(author, name, source)?;
        self.record(PolicyEvent::ObligationCreated {
            author: author.clone(),
            name: name.to_owned(),
            source: source.to_owned(),
        });
        Ok(())
    }

    fn delete_obligation(&mut self, name: &str) -> Result<(), PolicyError> {
        self.inner.delete_obligation(name)?;
        self.record(PolicyEvent::ObligationDeleted {
            name: name.to_owned(),
        });
        Ok(())
    }

    fn create_admin_operation(&mut self, operation: &AdminOperation) -> Result<(), PolicyError> {
        let Definition::Pml(source) = &operation.definition else {
            return Err(PolicyError::NotDeclarative(operation.name.clone()));
        };

        self.inner.create_admin_operation(operation)?;
        self.record(PolicyEvent::AdminOperationCreated {
            name: operation.name.clone(),
            source: source.clone(),
        });
        Ok(())
    }

    fn delete_admin_operation(&mut self, name: &str) -> Result<(), PolicyError> {
        self.inner.delete_admin_operation(name)?;
        self.record(PolicyEvent::AdminOperationDeleted {
            name: name.to_owned(),
        });
        Ok(())
    }

    fn set_resource_operations(&mut self, operations: &AccessRightSet) -> Result<(), PolicyError> {
        self.inner.set_resource_operations(operations)?;
        self.record(PolicyEvent::ResourceOperationsSet {
            operations: operations.clone(),
        });
        Ok(())
    }

    fn create_admin_routine(&mut self, routine: &AdminRoutine) -> Result<(), PolicyError> {
        if self.plugins.contains(&routine.name) {
            trace!(name = %routine.name, "create plugin routine without event");
            return self.inner.create_admin_routine(routine);
        }

        let Definition::Pml(source) = &routine.definition else {
            return Err(PolicyError::NotDeclarative(routine.name.clone()));
        };

        self.inner.create_admin_routine(routine)?;
        self.record(PolicyEvent::AdminRoutineCreated {
            name: routine.name.clone(),
            source: source.clone(),
        });
        Ok(())
    }

    fn delete_admin_routine(&mut self, name: &str) -> Result<(), PolicyError> {
        if self.plugins.contains(name) {
            return Err(PolicyError::PluginRoutine(name.to_owned()));
        }

        self.inner.delete_admin_routine(name)?;
        self.record(PolicyEvent::AdminRoutineDeleted {
            name: name.to_owned(),
        });
        Ok(())
    }
}

impl<M> Transactional for EventRecorder<M>
where
    M: Transactional,
{
    fn begin_tx(&mut self) -> Result<(), PolicyError> {
        self.inner.begin_tx()
    }

    fn commit_tx(&mut self) -> Result<(), PolicyError> {
        self.inner.commit_tx()
    }

    fn rollback_tx(&mut self) -> Result<(), PolicyError> {
        self.inner.rollback_tx()
    }
}
