// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use ngac_core::{
    AccessRightSet, AdminOperation, AdminRoutine, Node, NodeId, NodeKind, Obligation, PolicyError,
    PolicyModifier, PolicyQuery, PolicyStore, Prohibition, ProhibitionSubject, Properties,
    Transactional, UserContext,
};
use tracing::trace;

/// Access rights which are always known, independent of the configured resource operations.
pub const ADMIN_ACCESS_RIGHTS: [&str; 16] = [
    "*",
    "create_policy_class",
    "create_user_attribute",
    "create_object_attribute",
    "create_user",
    "create_object",
    "delete_node",
    "set_properties",
    "assign",
    "assign_to",
    "deassign",
    "deassign_from",
    "associate",
    "dissociate",
    "create_prohibition",
    "create_obligation",
];

/// Complete state of a policy graph.
///
/// All collections are ordered, two graphs holding the same policy compare equal independent of
/// the order in which it was built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyGraph {
    nodes: BTreeMap<NodeId, Node>,
    names: BTreeMap<String, NodeId>,
    descendants: BTreeMap<NodeId, BTreeSet<NodeId>>,
    ascendants: BTreeMap<NodeId, BTreeSet<NodeId>>,
    associations: BTreeMap<NodeId, BTreeMap<NodeId, AccessRightSet>>,
    prohibitions: BTreeMap<String, Prohibition>,
    obligations: BTreeMap<String, Obligation>,
    operations: BTreeMap<String, AdminOperation>,
    routines: BTreeMap<String, AdminRoutine>,
    resource_operations: AccessRightSet,
    last_id: u64,
}

impl PolicyGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn get(&self, id: NodeId) -> Result<&Node, PolicyError> {
        self.nodes.get(&id).ok_or(PolicyError::UnknownNode(id))
    }

    /// Returns `true` if `target` can be reached from `from` following assignments downwards.
    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack = vec![from];
        let mut visited = BTreeSet::new();

        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }

            if !visited.insert(id) {
                continue;
            }

            if let Some(descendants) = self.descendants.get(&id) {
                stack.extend(descendants.iter().copied());
            }
        }

        false
    }

    fn check_assignment(&self, ascendant: NodeId, descendant: NodeId) -> Result<(), PolicyError> {
        let ascendant_node = self.get(ascendant)?;
        let descendant_node = self.get(descendant)?;

        if !ascendant_node.kind.can_assign_to(descendant_node.kind) {
            return Err(PolicyError::InvalidAssignment(
                ascendant_node.kind,
                descendant_node.kind,
            ));
        }

        if self.reaches(descendant, ascendant) {
            return Err(PolicyError::AssignmentCycle(ascendant, descendant));
        }

        Ok(())
    }

    fn check_new_node(
        &self,
        kind: NodeKind,
        name: &str,
        descendants: &[NodeId],
    ) -> Result<(), PolicyError> {
        if self.names.contains_key(name) {
            return Err(PolicyError::NodeNameExists(name.to_owned()));
        }

        match kind {
            NodeKind::PolicyClass if !descendants.is_empty() => {
                return Err(PolicyError::PolicyClassDescendants);
            }
            NodeKind::PolicyClass => (),
            _ if descendants.is_empty() => return Err(PolicyError::MissingDescendants(kind)),
            _ => (),
        }

        for descendant in descendants {
            let descendant_node = self.get(*descendant)?;
            if !kind.can_assign_to(descendant_node.kind) {
                return Err(PolicyError::InvalidAssignment(kind, descendant_node.kind));
            }
        }

        Ok(())
    }

    fn add_node(&mut self, id: NodeId, kind: NodeKind, name: &str, descendants: &[NodeId]) {
        self.nodes.insert(
            id,
            Node {
                id,
                kind,
                name: name.to_owned(),
                properties: Properties::new(),
            },
        );
        self.names.insert(name.to_owned(), id);

        for descendant in descendants {
            self.link(id, *descendant);
        }

        self.last_id = self.last_id.max(id.as_u64());
    }

    fn link(&mut self, ascendant: NodeId, descendant: NodeId) {
        self.descendants
            .entry(ascendant)
            .or_default()
            .insert(descendant);
        self.ascendants
            .entry(descendant)
            .or_default()
            .insert(ascendant);
    }

    fn unlink(&mut self, ascendant: NodeId, descendant: NodeId) {
        if let Some(set) = self.descendants.get_mut(&ascendant) {
            set.remove(&descendant);
            if set.is_empty() {
                self.descendants.remove(&ascendant);
            }
        }

        if let Some(set) = self.ascendants.get_mut(&descendant) {
            set.remove(&ascendant);
            if set.is_empty() {
                self.ascendants.remove(&descendant);
            }
        }
    }

    fn check_access_rights(&self, access_rights: &AccessRightSet) -> Result<(), PolicyError> {
        for right in access_rights {
            if !self.resource_operations.contains(right)
                && !ADMIN_ACCESS_RIGHTS.contains(&right.as_str())
            {
                return Err(PolicyError::UnknownAccessRight(right.clone()));
            }
        }

        Ok(())
    }
}

/// Policy Store keeping the whole graph in memory.
///
/// Transactions are implemented with snapshots: `begin_tx` pushes a copy of the graph onto a
/// stack, `rollback_tx` restores it and `commit_tx` discards it.
#[derive(Clone, Debug, Default)]
pub struct MemoryPolicyStore {
    graph: PolicyGraph,
    snapshots: Vec<PolicyGraph>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of the graph, including uncommitted changes.
    pub fn graph(&self) -> &PolicyGraph {
        &self.graph
    }

    /// Number of currently open transactions.
    pub fn transaction_depth(&self) -> usize {
        self.snapshots.len()
    }
}

impl PolicyQuery for MemoryPolicyStore {
    fn node(&self, id: NodeId) -> Result<Node, PolicyError> {
        self.graph.get(id).cloned()
    }

    fn node_id(&self, name: &str) -> Result<NodeId, PolicyError> {
        self.graph
            .names
            .get(name)
            .copied()
            .ok_or_else(|| PolicyError::UnknownNodeName(name.to_owned()))
    }

    fn node_exists(&self, name: &str) -> Result<bool, PolicyError> {
        Ok(self.graph.names.contains_key(name))
    }

    fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError> {
        self.graph.get(id)?;
        Ok(self
            .graph
            .descendants
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn ascendants(&self, id: NodeId) -> Result<Vec<NodeId>, PolicyError> {
        self.graph.get(id)?;
        Ok(self
            .graph
            .ascendants
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn associations(&self, ua: NodeId) -> Result<Vec<(NodeId, AccessRightSet)>, PolicyError> {
        self.graph.get(ua)?;
        Ok(self
            .graph
            .associations
            .get(&ua)
            .map(|targets| {
                targets
                    .iter()
                    .map(|(target, rights)| (*target, rights.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn prohibition(&self, name: &str) -> Result<Option<Prohibition>, PolicyError> {
        Ok(self.graph.prohibitions.get(name).cloned())
    }

    fn obligation(&self, name: &str) -> Result<Option<Obligation>, PolicyError> {
        Ok(self.graph.obligations.get(name).cloned())
    }

    fn admin_operation(&self, name: &str) -> Result<Option<AdminOperation>, PolicyError> {
        Ok(self.graph.operations.get(name).cloned())
    }

    fn admin_routine(&self, name: &str) -> Result<Option<AdminRoutine>, PolicyError> {
        Ok(self.graph.routines.get(name).cloned())
    }

    fn resource_operations(&self) -> Result<AccessRightSet, PolicyError> {
        Ok(self.graph.resource_operations.clone())
    }
}

impl PolicyModifier for MemoryPolicyStore {
    fn create_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        descendants: &[NodeId],
    ) -> Result<NodeId, PolicyError> {
        self.graph.check_new_node(kind, name, descendants)?;

        let id = NodeId(self.graph.last_id + 1);
        self.graph.add_node(id, kind, name, descendants);
        Ok(id)
    }

    fn delete_node(&mut self, id: NodeId) -> Result<(), PolicyError> {
        let node = self.graph.get(id)?.clone();

        if self.graph.ascendants.contains_key(&id) {
            return Err(PolicyError::NodeHasAscendants(id));
        }

        for prohibition in self.graph.prohibitions.values() {
            let is_subject = prohibition.subject == ProhibitionSubject::Node(id);
            let is_container = prohibition
                .container_conditions
                .iter()
                .any(|condition| condition.container == id);

            if is_subject || is_container {
                return Err(PolicyError::NodeInProhibition(id, prohibition.name.clone()));
            }
        }

        let descendants: Vec<NodeId> = self
            .graph
            .descendants
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for descendant in descendants {
            self.graph.unlink(id, descendant);
        }

        self.graph.associations.remove(&id);
        for targets in self.graph.associations.values_mut() {
            targets.remove(&id);
        }
        self.graph.associations.retain(|_, targets| !targets.is_empty());

        self.graph.names.remove(&node.name);
        self.graph.nodes.remove(&id);

        Ok(())
    }

    fn set_node_properties(
        &mut self,
        id: NodeId,
        properties: &Properties,
    ) -> Result<(), PolicyError> {
        let node = self
            .graph
            .nodes
            .get_mut(&id)
            .ok_or(PolicyError::UnknownNode(id))?;
        node.properties = properties.clone();
        Ok(())
    }

    fn assign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError> {
        self.graph.get(ascendant)?;

        for descendant in descendants {
            self.graph.check_assignment(ascendant, *descendant)?;
        }

        for descendant in descendants {
            self.graph.link(ascendant, *descendant);
        }

        Ok(())
    }

    fn deassign(&mut self, ascendant: NodeId, descendants: &[NodeId]) -> Result<(), PolicyError> {
        let node = self.graph.get(ascendant)?;
        let kind = node.kind;

        let mut remaining = self
            .graph
            .descendants
            .get(&ascendant)
            .cloned()
            .unwrap_or_default();

        for descendant in descendants {
            self.graph.get(*descendant)?;

            if remaining.remove(descendant)
                && remaining.is_empty()
                && kind != NodeKind::PolicyClass
            {
                return Err(PolicyError::DisconnectedNode(ascendant, *descendant));
            }
        }

        for descendant in descendants {
            self.graph.unlink(ascendant, *descendant);
        }

        Ok(())
    }

    fn associate(
        &mut self,
        ua: NodeId,
        target: NodeId,
        access_rights: &AccessRightSet,
    ) -> Result<(), PolicyError> {
        if self.graph.get(ua)?.kind != NodeKind::UserAttribute {
            return Err(PolicyError::InvalidAssociation(ua));
        }

        if !matches!(
            self.graph.get(target)?.kind,
            NodeKind::UserAttribute | NodeKind::ObjectAttribute
        ) {
            return Err(PolicyError::InvalidAssociation(target));
        }

        self.graph.check_access_rights(access_rights)?;

        self.graph
            .associations
            .entry(ua)
            .or_default()
            .insert(target, access_rights.clone());

        Ok(())
    }

    fn dissociate(&mut self, ua: NodeId, target: NodeId) -> Result<(), PolicyError> {
        self.graph.get(ua)?;
        self.graph.get(target)?;

        if let Some(targets) = self.graph.associations.get_mut(&ua) {
            targets.remove(&target);
            if targets.is_empty() {
                self.graph.associations.remove(&ua);
            }
        }

        Ok(())
    }

    fn create_prohibition(&mut self, prohibition: &Prohibition) -> Result<(), PolicyError> {
        if self.graph.prohibitions.contains_key(&prohibition.name) {
            return Err(PolicyError::ProhibitionExists(prohibition.name.clone()));
        }

        if let ProhibitionSubject::Node(id) = prohibition.subject {
            self.graph.get(id)?;
        }

        for condition in &prohibition.container_conditions {
            self.graph.get(condition.container)?;
        }

        self.graph.check_access_rights(&prohibition.access_rights)?;

        self.graph
            .prohibitions
            .insert(prohibition.name.clone(), prohibition.clone());

        Ok(())
    }

    fn delete_prohibition(&mut self, name: &str) -> Result<(), PolicyError> {
        self.graph
            .prohibitions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PolicyError::UnknownProhibition(name.to_owned()))
    }

    fn create_obligation(
        &mut self,
        author: &UserContext,
        name: &str,
        source: &str,
    ) -> Result<(), PolicyError> {
        if self.graph.obligations.contains_key(name) {
            return Err(PolicyError::ObligationExists(name.to_owned()));
        }

        self.graph.obligations.insert(
            name.to_owned(),
            Obligation {
                author: author.clone(),
                name: name.to_owned(),
                source: source.to_owned(),
            },
        );

        Ok(())
    }

    fn delete_obligation(&mut self, name: &str) -> Result<(), PolicyError> {
        self.graph
            .obligations
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PolicyError::UnknownObligation(name.to_owned()))
    }

    fn create_admin_operation(&mut self, operation: &AdminOperation) -> Result<(), PolicyError> {
        if self.graph.operations.contains_key(&operation.name) {
            return Err(PolicyError::OperationExists(operation.name.clone()));
        }

        self.graph
            .operations
            .insert(operation.name.clone(), operation.clone());

        Ok(())
    }

    fn delete_admin_operation(&mut self, name: &str) -> Result<(), PolicyError> {
        self.graph
            .operations
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PolicyError::UnknownOperation(name.to_owned()))
    }

    fn set_resource_operations(&mut self, operations: &AccessRightSet) -> Result<(), PolicyError> {
        self.graph.resource_operations = operations.clone();
        Ok(())
    }

    fn create_admin_routine(&mut self, routine: &AdminRoutine) -> Result<(), PolicyError> {
        if self.graph.routines.contains_key(&routine.name) {
            return Err(PolicyError::RoutineExists(routine.name.clone()));
        }

        self.graph
            .routines
            .insert(routine.name.clone(), routine.clone());

        Ok(())
    }

    fn delete_admin_routine(&mut self, name: &str) -> Result<(), PolicyError> {
        self.graph
            .routines
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PolicyError::UnknownRoutine(name.to_owned()))
    }
}

impl Transactional for MemoryPolicyStore {
    fn begin_tx(&mut self) -> Result<(), PolicyError> {
        self.snapshots.push(self.graph.clone());
        trace!(depth = self.snapshots.len(), "begin transaction");
        Ok(())
    }

    fn commit_tx(&mut self) -> Result<(), PolicyError> {
        self.snapshots.pop().ok_or(PolicyError::NoTransaction)?;
        trace!(depth = self.snapshots.len(), "commit transaction");
        Ok(())
    }

    fn rollback_tx(&mut self) -> Result<(), PolicyError> {
        self.graph = self.snapshots.pop().ok_or(PolicyError::NoTransaction)?;
        trace!(depth = self.snapshots.len(), "rollback transaction");
        Ok(())
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn insert_node(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        name: &str,
        descendants: &[NodeId],
    ) -> Result<(), PolicyError> {
        if self.graph.nodes.contains_key(&id) {
            return Err(PolicyError::NodeIdExists(id));
        }

        self.graph.check_new_node(kind, name, descendants)?;
        self.graph.add_node(id, kind, name, descendants);
        Ok(())
    }
}
