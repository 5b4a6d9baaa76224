// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::graph::{AccessRightSet, NodeId, NodeKind, Properties};
use crate::policy::Prohibition;

/// Administrative request submitted by a client.
///
/// Mirrors the [`PolicyEvent`](crate::PolicyEvent) variants plus [`AdminCommand::ExecutePml`],
/// which runs arbitrary PML. Obligations, operations and routines are submitted as PML source
/// which must contain exactly one declaration of the matching kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminCommand {
    CreatePolicyClass {
        name: String,
    },
    CreateUserAttribute {
        name: String,
        descendants: Vec<NodeId>,
    },
    CreateObjectAttribute {
        name: String,
        descendants: Vec<NodeId>,
    },
    CreateUser {
        name: String,
        descendants: Vec<NodeId>,
    },
    CreateObject {
        name: String,
        descendants: Vec<NodeId>,
    },
    DeleteNode {
        id: NodeId,
    },
    SetNodeProperties {
        id: NodeId,
        properties: Properties,
    },
    Assign {
        ascendant: NodeId,
        descendants: Vec<NodeId>,
    },
    Deassign {
        ascendant: NodeId,
        descendants: Vec<NodeId>,
    },
    Associate {
        ua: NodeId,
        target: NodeId,
        access_rights: AccessRightSet,
    },
    Dissociate {
        ua: NodeId,
        target: NodeId,
    },
    CreateProhibition(Prohibition),
    DeleteProhibition {
        name: String,
    },
    CreateObligation {
        source: String,
    },
    DeleteObligation {
        name: String,
    },
    CreateAdminOperation {
        source: String,
    },
    DeleteAdminOperation {
        name: String,
    },
    SetResourceOperations {
        operations: AccessRightSet,
    },
    CreateAdminRoutine {
        source: String,
    },
    DeleteAdminRoutine {
        name: String,
    },
    ExecutePml {
        source: String,
    },
}

impl AdminCommand {
    /// Node kind and name if this command creates a node.
    pub fn created_node(&self) -> Option<(NodeKind, &str)> {
        match self {
            AdminCommand::CreatePolicyClass { name } => Some((NodeKind::PolicyClass, name)),
            AdminCommand::CreateUserAttribute { name, .. } => {
                Some((NodeKind::UserAttribute, name))
            }
            AdminCommand::CreateObjectAttribute { name, .. } => {
                Some((NodeKind::ObjectAttribute, name))
            }
            AdminCommand::CreateUser { name, .. } => Some((NodeKind::User, name)),
            AdminCommand::CreateObject { name, .. } => Some((NodeKind::Object, name)),
            _ => None,
        }
    }
}

/// Value produced by executing one command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// A node was created and got the given identifier assigned.
    NodeCreated(NodeId),

    /// The command was applied and produced no value.
    Applied,
}

impl CommandOutcome {
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            CommandOutcome::NodeCreated(id) => Some(*id),
            CommandOutcome::Applied => None,
        }
    }
}
