// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

use crate::graph::{NodeId, NodeKind};

/// Rule violations reported by a Policy Store or the policy language compiler.
///
/// These errors are surfaced to the caller verbatim and never retried.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("node with name \"{0}\" already exists")]
    NodeNameExists(String),

    #[error("node with id {0} already exists")]
    NodeIdExists(NodeId),

    #[error("node \"{0}\" does not exist")]
    UnknownNodeName(String),

    #[error("node with id {0} does not exist")]
    UnknownNode(NodeId),

    #[error("a {0} can not be assigned to a {1}")]
    InvalidAssignment(NodeKind, NodeKind),

    #[error("assigning {0} to {1} would create a cycle")]
    AssignmentCycle(NodeId, NodeId),

    #[error("a {0} must be created with at least one descendant")]
    MissingDescendants(NodeKind),

    #[error("a policy class can not have descendants")]
    PolicyClassDescendants,

    #[error("deassigning {0} from {1} would leave it disconnected")]
    DisconnectedNode(NodeId, NodeId),

    #[error("node {0} can not be deleted as it still has ascendants")]
    NodeHasAscendants(NodeId),

    #[error("node {0} is still referenced by prohibition \"{1}\"")]
    NodeInProhibition(NodeId, String),

    #[error("node {0} can not be the source of an association")]
    InvalidAssociation(NodeId),

    #[error("unknown access right \"{0}\"")]
    UnknownAccessRight(String),

    #[error("prohibition \"{0}\" already exists")]
    ProhibitionExists(String),

    #[error("prohibition \"{0}\" does not exist")]
    UnknownProhibition(String),

    #[error("obligation \"{0}\" already exists")]
    ObligationExists(String),

    #[error("obligation \"{0}\" does not exist")]
    UnknownObligation(String),

    #[error("operation \"{0}\" already exists")]
    OperationExists(String),

    #[error("operation \"{0}\" does not exist")]
    UnknownOperation(String),

    #[error("routine \"{0}\" already exists")]
    RoutineExists(String),

    #[error("routine \"{0}\" does not exist")]
    UnknownRoutine(String),

    #[error("routine \"{0}\" is provided by a plugin and can not be deleted")]
    PluginRoutine(String),

    #[error("only declarative definitions supported: \"{0}\" is implemented natively")]
    NotDeclarative(String),

    #[error("no transaction in progress")]
    NoTransaction,

    #[error("user {0} is not authorized to perform this action")]
    Unauthorized(NodeId),

    #[error("pml error at position {position}: {message}")]
    Pml { position: usize, message: String },
}

impl PolicyError {
    pub fn pml(position: usize, message: impl Into<String>) -> Self {
        Self::Pml {
            position,
            message: message.into(),
        }
    }
}
