// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::graph::{AccessRightSet, NodeId};

/// The user and (optionally) process on whose behalf a policy change is made.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserContext {
    pub user: NodeId,
    pub process: Option<String>,
}

impl UserContext {
    pub fn new(user: NodeId) -> Self {
        Self {
            user,
            process: None,
        }
    }

    pub fn with_process(mut self, process: impl Into<String>) -> Self {
        self.process = Some(process.into());
        self
    }
}

/// Who a prohibition applies to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProhibitionSubject {
    Node(NodeId),
    Process(String),
}

/// A container a prohibition applies to. With `complement` set, the prohibition applies to
/// everything _outside_ of the container instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerCondition {
    pub container: NodeId,
    pub complement: bool,
}

/// Denies a subject a set of access rights on the given containers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prohibition {
    pub name: String,
    pub subject: ProhibitionSubject,
    pub access_rights: AccessRightSet,
    pub intersection: bool,
    pub container_conditions: Vec<ContainerCondition>,
}

/// Event-response rule, defined in PML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    pub author: UserContext,
    pub name: String,
    pub source: String,
}

/// How an administrative operation or routine is implemented.
///
/// Only PML-defined ones can be replicated through the event log: a native implementation lives
/// in the code of one process and has no representation other replicas could replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Definition {
    Pml(String),
    Native,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOperation {
    pub name: String,
    pub definition: Definition,
}

impl AdminOperation {
    pub fn pml(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Definition::Pml(source.into()),
        }
    }

    pub fn native(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Definition::Native,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRoutine {
    pub name: String,
    pub definition: Definition,
}

impl AdminRoutine {
    pub fn pml(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Definition::Pml(source.into()),
        }
    }

    pub fn native(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Definition::Native,
        }
    }
}
