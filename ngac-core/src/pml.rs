// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boundary to the policy language (PML) compiler.
//!
//! A [`PmlCompiler`] turns source text into a list of [`Statement`]s. Statements refer to nodes
//! by name and resolve them against whatever [`PolicyModifier`] they are executed on, which makes
//! it possible to run the same statements on a plain store, inside a transaction context or
//! through an event-recording wrapper.
use std::fmt::Display;

use crate::error::PolicyError;
use crate::graph::{AccessRightSet, NodeId, NodeKind};
use crate::policy::{AdminOperation, AdminRoutine, UserContext};
use crate::traits::PolicyModifier;

/// Compiles PML source text into executable statements.
pub trait PmlCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Vec<Statement>, PolicyError>;
}

/// What a `delete` statement removes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeleteTarget {
    Node,
    Prohibition,
    Obligation,
    Operation,
    Routine,
}

/// A compiled PML statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    CreatePolicyClass {
        name: String,
    },
    CreateNode {
        kind: NodeKind,
        name: String,
        descendants: Vec<String>,
    },
    Assign {
        ascendant: String,
        descendants: Vec<String>,
    },
    Deassign {
        ascendant: String,
        descendants: Vec<String>,
    },
    Associate {
        ua: String,
        target: String,
        access_rights: AccessRightSet,
    },
    SetResourceOperations {
        operations: AccessRightSet,
    },
    /// `source` is the complete text of the declaration, compiling it again yields this very
    /// statement.
    CreateObligation {
        name: String,
        source: String,
    },
    CreateOperation {
        name: String,
        source: String,
    },
    CreateRoutine {
        name: String,
        source: String,
    },
    Delete {
        target: DeleteTarget,
        name: String,
    },
}

/// Kind of a [`Statement`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatementKind {
    CreatePolicyClass,
    CreateNode,
    Assign,
    Deassign,
    Associate,
    SetResourceOperations,
    CreateObligation,
    CreateOperation,
    CreateRoutine,
    Delete,
}

impl Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatementKind::CreatePolicyClass => "create policy class",
            StatementKind::CreateNode => "create node",
            StatementKind::Assign => "assign",
            StatementKind::Deassign => "deassign",
            StatementKind::Associate => "associate",
            StatementKind::SetResourceOperations => "set resource operations",
            StatementKind::CreateObligation => "create obligation",
            StatementKind::CreateOperation => "create operation",
            StatementKind::CreateRoutine => "create routine",
            StatementKind::Delete => "delete",
        };

        write!(f, "{}", s)
    }
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::CreatePolicyClass { .. } => StatementKind::CreatePolicyClass,
            Statement::CreateNode { .. } => StatementKind::CreateNode,
            Statement::Assign { .. } => StatementKind::Assign,
            Statement::Deassign { .. } => StatementKind::Deassign,
            Statement::Associate { .. } => StatementKind::Associate,
            Statement::SetResourceOperations { .. } => StatementKind::SetResourceOperations,
            Statement::CreateObligation { .. } => StatementKind::CreateObligation,
            Statement::CreateOperation { .. } => StatementKind::CreateOperation,
            Statement::CreateRoutine { .. } => StatementKind::CreateRoutine,
            Statement::Delete { .. } => StatementKind::Delete,
        }
    }

    /// Executes the statement on the given modifier on behalf of `author`.
    ///
    /// Returns the identifier of the created node for node-creating statements.
    pub fn execute<M>(
        &self,
        modifier: &mut M,
        author: &UserContext,
    ) -> Result<Option<NodeId>, PolicyError>
    where
        M: PolicyModifier + ?Sized,
    {
        match self {
            Statement::CreatePolicyClass { name } => modifier
                .create_node(NodeKind::PolicyClass, name, &[])
                .map(Some),
            Statement::CreateNode {
                kind,
                name,
                descendants,
            } => {
                let descendants = resolve(modifier, descendants)?;
                modifier.create_node(*kind, name, &descendants).map(Some)
            }
            Statement::Assign {
                ascendant,
                descendants,
            } => {
                let ascendant = modifier.node_id(ascendant)?;
                let descendants = resolve(modifier, descendants)?;
                modifier.assign(ascendant, &descendants).map(|_| None)
            }
            Statement::Deassign {
                ascendant,
                descendants,
            } => {
                let ascendant = modifier.node_id(ascendant)?;
                let descendants = resolve(modifier, descendants)?;
                modifier.deassign(ascendant, &descendants).map(|_| None)
            }
            Statement::Associate {
                ua,
                target,
                access_rights,
            } => {
                let ua = modifier.node_id(ua)?;
                let target = modifier.node_id(target)?;
                modifier.associate(ua, target, access_rights).map(|_| None)
            }
            Statement::SetResourceOperations { operations } => {
                modifier.set_resource_operations(operations).map(|_| None)
            }
            Statement::CreateObligation { name, source } => modifier
                .create_obligation(author, name, source)
                .map(|_| None),
            Statement::CreateOperation { name, source } => modifier
                .create_admin_operation(&AdminOperation::pml(name, source))
                .map(|_| None),
            Statement::CreateRoutine { name, source } => modifier
                .create_admin_routine(&AdminRoutine::pml(name, source))
                .map(|_| None),
            Statement::Delete { target, name } => {
                match target {
                    DeleteTarget::Node => {
                        let id = modifier.node_id(name)?;
                        modifier.delete_node(id)?;
                    }
                    DeleteTarget::Prohibition => modifier.delete_prohibition(name)?,
                    DeleteTarget::Obligation => modifier.delete_obligation(name)?,
                    DeleteTarget::Operation => modifier.delete_admin_operation(name)?,
                    DeleteTarget::Routine => modifier.delete_admin_routine(name)?,
                }
                Ok(None)
            }
        }
    }
}

fn resolve<M>(modifier: &M, names: &[String]) -> Result<Vec<NodeId>, PolicyError>
where
    M: PolicyModifier + ?Sized,
{
    names.iter().map(|name| modifier.node_id(name)).collect()
}
