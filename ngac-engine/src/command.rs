// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use ngac_core::{
    AdminCommand, CommandOutcome, NodeKind, PmlCompiler, PolicyError, PolicyModifier, Statement,
    StatementKind, Transactional, UserContext,
};
use thiserror::Error;
use tracing::debug;

use crate::error::ErrorKind;

/// Dispatches administrative commands onto a policy modifier.
#[derive(Clone)]
pub struct CommandHandler {
    compiler: Arc<dyn PmlCompiler>,
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler").finish_non_exhaustive()
    }
}

impl CommandHandler {
    pub fn new(compiler: Arc<dyn PmlCompiler>) -> Self {
        Self { compiler }
    }

    /// Executes one command on behalf of `author`.
    pub fn execute<M>(
        &self,
        modifier: &mut M,
        author: &UserContext,
        command: &AdminCommand,
    ) -> Result<CommandOutcome, CommandError>
    where
        M: PolicyModifier + ?Sized,
    {
        let outcome = match command {
            AdminCommand::CreatePolicyClass { name } => {
                CommandOutcome::NodeCreated(modifier.create_node(NodeKind::PolicyClass, name, &[])?)
            }
            AdminCommand::CreateUserAttribute { name, descendants } => CommandOutcome::NodeCreated(
                modifier.create_node(NodeKind::UserAttribute, name, descendants)?,
            ),
            AdminCommand::CreateObjectAttribute { name, descendants } => {
                CommandOutcome::NodeCreated(modifier.create_node(
                    NodeKind::ObjectAttribute,
                    name,
                    descendants,
                )?)
            }
            AdminCommand::CreateUser { name, descendants } => {
                CommandOutcome::NodeCreated(modifier.create_node(NodeKind::User, name, descendants)?)
            }
            AdminCommand::CreateObject { name, descendants } => CommandOutcome::NodeCreated(
                modifier.create_node(NodeKind::Object, name, descendants)?,
            ),
            AdminCommand::DeleteNode { id } => {
                modifier.delete_node(*id)?;
                CommandOutcome::Applied
            }
            AdminCommand::SetNodeProperties { id, properties } => {
                modifier.set_node_properties(*id, properties)?;
                CommandOutcome::Applied
            }
            AdminCommand::Assign {
                ascendant,
                descendants,
            } => {
                modifier.assign(*ascendant, descendants)?;
                CommandOutcome::Applied
            }
            AdminCommand::Deassign {
                ascendant,
                descendants,
            } => {
                modifier.deassign(*ascendant, descendants)?;
                CommandOutcome::Applied
            }
            AdminCommand::Associate {
                ua,
                target,
                access_rights,
            } => {
                modifier.associate(*ua, *target, access_rights)?;
                CommandOutcome::Applied
            }
            AdminCommand::Dissociate { ua, target } => {
                modifier.dissociate(*ua, *target)?;
                CommandOutcome::Applied
            }
            AdminCommand::CreateProhibition(prohibition) => {
                modifier.create_prohibition(prohibition)?;
                CommandOutcome::Applied
            }
            AdminCommand::DeleteProhibition { name } => {
                modifier.delete_prohibition(name)?;
                CommandOutcome::Applied
            }
            AdminCommand::CreateObligation { source } => {
                let statement = self.single_declaration(source, StatementKind::CreateObligation)?;
                statement.execute(modifier, author)?;
                CommandOutcome::Applied
            }
            AdminCommand::DeleteObligation { name } => {
                modifier.delete_obligation(name)?;
                CommandOutcome::Applied
            }
            AdminCommand::CreateAdminOperation { source } => {
                let statement = self.single_declaration(source, StatementKind::CreateOperation)?;
                statement.execute(modifier, author)?;
                CommandOutcome::Applied
            }
            AdminCommand::DeleteAdminOperation { name } => {
                modifier.delete_admin_operation(name)?;
                CommandOutcome::Applied
            }
            AdminCommand::SetResourceOperations { operations } => {
                modifier.set_resource_operations(operations)?;
                CommandOutcome::Applied
            }
            AdminCommand::CreateAdminRoutine { source } => {
                let statement = self.single_declaration(source, StatementKind::CreateRoutine)?;
                statement.execute(modifier, author)?;
                CommandOutcome::Applied
            }
            AdminCommand::DeleteAdminRoutine { name } => {
                modifier.delete_admin_routine(name)?;
                CommandOutcome::Applied
            }
            AdminCommand::ExecutePml { source } => {
                for statement in self.compiler.compile(source)? {
                    statement.execute(modifier, author)?;
                }
                CommandOutcome::Applied
            }
        };

        Ok(outcome)
    }

    /// Executes commands strictly in order inside one nested transaction.
    ///
    /// The first failing command aborts the whole batch, the nested transaction is rolled back
    /// and the error returned.
    pub fn execute_batch<M>(
        &self,
        modifier: &mut M,
        author: &UserContext,
        commands: &[AdminCommand],
    ) -> Result<Vec<CommandOutcome>, CommandError>
    where
        M: PolicyModifier + Transactional + ?Sized,
    {
        modifier.begin_tx()?;

        let mut outcomes = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            match self.execute(modifier, author, command) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    debug!(index, %err, "abort command batch");
                    modifier.rollback_tx()?;
                    return Err(err);
                }
            }
        }

        modifier.commit_tx()?;
        Ok(outcomes)
    }

    /// Compiles source which must contain exactly one declaration of the expected kind.
    fn single_declaration(
        &self,
        source: &str,
        expected: StatementKind,
    ) -> Result<Statement, CommandError> {
        let mut statements = self.compiler.compile(source)?;

        match statements.as_slice() {
            [statement] if statement.kind() == expected => Ok(statements.remove(0)),
            _ => Err(CommandError::NotSingleDeclaration(expected)),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("only one {0} statement allowed")]
    NotSingleDeclaration(StatementKind),
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Policy(_) => ErrorKind::Domain,
            CommandError::NotSingleDeclaration(_) => ErrorKind::Malformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use ngac_core::{
        AdminCommand, CommandOutcome, NodeId, PolicyError, PolicyQuery, StatementKind,
        UserContext, access_rights,
    };
    use ngac_store::{MemoryPolicyStore, PmlParser};

    use super::{CommandError, CommandHandler};

    fn handler() -> CommandHandler {
        CommandHandler::new(Arc::new(PmlParser::new()))
    }

    fn author() -> UserContext {
        UserContext::new(NodeId(0))
    }

    #[test]
    fn dispatches_commands() {
        let mut store = MemoryPolicyStore::new();
        let handler = handler();

        let pc = handler
            .execute(
                &mut store,
                &author(),
                &AdminCommand::CreatePolicyClass { name: "pc1".into() },
            )
            .unwrap()
            .node_id()
            .unwrap();
        let ua = handler
            .execute(
                &mut store,
                &author(),
                &AdminCommand::CreateUserAttribute {
                    name: "ua1".into(),
                    descendants: vec![pc],
                },
            )
            .unwrap()
            .node_id()
            .unwrap();
        let oa = handler
            .execute(
                &mut store,
                &author(),
                &AdminCommand::CreateObjectAttribute {
                    name: "oa1".into(),
                    descendants: vec![pc],
                },
            )
            .unwrap()
            .node_id()
            .unwrap();

        handler
            .execute(
                &mut store,
                &author(),
                &AdminCommand::SetResourceOperations {
                    operations: access_rights(["read"]),
                },
            )
            .unwrap();
        let outcome = handler
            .execute(
                &mut store,
                &author(),
                &AdminCommand::Associate {
                    ua,
                    target: oa,
                    access_rights: access_rights(["read"]),
                },
            )
            .unwrap();

        assert_eq!(outcome, CommandOutcome::Applied);
        assert_eq!(
            store.associations(ua).unwrap(),
            vec![(oa, access_rights(["read"]))]
        );
    }

    #[test]
    fn single_declaration_only() {
        let mut store = MemoryPolicyStore::new();
        let handler = handler();

        let result = handler.execute(
            &mut store,
            &author(),
            &AdminCommand::CreateObligation {
                source: r#"
                    create pc "pc1"
                    create obligation "audit" { when any user performs "read" { log() } }
                "#
                .into(),
            },
        );

        let err = result.unwrap_err();
        assert_matches!(
            err,
            CommandError::NotSingleDeclaration(StatementKind::CreateObligation)
        );
        assert_eq!(
            err.to_string(),
            "only one create obligation statement allowed"
        );

        // Nothing was created, not even the policy class preceding the obligation.
        assert!(store.obligation("audit").unwrap().is_none());
        assert!(!store.node_exists("pc1").unwrap());
    }

    #[test]
    fn declaration_of_wrong_kind() {
        let mut store = MemoryPolicyStore::new();

        let result = handler().execute(
            &mut store,
            &author(),
            &AdminCommand::CreateAdminRoutine {
                source: "create operation \"op1\" { }".into(),
            },
        );
        assert_matches!(
            result,
            Err(CommandError::NotSingleDeclaration(StatementKind::CreateRoutine))
        );
        assert!(store.admin_operation("op1").unwrap().is_none());
    }

    #[test]
    fn obligation_is_attributed_to_author() {
        let mut store = MemoryPolicyStore::new();
        let author = UserContext::new(NodeId(3)).with_process("88");

        handler()
            .execute(
                &mut store,
                &author,
                &AdminCommand::CreateObligation {
                    source: "create obligation \"audit\" { }".into(),
                },
            )
            .unwrap();

        let obligation = store.obligation("audit").unwrap().unwrap();
        assert_eq!(obligation.author, author);
    }

    #[test]
    fn batch_aborts_on_first_failure() {
        let mut store = MemoryPolicyStore::new();

        let result = handler().execute_batch(
            &mut store,
            &author(),
            &[
                AdminCommand::CreatePolicyClass { name: "pc1".into() },
                AdminCommand::DeleteNode { id: NodeId(99) },
                AdminCommand::CreatePolicyClass { name: "pc2".into() },
            ],
        );

        assert_matches!(
            result,
            Err(CommandError::Policy(PolicyError::UnknownNode(NodeId(99))))
        );
        assert!(!store.node_exists("pc1").unwrap());
        assert!(!store.node_exists("pc2").unwrap());
        assert_eq!(store.transaction_depth(), 0);
    }

    #[test]
    fn execute_pml() {
        let mut store = MemoryPolicyStore::new();

        handler()
            .execute(
                &mut store,
                &author(),
                &AdminCommand::ExecutePml {
                    source: r#"
                        create pc "pc1"
                        create oa "oa1" in ["pc1"]
                        create o "o1" in ["oa1"]
                    "#
                    .into(),
                },
            )
            .unwrap();

        let oa = store.node_id("oa1").unwrap();
        let o = store.node_id("o1").unwrap();
        assert_eq!(store.descendants(o).unwrap(), vec![oa]);
    }
}
