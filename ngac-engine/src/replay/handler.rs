// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use ngac_core::{
    AdminOperation, AdminRoutine, NodeKind, PmlCompiler, PolicyEvent, PolicyStore, Statement,
    StatementKind,
};
use tracing::trace;

use crate::replay::ReplayError;

/// Applies policy events to a Policy Store.
///
/// Events are applied with exactly the identifiers, names and values they carry. Obligations,
/// operations and routines are compiled again from their source on every application. The
/// handler does not deduplicate, callers hand in every event exactly once and in log order.
#[derive(Clone)]
pub struct PolicyEventHandler {
    compiler: Arc<dyn PmlCompiler>,
}

impl std::fmt::Debug for PolicyEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEventHandler").finish_non_exhaustive()
    }
}

impl PolicyEventHandler {
    pub fn new(compiler: Arc<dyn PmlCompiler>) -> Self {
        Self { compiler }
    }

    pub fn handle<S>(&self, store: &mut S, event: &PolicyEvent) -> Result<(), ReplayError>
    where
        S: PolicyStore + ?Sized,
    {
        trace!(event_type = event.schema_name(), "handle event");

        match event {
            PolicyEvent::PolicyClassCreated { id, name } => {
                store.insert_node(*id, NodeKind::PolicyClass, name, &[])?
            }
            PolicyEvent::UserAttributeCreated {
                id,
                name,
                descendants,
            } => store.insert_node(*id, NodeKind::UserAttribute, name, descendants)?,
            PolicyEvent::ObjectAttributeCreated {
                id,
                name,
                descendants,
            } => store.insert_node(*id, NodeKind::ObjectAttribute, name, descendants)?,
            PolicyEvent::UserCreated {
                id,
                name,
                descendants,
            } => store.insert_node(*id, NodeKind::User, name, descendants)?,
            PolicyEvent::ObjectCreated {
                id,
                name,
                descendants,
            } => store.insert_node(*id, NodeKind::Object, name, descendants)?,
            PolicyEvent::NodeDeleted { id } => store.delete_node(*id)?,
            PolicyEvent::NodePropertiesSet { id, properties } => {
                store.set_node_properties(*id, properties)?
            }
            PolicyEvent::AssignmentCreated {
                ascendant,
                descendants,
            } => store.assign(*ascendant, descendants)?,
            PolicyEvent::AssignmentDeleted {
                ascendant,
                descendants,
            } => store.deassign(*ascendant, descendants)?,
            PolicyEvent::AssociationCreated {
                ua,
                target,
                access_rights,
            } => store.associate(*ua, *target, access_rights)?,
            PolicyEvent::AssociationDeleted { ua, target } => store.dissociate(*ua, *target)?,
            PolicyEvent::ProhibitionCreated(prohibition) => store.create_prohibition(prohibition)?,
            PolicyEvent::ProhibitionDeleted { name } => store.delete_prohibition(name)?,
            PolicyEvent::ObligationCreated {
                author,
                name,
                source,
            } => {
                let statement = self.declaration(source, StatementKind::CreateObligation, name)?;
                statement.execute(store, author)?;
            }
            PolicyEvent::ObligationDeleted { name } => store.delete_obligation(name)?,
            PolicyEvent::AdminOperationCreated { name, source } => {
                self.declaration(source, StatementKind::CreateOperation, name)?;
                store.create_admin_operation(&AdminOperation::pml(name, source))?;
            }
            PolicyEvent::AdminOperationDeleted { name } => store.delete_admin_operation(name)?,
            PolicyEvent::ResourceOperationsSet { operations } => {
                store.set_resource_operations(operations)?
            }
            PolicyEvent::AdminRoutineCreated { name, source } => {
                self.declaration(source, StatementKind::CreateRoutine, name)?;
                store.create_admin_routine(&AdminRoutine::pml(name, source))?;
            }
            PolicyEvent::AdminRoutineDeleted { name } => store.delete_admin_routine(name)?,
        }

        Ok(())
    }

    /// Compiles carried source and checks it still declares exactly what the event names.
    fn declaration(
        &self,
        source: &str,
        kind: StatementKind,
        name: &str,
    ) -> Result<Statement, ReplayError> {
        let mut statements = self.compiler.compile(source)?;

        let matches = match statements.as_slice() {
            [
                Statement::CreateObligation { name: declared, .. }
                | Statement::CreateOperation { name: declared, .. }
                | Statement::CreateRoutine { name: declared, .. },
            ] => statements[0].kind() == kind && declared == name,
            _ => false,
        };

        if !matches {
            return Err(ReplayError::InvalidSource {
                kind,
                name: name.to_owned(),
            });
        }

        Ok(statements.remove(0))
    }
}
