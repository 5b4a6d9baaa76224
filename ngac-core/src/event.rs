// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::graph::{AccessRightSet, NodeId, NodeKind, Properties};
use crate::policy::{Prohibition, UserContext};

/// Immutable fact describing one successful mutation of the policy.
///
/// Creation events carry the identifier the store already assigned, never a placeholder which
/// would need to be resolved again during replay. Obligations, operations and routines are
/// carried as PML source text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyEvent {
    PolicyClassCreated {
        id: NodeId,
        name: String,
    },
    UserAttributeCreated {
        id: NodeId,
        name: String,
        descendants: Vec<NodeId>,
    },
    ObjectAttributeCreated {
        id: NodeId,
        name: String,
        descendants: Vec<NodeId>,
    },
    UserCreated {
        id: NodeId,
        name: String,
        descendants: Vec<NodeId>,
    },
    ObjectCreated {
        id: NodeId,
        name: String,
        descendants: Vec<NodeId>,
    },
    NodeDeleted {
        id: NodeId,
    },
    NodePropertiesSet {
        id: NodeId,
        properties: Properties,
    },
    AssignmentCreated {
        ascendant: NodeId,
        descendants: Vec<NodeId>,
    },
    AssignmentDeleted {
        ascendant: NodeId,
        descendants: Vec<NodeId>,
    },
    AssociationCreated {
        ua: NodeId,
        target: NodeId,
        access_rights: AccessRightSet,
    },
    AssociationDeleted {
        ua: NodeId,
        target: NodeId,
    },
    ProhibitionCreated(Prohibition),
    ProhibitionDeleted {
        name: String,
    },
    ObligationCreated {
        author: UserContext,
        name: String,
        source: String,
    },
    ObligationDeleted {
        name: String,
    },
    AdminOperationCreated {
        name: String,
        source: String,
    },
    AdminOperationDeleted {
        name: String,
    },
    ResourceOperationsSet {
        operations: AccessRightSet,
    },
    AdminRoutineCreated {
        name: String,
        source: String,
    },
    AdminRoutineDeleted {
        name: String,
    },
}

impl PolicyEvent {
    /// Event for a freshly created node of the given kind.
    pub fn node_created(kind: NodeKind, id: NodeId, name: &str, descendants: &[NodeId]) -> Self {
        let name = name.to_owned();
        let descendants = descendants.to_vec();

        match kind {
            NodeKind::PolicyClass => PolicyEvent::PolicyClassCreated { id, name },
            NodeKind::UserAttribute => PolicyEvent::UserAttributeCreated {
                id,
                name,
                descendants,
            },
            NodeKind::ObjectAttribute => PolicyEvent::ObjectAttributeCreated {
                id,
                name,
                descendants,
            },
            NodeKind::User => PolicyEvent::UserCreated {
                id,
                name,
                descendants,
            },
            NodeKind::Object => PolicyEvent::ObjectCreated {
                id,
                name,
                descendants,
            },
        }
    }

    /// Name of this variant, used as the record type in the event log.
    pub fn schema_name(&self) -> &'static str {
        match self {
            PolicyEvent::PolicyClassCreated { .. } => "PolicyClassCreated",
            PolicyEvent::UserAttributeCreated { .. } => "UserAttributeCreated",
            PolicyEvent::ObjectAttributeCreated { .. } => "ObjectAttributeCreated",
            PolicyEvent::UserCreated { .. } => "UserCreated",
            PolicyEvent::ObjectCreated { .. } => "ObjectCreated",
            PolicyEvent::NodeDeleted { .. } => "NodeDeleted",
            PolicyEvent::NodePropertiesSet { .. } => "NodePropertiesSet",
            PolicyEvent::AssignmentCreated { .. } => "AssignmentCreated",
            PolicyEvent::AssignmentDeleted { .. } => "AssignmentDeleted",
            PolicyEvent::AssociationCreated { .. } => "AssociationCreated",
            PolicyEvent::AssociationDeleted { .. } => "AssociationDeleted",
            PolicyEvent::ProhibitionCreated(_) => "ProhibitionCreated",
            PolicyEvent::ProhibitionDeleted { .. } => "ProhibitionDeleted",
            PolicyEvent::ObligationCreated { .. } => "ObligationCreated",
            PolicyEvent::ObligationDeleted { .. } => "ObligationDeleted",
            PolicyEvent::AdminOperationCreated { .. } => "AdminOperationCreated",
            PolicyEvent::AdminOperationDeleted { .. } => "AdminOperationDeleted",
            PolicyEvent::ResourceOperationsSet { .. } => "ResourceOperationsSet",
            PolicyEvent::AdminRoutineCreated { .. } => "AdminRoutineCreated",
            PolicyEvent::AdminRoutineDeleted { .. } => "AdminRoutineDeleted",
        }
    }

    /// Encodes the event into its binary payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    /// Decodes an event from its binary payload and checks it against the record type it was
    /// stored under.
    pub fn from_bytes(schema_name: &str, bytes: &[u8]) -> Result<Self, DecodeError> {
        let event: PolicyEvent = decode_cbor(bytes)?;

        if event.schema_name() != schema_name {
            return Err(DecodeError::SchemaMismatch {
                expected: schema_name.to_owned(),
                actual: event.schema_name().to_owned(),
            });
        }

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::cbor::DecodeError;
    use crate::graph::{NodeId, NodeKind};
    use crate::policy::UserContext;

    use super::PolicyEvent;

    #[test]
    fn node_created_variants() {
        let event = PolicyEvent::node_created(NodeKind::PolicyClass, NodeId(1), "pc1", &[]);
        assert_eq!(
            event,
            PolicyEvent::PolicyClassCreated {
                id: NodeId(1),
                name: "pc1".into()
            }
        );

        let event = PolicyEvent::node_created(NodeKind::Object, NodeId(7), "o1", &[NodeId(3)]);
        assert_eq!(event.schema_name(), "ObjectCreated");
    }

    #[test]
    fn payload_keeps_schema_name() {
        let event = PolicyEvent::ObligationCreated {
            author: UserContext::new(NodeId(4)).with_process("123"),
            name: "audit".into(),
            source: "create obligation \"audit\" { }".into(),
        };

        let bytes = event.to_bytes().unwrap();
        let decoded = PolicyEvent::from_bytes("ObligationCreated", &bytes).unwrap();
        assert_eq!(decoded, event);

        assert_matches!(
            PolicyEvent::from_bytes("ObligationDeleted", &bytes),
            Err(DecodeError::SchemaMismatch { .. })
        );
    }
}
