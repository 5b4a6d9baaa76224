// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Set of access rights, for example `{"read", "write"}`.
pub type AccessRightSet = BTreeSet<String>;

/// Key-value properties attached to a node.
pub type Properties = BTreeMap<String, String>;

/// Identifier of a node in the policy graph.
///
/// Identifiers are assigned by the Policy Store when a node gets created and are carried
/// unchanged in every event referring to that node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The five node types of an NGAC policy graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    PolicyClass,
    UserAttribute,
    ObjectAttribute,
    User,
    Object,
}

impl NodeKind {
    /// Returns `true` if a node of this kind may be assigned to a node of kind `descendant`.
    pub fn can_assign_to(&self, descendant: NodeKind) -> bool {
        use NodeKind::*;

        matches!(
            (self, descendant),
            (UserAttribute, UserAttribute | PolicyClass)
                | (ObjectAttribute, ObjectAttribute | PolicyClass)
                | (User, UserAttribute)
                | (Object, ObjectAttribute)
        )
    }

    /// Short PML keyword for this kind.
    pub fn keyword(&self) -> &'static str {
        match self {
            NodeKind::PolicyClass => "pc",
            NodeKind::UserAttribute => "ua",
            NodeKind::ObjectAttribute => "oa",
            NodeKind::User => "u",
            NodeKind::Object => "o",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "pc" => Some(NodeKind::PolicyClass),
            "ua" => Some(NodeKind::UserAttribute),
            "oa" => Some(NodeKind::ObjectAttribute),
            "u" => Some(NodeKind::User),
            "o" => Some(NodeKind::Object),
            _ => None,
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::PolicyClass => "policy class",
            NodeKind::UserAttribute => "user attribute",
            NodeKind::ObjectAttribute => "object attribute",
            NodeKind::User => "user",
            NodeKind::Object => "object",
        };

        write!(f, "{}", s)
    }
}

/// A node of the policy graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub properties: Properties,
}

#[cfg(test)]
mod tests {
    use super::NodeKind;

    #[test]
    fn assignment_rules() {
        assert!(NodeKind::UserAttribute.can_assign_to(NodeKind::PolicyClass));
        assert!(NodeKind::User.can_assign_to(NodeKind::UserAttribute));
        assert!(NodeKind::Object.can_assign_to(NodeKind::ObjectAttribute));

        assert!(!NodeKind::PolicyClass.can_assign_to(NodeKind::PolicyClass));
        assert!(!NodeKind::User.can_assign_to(NodeKind::PolicyClass));
        assert!(!NodeKind::ObjectAttribute.can_assign_to(NodeKind::UserAttribute));
    }

    #[test]
    fn keywords() {
        for kind in [
            NodeKind::PolicyClass,
            NodeKind::UserAttribute,
            NodeKind::ObjectAttribute,
            NodeKind::User,
            NodeKind::Object,
        ] {
            assert_eq!(NodeKind::from_keyword(kind.keyword()), Some(kind));
        }
        assert_eq!(NodeKind::from_keyword("pcc"), None);
    }
}
