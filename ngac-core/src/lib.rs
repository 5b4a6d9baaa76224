// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data types and interfaces shared by every part of the NGAC control-plane.
//!
//! The policy graph itself (nodes, assignments, associations, prohibitions, obligations and
//! administrative operations) is maintained by an external _Policy Store_. This crate only
//! describes the boundary to it:
//!
//! - [`PolicyQuery`], [`PolicyModifier`] and [`Transactional`] are the read, write and
//!   transaction primitives every store implementation offers. [`PolicyStore`] bundles them and
//!   adds the explicit-identifier insert used during replay.
//! - [`PolicyEvent`] is the immutable fact recorded for every successful mutation. Events are
//!   what gets appended to the event log and what replicas replay, in log order.
//! - [`AdminCommand`] is the tagged administrative request a client submits.
//! - [`pml`] holds the boundary to the policy language compiler: compiled [`Statement`]s know how
//!   to execute themselves against any [`PolicyModifier`].
//!
//! Event payloads are encoded as CBOR, see [`cbor`].
pub mod cbor;
mod command;
mod error;
mod event;
mod graph;
pub mod pml;
mod policy;
mod traits;

pub use command::{AdminCommand, CommandOutcome};
pub use error::PolicyError;
pub use event::PolicyEvent;
pub use graph::{AccessRightSet, Node, NodeId, NodeKind, Properties};
pub use pml::{PmlCompiler, Statement, StatementKind};
pub use policy::{
    AdminOperation, AdminRoutine, ContainerCondition, Definition, Obligation, Prohibition,
    ProhibitionSubject, UserContext,
};
pub use traits::{PolicyModifier, PolicyQuery, PolicyStore, Transactional};

/// Position of an event in the single policy stream.
///
/// Revisions are 1-based: the first appended event has revision `1`. Revision `0` denotes a
/// stream without any events.
pub type Revision = u64;

/// Builds an [`AccessRightSet`] from a list of string slices.
pub fn access_rights<'a>(rights: impl IntoIterator<Item = &'a str>) -> AccessRightSet {
    rights.into_iter().map(str::to_owned).collect()
}
