// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of the Policy Store interfaces from `ngac-core`.
//!
//! [`MemoryPolicyStore`] keeps the complete policy graph in memory and validates every mutation
//! against the NGAC assignment and association rules. Nested transactions are implemented with
//! snapshots, which makes rolling back a disposable write attempt cheap and exact.
//!
//! [`PmlParser`] is a compact front-end for the declarative subset of PML needed to build and
//! administer a policy. Obligation, operation and routine bodies are kept as source text.
mod memory;
mod pml;

pub use memory::{ADMIN_ACCESS_RIGHTS, MemoryPolicyStore, PolicyGraph};
pub use pml::PmlParser;
