// SPDX-License-Identifier: MIT OR Apache-2.0

/// Closed classification of everything which can go wrong in the engine.
///
/// Retry and surfacing decisions are made on the kind and never on concrete error types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Policy model rule violation. Surfaced verbatim, never retried.
    Domain,

    /// Optimistic append lost against a concurrent writer.
    Conflict,

    /// An event could not be applied to a replica.
    ReplayFailure,

    /// A bounded wait ran out of time.
    Timeout,

    /// Request was rejected before any mutation was attempted.
    Malformed,

    Internal,
}

impl ErrorKind {
    /// Returns `true` if repeating the same request later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::Timeout)
    }
}
