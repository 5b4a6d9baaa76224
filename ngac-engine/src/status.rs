// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status codes handed to RPC clients.
//!
//! Every error ends up as one of three codes. `Unavailable` tells clients that repeating the
//! request later might succeed: it is used for writes which kept conflicting and for replicas
//! which did not catch up in time.
use std::fmt::Display;

use ngac_core::PolicyError;

use crate::adjudicator::AdjudicationError;
use crate::command::CommandError;
use crate::error::ErrorKind;
use crate::interceptor::ConsistencyError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    PermissionDenied,
    Internal,
    Unavailable,
}

impl Code {
    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Conflict | ErrorKind::Timeout => Code::Unavailable,
            ErrorKind::Domain
            | ErrorKind::ReplayFailure
            | ErrorKind::Malformed
            | ErrorKind::Internal => Code::Internal,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

impl From<PolicyError> for Status {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Unauthorized(_) => Status::permission_denied(err.to_string()),
            err => Status::internal(err.to_string()),
        }
    }
}

impl From<AdjudicationError> for Status {
    fn from(err: AdjudicationError) -> Self {
        match err {
            AdjudicationError::Command(CommandError::Policy(err)) => err.into(),
            err => Status::new(Code::from_kind(err.kind()), err.to_string()),
        }
    }
}

impl From<ConsistencyError> for Status {
    fn from(err: ConsistencyError) -> Self {
        Status::new(Code::from_kind(err.kind()), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ngac_core::{NodeId, PolicyError};
    use ngac_log::EventLogError;

    use crate::adjudicator::AdjudicationError;
    use crate::interceptor::ConsistencyError;
    use crate::revision::TrackerError;

    use super::{Code, Status};

    #[test]
    fn mapping() {
        let status: Status = AdjudicationError::from(PolicyError::Unauthorized(NodeId(1))).into();
        assert_eq!(status.code, Code::PermissionDenied);

        let status: Status =
            AdjudicationError::from(PolicyError::NodeNameExists("pc1".into())).into();
        assert_eq!(
            status,
            Status::internal("node with name \"pc1\" already exists")
        );

        let status: Status = AdjudicationError::ConflictRetriesExhausted {
            attempts: 3,
            source: EventLogError::Conflict {
                stream: "policy".into(),
                expected: 1,
                actual: 2,
            },
        }
        .into();
        assert_eq!(status.code, Code::Unavailable);

        let status: Status = ConsistencyError::Stale {
            current: 1,
            latest: 2,
        }
        .into();
        assert_eq!(status.code, Code::Unavailable);

        let status: Status =
            ConsistencyError::Latest(TrackerError::Timeout(Duration::from_secs(5))).into();
        assert_eq!(status.code, Code::Unavailable);

        let status: Status =
            AdjudicationError::EventLog(EventLogError::Unavailable("down".into())).into();
        assert_eq!(status.code, Code::Internal);
    }
}
