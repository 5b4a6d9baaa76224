// SPDX-License-Identifier: MIT OR Apache-2.0

use std::future::Future;
use std::sync::Arc;

use ngac_core::Revision;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ConsistencyConfig;
use crate::error::ErrorKind;
use crate::revision::{CurrentRevision, LatestRevision, TrackerError};
use crate::status::Status;

/// Holds back inbound requests until the local replica caught up with the log.
///
/// A request may wait for the configured timeout in total, for learning the latest revision and
/// for the replica to reach it. Requests to excluded methods are never held back.
#[derive(Debug)]
pub struct ConsistencyInterceptor {
    current: Arc<CurrentRevision>,
    latest: Arc<LatestRevision>,
    config: ConsistencyConfig,
}

impl ConsistencyInterceptor {
    pub fn new(
        current: Arc<CurrentRevision>,
        latest: Arc<LatestRevision>,
        config: ConsistencyConfig,
    ) -> Self {
        Self {
            current,
            latest,
            config,
        }
    }

    /// Checks if a request to `method` may be served now.
    pub async fn check(&self, method: &str) -> Result<(), ConsistencyError> {
        if self.config.is_excluded(method) {
            trace!(%method, "skip consistency check");
            return Ok(());
        }

        let deadline = Instant::now() + self.config.timeout;
        let latest = self.latest.get(self.config.timeout).await?;

        let current = self.current.get();
        if current >= latest {
            return Ok(());
        }

        debug!(%method, current, latest, "wait for replica to catch up");
        let remaining = deadline.saturating_duration_since(Instant::now());
        if self.current.await_revision(latest, remaining).await {
            return Ok(());
        }

        Err(ConsistencyError::Stale {
            current: self.current.get(),
            latest,
        })
    }

    /// Runs `call` once the consistency check for `method` passed.
    pub async fn intercept<T, F>(&self, method: &str, call: F) -> Result<T, Status>
    where
        F: Future<Output = Result<T, Status>>,
    {
        self.check(method).await?;
        call.await
    }
}

#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error(transparent)]
    Latest(#[from] TrackerError),

    #[error("replica at revision {current} did not catch up with revision {latest} in time")]
    Stale { current: Revision, latest: Revision },
}

impl ConsistencyError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Timeout
    }
}
