// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration of the write path, replicas and the consistency interceptor.
//!
//! `Config` bundles everything a process running an adjudicator and a replica needs and can be
//! (de-)serialised as a whole. The component configurations offer builder-style setters for
//! programmatic use.
use std::collections::BTreeSet;
use std::time::Duration;

use ngac_log::BackoffConfig;
use serde::{Deserialize, Serialize};

/// Default host of the event log server.
pub const DEFAULT_EVENT_LOG_HOST: &str = "localhost";

/// Default port of the event log server.
pub const DEFAULT_EVENT_LOG_PORT: u16 = 2113;

/// Default name of the stream holding all policy events.
pub const DEFAULT_STREAM: &str = "policy";

/// Default name of the consumer group replicas join.
pub const DEFAULT_CONSUMER_GROUP: &str = "policy-replica";

const MAX_ATTEMPTS: u32 = 3;
const RETRY_INTERVAL: Duration = Duration::from_secs(2);
const APPLY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REDELIVERIES: u32 = 3;
const CONSISTENCY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub event_log: EventLogConfig,

    /// Name of the single stream the whole policy is stored in.
    pub stream: String,

    /// Consumer group this replica joins.
    pub consumer_group: String,

    pub adjudicator: AdjudicatorConfig,

    pub subscriber: SubscriberConfig,

    pub consistency: ConsistencyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_log: EventLogConfig::default(),
            stream: DEFAULT_STREAM.to_owned(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_owned(),
            adjudicator: AdjudicatorConfig::default(),
            subscriber: SubscriberConfig::default(),
            consistency: ConsistencyConfig::default(),
        }
    }
}

/// Address of the event log server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogConfig {
    pub host: String,
    pub port: u16,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_EVENT_LOG_HOST.to_owned(),
            port: DEFAULT_EVENT_LOG_PORT,
        }
    }
}

/// Configuration parameters for adjudicating writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjudicatorConfig {
    /// Maximum number of attempts when appending events keeps conflicting.
    ///
    /// Default: 3.
    pub max_attempts: u32,

    /// Waiting time between two attempts.
    ///
    /// Default: 2 seconds.
    pub retry_interval: Duration,

    /// How long a write waits for the local replica to apply the events it published.
    ///
    /// Default: 5 seconds.
    pub apply_timeout: Duration,
}

impl AdjudicatorConfig {
    /// Return a default instance of `AdjudicatorConfig`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Define the maximum number of attempts, values below one are raised to one.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Define the waiting time between two attempts.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Define how long to wait for the local replica to apply published events.
    pub fn apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout = timeout;
        self
    }
}

impl Default for AdjudicatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            retry_interval: RETRY_INTERVAL,
            apply_timeout: APPLY_TIMEOUT,
        }
    }
}

/// Configuration parameters for replaying events on a replica.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// How often a failing event gets redelivered before it is parked and the replica locks
    /// down.
    ///
    /// Default: 3.
    pub max_redeliveries: u32,

    /// Backoff between attempts to re-establish a lost subscription.
    pub backoff: BackoffConfig,
}

impl SubscriberConfig {
    /// Return a default instance of `SubscriberConfig`.
    pub fn new() -> Self {
        Default::default()
    }

    pub fn max_redeliveries(mut self, redeliveries: u32) -> Self {
        self.max_redeliveries = redeliveries;
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: MAX_REDELIVERIES,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Configuration parameters for the revision consistency check of inbound requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// Time budget for a request to wait for the replica to catch up.
    ///
    /// Default: 5 seconds.
    pub timeout: Duration,

    /// Methods which are served without waiting for the replica, for example health checks.
    pub excluded_methods: BTreeSet<String>,
}

impl ConsistencyConfig {
    /// Return a default instance of `ConsistencyConfig`.
    pub fn new() -> Self {
        Default::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exclude a method from the consistency check.
    pub fn exclude(mut self, method: impl Into<String>) -> Self {
        self.excluded_methods.insert(method.into());
        self
    }

    pub fn is_excluded(&self, method: &str) -> bool {
        self.excluded_methods.contains(method)
    }
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            timeout: CONSISTENCY_TIMEOUT,
            excluded_methods: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{AdjudicatorConfig, Config, ConsistencyConfig};

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.event_log.host, "localhost");
        assert_eq!(config.event_log.port, 2113);
        assert_eq!(config.stream, "policy");
        assert_eq!(config.adjudicator.max_attempts, 3);
        assert_eq!(config.adjudicator.retry_interval, Duration::from_secs(2));
        assert_eq!(config.adjudicator.apply_timeout, Duration::from_secs(5));
        assert_eq!(config.subscriber.max_redeliveries, 3);
        assert_eq!(config.consistency.timeout, Duration::from_secs(5));
    }

    #[test]
    fn builders() {
        let config = AdjudicatorConfig::new()
            .max_attempts(0)
            .retry_interval(Duration::from_millis(10))
            .apply_timeout(Duration::from_millis(20));
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.retry_interval, Duration::from_millis(10));
        assert_eq!(config.apply_timeout, Duration::from_millis(20));

        let config = ConsistencyConfig::new()
            .timeout(Duration::from_millis(100))
            .exclude("Health/Check");
        assert!(config.is_excluded("Health/Check"));
        assert!(!config.is_excluded("Policy/CreateNode"));
    }
}
