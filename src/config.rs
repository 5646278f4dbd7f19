//! Controller tuning
//!
//! Revisit delays used by the experiment state machine, plus the event
//! recording switch. The defaults are the values the controller ships with;
//! the binary exposes each one as a flag.

use std::time::Duration;

/// Default revisit after an experiment is initialized to Pending
pub const DEFAULT_INIT_REVISIT: Duration = Duration::from_secs(5);

/// Default revisit after the selector matched no pods
pub const DEFAULT_NO_TARGETS_BACKOFF: Duration = Duration::from_secs(60);

/// Default revisit after a list/delete/status failure
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Default revisit after a status write lost an optimistic-concurrency race
pub const DEFAULT_CONFLICT_BACKOFF: Duration = Duration::from_secs(1);

/// Default period of a recurring experiment that has no duration
pub const DEFAULT_RECURRING_INTERVAL: Duration = Duration::from_secs(60);

/// Default deadline for a single reconcile invocation
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the experiment controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Revisit delay after initializing an experiment
    pub init_revisit: Duration,
    /// Revisit delay when no pods match the selector
    ///
    /// Longer than `error_backoff`: a selector that matches nothing is rarely
    /// fixed within seconds.
    pub no_targets_backoff: Duration,
    /// Revisit delay after a collaborator failure
    pub error_backoff: Duration,
    /// Revisit delay after a status write conflict
    pub conflict_backoff: Duration,
    /// Period between attacks for recurring experiments without a duration
    pub recurring_interval: Duration,
    /// Deadline for a single reconcile invocation
    pub reconcile_timeout: Duration,
    /// Publish Kubernetes Events for phase transitions
    pub record_events: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            init_revisit: DEFAULT_INIT_REVISIT,
            no_targets_backoff: DEFAULT_NO_TARGETS_BACKOFF,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            conflict_backoff: DEFAULT_CONFLICT_BACKOFF,
            recurring_interval: DEFAULT_RECURRING_INTERVAL,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            record_events: true,
        }
    }
}
