//! Requeue scheduler
//!
//! A pure decision table mapping (mode, duration, status, now) to the next
//! step of the experiment state machine. No I/O happens here; the state
//! machine performs whatever the decision asks for.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::crd::{ChaosExperimentStatus, ExperimentMode, ExperimentPhase};

/// What the state machine should do on this invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// First observation: set phase to Pending
    Initialize,
    /// Recurring experiment whose gate has elapsed: start a new cycle and attack
    Retrigger,
    /// Perform the attack now
    Attack,
    /// Nothing to do until the given delay has passed
    WaitFor(Duration),
    /// The duration since the last attack has elapsed: close the run
    Complete,
    /// Finished one-shot experiment: never act again
    Terminate,
}

/// Time since `last_run`, clamped to zero when the stored time lies in the future
pub fn elapsed_since(last_run: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - last_run).to_std().unwrap_or(Duration::ZERO)
}

/// Decide the next step for an experiment
///
/// Rules, in order:
/// 1. No phase: initialize.
/// 2. Completed/Failed: one-shot terminates; recurring waits out the rest of
///    the duration since the last attack, otherwise re-triggers.
/// 3. Pending/Running with a duration and a previous attack: complete once the
///    duration has elapsed, otherwise wait for the remainder. Waiting here
///    rather than attacking keeps a redelivered trigger from killing a second
///    pod inside the same duration window.
/// 4. Pending/Running one-shot without a duration that has already attacked:
///    complete.
/// 5. Otherwise attack.
pub fn decide(
    mode: ExperimentMode,
    duration: Option<Duration>,
    status: Option<&ChaosExperimentStatus>,
    now: DateTime<Utc>,
) -> Decision {
    let Some(phase) = status.and_then(|s| s.phase) else {
        return Decision::Initialize;
    };
    let elapsed = status
        .and_then(|s| s.last_run_time)
        .map(|last_run| elapsed_since(last_run, now));

    match phase {
        ExperimentPhase::Completed | ExperimentPhase::Failed => match mode {
            ExperimentMode::OneShot => Decision::Terminate,
            ExperimentMode::Recurring => match (duration, elapsed) {
                (Some(d), Some(e)) if e < d => Decision::WaitFor(d - e),
                _ => Decision::Retrigger,
            },
        },
        ExperimentPhase::Pending | ExperimentPhase::Running => match (duration, elapsed) {
            (Some(d), Some(e)) if e >= d => Decision::Complete,
            (Some(d), Some(e)) => Decision::WaitFor(d - e),
            // One-shot without a duration has had its single attack
            (None, Some(_)) if mode == ExperimentMode::OneShot => Decision::Complete,
            _ => Decision::Attack,
        },
    }
}

/// Revisit delay after a successful attack at `now`
///
/// `None` means the run is already over (one-shot without a duration).
pub fn after_attack(
    mode: ExperimentMode,
    duration: Option<Duration>,
    recurring_interval: Duration,
) -> Option<Duration> {
    match (mode, duration) {
        (_, Some(d)) => Some(d),
        (ExperimentMode::Recurring, None) => Some(recurring_interval),
        (ExperimentMode::OneShot, None) => None,
    }
}
