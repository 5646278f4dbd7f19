//! Controller implementation for ChaosExperiment resources
//!
//! The state machine in [`reconcile`] asks the [`scheduler`] what to do, runs
//! an [`attack`] when told to, and persists every transition.

pub mod attack;
mod experiment;
pub mod scheduler;

pub use attack::{
    attack_for, Attack, AttackOutcome, DeleteOutcome, PodKill, PodRef, TargetPicker,
    ThreadRngPicker,
};
pub use experiment::{
    error_policy, reconcile, reconcile_at, Context, ExperimentClient, KubeExperimentClient,
};
pub use scheduler::{decide, Decision};
