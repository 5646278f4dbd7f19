//! Custom Resource Definitions for the chaos operator
//!
//! This module contains the ChaosExperiment CRD and its supporting types.

mod experiment;
mod types;

pub use experiment::{
    ChaosExperiment, ChaosExperimentSpec, ChaosExperimentStatus, ExperimentAttack,
    ExperimentTarget,
};
pub use types::{
    deserialize_phase, AttackType, Condition, ConditionStatus, ExperimentMode, ExperimentPhase,
};
