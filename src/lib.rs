//! kubechaos - CRD-driven chaos experiments for Kubernetes
//!
//! A `ChaosExperiment` names a set of pods by namespace and label selector and
//! an attack to run against them. The controller walks each experiment through
//! an explicit phase state machine, killing one matching pod per run, either
//! once or on a recurring schedule.
//!
//! # Modules
//!
//! - [`crd`] - The ChaosExperiment Custom Resource Definition
//! - [`controller`] - Reconciliation: scheduler, attack executor, state machine
//! - [`events`] - Kubernetes Event publishing
//! - [`config`] - Controller timing configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
