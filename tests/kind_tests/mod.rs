//! Integration tests for the kubechaos controller
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how a
//! user runs chaos experiments against real pods.
//!
//! # Test Organization
//!
//! - `crd_operations`: creating and reading ChaosExperiment resources through
//!   the Kubernetes API, including wire-format defaults
//!
//! - `experiment_lifecycle`: the controller driving experiments through
//!   Pending -> Running -> Completed/Failed against real pods
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --nocapture
//! ```

mod crd_operations;
mod experiment_lifecycle;
mod helpers;
