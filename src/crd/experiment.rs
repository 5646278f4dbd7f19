//! ChaosExperiment Custom Resource Definition
//!
//! A ChaosExperiment names a set of pods (namespace + label selector), an
//! attack to run against them, and how often to run it. The status is owned
//! by the controller and is the durable record of the experiment's progress.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{deserialize_phase, AttackType, Condition, ExperimentMode, ExperimentPhase};
use crate::error::UNKNOWN_CONTEXT;
use crate::Error;

/// Specification for a ChaosExperiment
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "chaos.shanto.dev",
    version = "v1alpha1",
    kind = "ChaosExperiment",
    plural = "chaosexperiments",
    shortname = "chaos",
    namespaced,
    status = "ChaosExperimentStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Mode","type":"string","jsonPath":".spec.mode"}"#,
    printcolumn = r#"{"name":"Attack","type":"string","jsonPath":".spec.attack.type"}"#,
    printcolumn = r#"{"name":"Last Run","type":"date","jsonPath":".status.lastRunTime"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentSpec {
    /// Which pods the experiment may disrupt
    pub target: ExperimentTarget,

    /// What to do to a selected pod
    pub attack: ExperimentAttack,

    /// How long one run lasts, e.g. "30s", "5m", "1h30m"
    ///
    /// For one-shot experiments this is the time between the attack and
    /// completion. For recurring experiments it is the period between attacks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Execution mode ("one-shot" or "recurring")
    #[serde(default)]
    pub mode: ExperimentMode,
}

/// Selection criteria for the pods an experiment targets
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentTarget {
    /// Namespace the target pods live in
    pub namespace: String,

    /// Labels a pod must carry (all of them) to be a target
    pub label_selector: BTreeMap<String, String>,
}

impl ExperimentTarget {
    /// Render the selector in the `k1=v1,k2=v2` form the API server expects
    pub fn selector_string(&self) -> String {
        self.label_selector
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Attack configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ExperimentAttack {
    /// Attack kind; currently only "pod-kill" is supported
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub type_: AttackType,
}

impl ChaosExperimentSpec {
    /// Parse the optional duration
    pub fn duration(&self) -> Result<Option<Duration>, Error> {
        let Some(raw) = self.duration.as_deref() else {
            return Ok(None);
        };
        let parsed = humantime::parse_duration(raw.trim()).map_err(|e| {
            Error::validation_for(UNKNOWN_CONTEXT, format!("invalid duration '{raw}': {e}"))
        })?;
        if parsed.is_zero() {
            return Err(Error::validation_for(
                UNKNOWN_CONTEXT,
                "duration must be greater than zero",
            ));
        }
        Ok(Some(parsed))
    }

    /// Validate the spec, returning the parsed duration on success
    ///
    /// Admission validation is external, but a record that slipped past it must
    /// still end in a visible Failed state rather than a silent no-op.
    pub fn validate(&self, experiment: &str) -> Result<Option<Duration>, Error> {
        if self.target.namespace.trim().is_empty() {
            return Err(Error::validation_for(
                experiment,
                "target.namespace must not be empty",
            ));
        }
        if self.target.label_selector.is_empty() {
            return Err(Error::validation_for(
                experiment,
                "target.labelSelector must not be empty",
            ));
        }
        self.duration().map_err(|e| match e {
            Error::Validation { message, .. } => Error::validation_for(experiment, message),
            other => other,
        })
    }
}

/// Status for a ChaosExperiment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentStatus {
    /// Current phase; absent until the controller first sees the experiment
    #[serde(
        default,
        deserialize_with = "deserialize_phase",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<ExperimentPhase>")]
    pub phase: Option<ExperimentPhase>,

    /// When the most recent attack was executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<DateTime<Utc>>,

    /// Human-readable description of the current condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions for external tooling
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ChaosExperimentStatus {
    /// Set the phase and return self for chaining
    pub fn phase(mut self, phase: ExperimentPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Record an attack at the given time and return self for chaining
    pub fn last_run(mut self, at: DateTime<Utc>) -> Self {
        self.last_run_time = Some(at);
        self
    }

    /// Add a condition and return self for chaining
    ///
    /// Replaces any condition of the same type. `lastTransitionTime` is
    /// carried over when the condition's status did not change.
    pub fn condition(mut self, mut condition: Condition) -> Self {
        if let Some(existing) = self.conditions.iter().find(|c| c.type_ == condition.type_) {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
        }
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }
}
