//! Supporting types for the ChaosExperiment CRD

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Experiment lifecycle phase
///
/// Stored as an open string on the resource. An empty or unrecognized value
/// is read back as "no phase" (see [`deserialize_phase`]) so the record is
/// re-initialized rather than dropped by the watcher.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ExperimentPhase {
    /// Experiment is initialized and waiting for its first attack
    Pending,
    /// An attack has been executed and the experiment is active
    Running,
    /// The experiment (or one recurring cycle) finished
    Completed,
    /// The experiment hit an error or a misconfiguration
    Failed,
}

impl ExperimentPhase {
    /// Returns true for the phases a one-shot experiment never leaves
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for ExperimentPhase {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Running" => Ok(Self::Running),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            _ => Err(crate::Error::serialization(format!(
                "invalid experiment phase: {s}, expected one of: Pending, Running, Completed, Failed"
            ))),
        }
    }
}

impl std::fmt::Display for ExperimentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Read a stored phase string, normalizing empty or unknown values to `None`.
pub fn deserialize_phase<'de, D>(deserializer: D) -> Result<Option<ExperimentPhase>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// Execution mode of an experiment
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentMode {
    /// Run once, then stay Completed or Failed
    #[default]
    OneShot,
    /// Repeat indefinitely, gated by the experiment duration
    Recurring,
}

impl std::fmt::Display for ExperimentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneShot => write!(f, "one-shot"),
            Self::Recurring => write!(f, "recurring"),
        }
    }
}

/// Attack kind requested by the experiment
///
/// Unknown strings are kept verbatim so the controller can report them
/// instead of failing to decode the whole resource.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum AttackType {
    /// Delete one matching pod at random
    PodKill,
    /// Any attack string this controller does not implement
    Unsupported(String),
}

impl AttackType {
    /// Wire name of the pod-kill attack
    pub const POD_KILL: &'static str = "pod-kill";
}

impl From<String> for AttackType {
    fn from(s: String) -> Self {
        match s.as_str() {
            Self::POD_KILL => Self::PodKill,
            _ => Self::Unsupported(s),
        }
    }
}

impl From<AttackType> for String {
    fn from(attack: AttackType) -> Self {
        attack.to_string()
    }
}

impl std::fmt::Display for AttackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PodKill => write!(f, "{}", Self::POD_KILL),
            Self::Unsupported(s) => write!(f, "{s}"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
///
/// Written for external observability only; the controller never reads
/// conditions back when deciding what to do.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Progressing, Available, Degraded)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition stamped with the given time
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }
}
