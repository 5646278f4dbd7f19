//! Attack execution
//!
//! An attack resolves the current set of target pods and applies one
//! disruptive action to a single member chosen at random. Membership is
//! re-resolved on every execution, so pods created or removed between runs
//! are picked up without any caching.

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::experiment::ExperimentClient;
use crate::crd::{AttackType, ExperimentTarget};
use crate::Error;

/// Identity of a pod eligible for an attack
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodRef {
    /// Namespace of the pod
    pub namespace: String,
    /// Name of the pod
    pub name: String,
}

impl PodRef {
    /// Create a pod reference
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of a delete call that did not fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The pod was deleted by this call
    Deleted,
    /// The pod was already gone
    NotFound,
}

/// Result of one attack execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttackOutcome {
    /// Exactly one member was disrupted (or had already vanished)
    Killed(PodRef),
    /// The selector matched nothing; no action was taken
    NoTargets,
}

/// Step of an attack that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttackStep {
    /// Listing candidate members
    ResolveTargets,
    /// Disrupting the chosen member
    Apply,
}

/// An attack that could not be carried out
#[derive(Debug)]
pub struct AttackFailure {
    /// Where the attack stopped
    pub step: AttackStep,
    /// Member the attack was applied to, when the failure happened in `Apply`
    pub target: Option<PodRef>,
    /// Underlying cause
    pub source: Error,
}

/// Source of randomness for choosing a target
///
/// Injected so tests can pin the selection.
#[cfg_attr(test, automock)]
pub trait TargetPicker: Send + Sync {
    /// Return an index in `0..len`; `len` is always at least one
    fn pick(&self, len: usize) -> usize;
}

/// Uniform selection using the thread-local generator
pub struct ThreadRngPicker;

impl TargetPicker for ThreadRngPicker {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// A disruptive action against one member of a target set
#[async_trait]
pub trait Attack: Send + Sync {
    /// Attack kind this implementation handles
    fn kind(&self) -> AttackType;

    /// List the members currently matching `target`
    async fn resolve_targets(
        &self,
        client: &dyn ExperimentClient,
        target: &ExperimentTarget,
    ) -> Result<Vec<PodRef>, Error>;

    /// Disrupt a single member
    async fn apply(
        &self,
        client: &dyn ExperimentClient,
        member: &PodRef,
    ) -> Result<DeleteOutcome, Error>;
}

/// Delete one matching pod
pub struct PodKill;

#[async_trait]
impl Attack for PodKill {
    fn kind(&self) -> AttackType {
        AttackType::PodKill
    }

    async fn resolve_targets(
        &self,
        client: &dyn ExperimentClient,
        target: &ExperimentTarget,
    ) -> Result<Vec<PodRef>, Error> {
        client
            .list_pods(&target.namespace, &target.selector_string())
            .await
    }

    async fn apply(
        &self,
        client: &dyn ExperimentClient,
        member: &PodRef,
    ) -> Result<DeleteOutcome, Error> {
        client.delete_pod(&member.namespace, &member.name).await
    }
}

/// Look up the implementation for an attack kind
///
/// Returns `None` for kinds this controller does not implement.
pub fn attack_for(kind: &AttackType) -> Option<Box<dyn Attack>> {
    match kind {
        AttackType::PodKill => Some(Box::new(PodKill)),
        AttackType::Unsupported(_) => None,
    }
}

/// Run one attack: resolve targets, pick one at random, apply the effect
///
/// Never touches more than one member. A member that vanished before the
/// effect landed counts as disrupted.
pub async fn execute(
    attack: &dyn Attack,
    client: &dyn ExperimentClient,
    picker: &dyn TargetPicker,
    target: &ExperimentTarget,
) -> Result<AttackOutcome, AttackFailure> {
    let members = attack
        .resolve_targets(client, target)
        .await
        .map_err(|source| AttackFailure {
            step: AttackStep::ResolveTargets,
            target: None,
            source,
        })?;

    if members.is_empty() {
        debug!(
            namespace = %target.namespace,
            selector = %target.selector_string(),
            "no targets matched"
        );
        return Ok(AttackOutcome::NoTargets);
    }

    let index = picker.pick(members.len());
    let member = members.get(index).cloned().ok_or_else(|| AttackFailure {
        step: AttackStep::ResolveTargets,
        target: None,
        source: Error::internal_with_context(
            "target selection",
            format!("picked index {index} of {} members", members.len()),
        ),
    })?;

    match attack.apply(client, &member).await {
        Ok(DeleteOutcome::Deleted) => {
            info!(
                attack = %attack.kind(),
                target = %member,
                candidates = members.len(),
                "attack applied"
            );
        }
        Ok(DeleteOutcome::NotFound) => {
            debug!(attack = %attack.kind(), target = %member, "target already gone");
        }
        Err(source) => {
            return Err(AttackFailure {
                step: AttackStep::Apply,
                target: Some(member),
                source,
            })
        }
    }

    Ok(AttackOutcome::Killed(member))
}
