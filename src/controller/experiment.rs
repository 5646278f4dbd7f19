//! ChaosExperiment controller implementation
//!
//! Reconciles ChaosExperiment resources through a phase state machine:
//! (none) → Pending → Running → Completed/Failed
//!
//! One-shot experiments stop at Completed or Failed. Recurring experiments
//! re-enter Running once their duration has elapsed since the last attack.
//! Every status write is persisted (conditional on the resourceVersion that
//! was read) before the next step is taken in the same invocation.
//!
//! The controller runtime serializes invocations per experiment; nothing here
//! locks on the experiment identity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::attack::{
    attack_for, execute, Attack, AttackFailure, AttackOutcome, AttackStep, DeleteOutcome, PodRef,
    TargetPicker, ThreadRngPicker,
};
use super::scheduler::{after_attack, decide, Decision};
use crate::config::ControllerConfig;
use crate::crd::{
    ChaosExperiment, ChaosExperimentStatus, Condition, ConditionStatus, ExperimentMode,
    ExperimentPhase,
};
use crate::events::{
    actions, reasons, EventPublisher, KubeEventPublisher, NoopEventPublisher, CONTROLLER_NAME,
};
use crate::Error;

const COMPLETED_MESSAGE: &str = "Experiment completed successfully.";
const COMPLETED_NO_DURATION_MESSAGE: &str =
    "One-shot experiment completed successfully (no duration specified).";

/// Trait abstracting the Kubernetes operations the state machine needs
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExperimentClient: Send + Sync {
    /// Fetch the latest copy of an experiment, `None` if it was deleted
    async fn get_experiment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChaosExperiment>, Error>;

    /// List pods in `namespace` matching a `k=v,k2=v2` label selector
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodRef>, Error>;

    /// Delete a pod; an already-deleted pod is reported as `NotFound`
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<DeleteOutcome, Error>;

    /// Replace the status of `experiment`
    ///
    /// The write is conditional on `experiment`'s resourceVersion and fails
    /// with [`Error::Conflict`] if the stored record has moved on. Returns
    /// the updated record.
    async fn update_status(
        &self,
        experiment: &ChaosExperiment,
        status: &ChaosExperimentStatus,
    ) -> Result<ChaosExperiment, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeExperimentClient {
    client: Client,
}

impl KubeExperimentClient {
    /// Create a new KubeExperimentClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExperimentClient for KubeExperimentClient {
    async fn get_experiment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChaosExperiment>, Error> {
        let api: Api<ChaosExperiment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodRef>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;

        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .map(|name| PodRef::new(namespace, name))
            .collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<DeleteOutcome, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(
        &self,
        experiment: &ChaosExperiment,
        status: &ChaosExperimentStatus,
    ) -> Result<ChaosExperiment, Error> {
        let name = experiment.name_any();
        let namespace = experiment.namespace().ok_or_else(|| {
            Error::internal_with_context("update_status", format!("{name} has no namespace"))
        })?;
        let resource_version = experiment.resource_version().ok_or_else(|| {
            Error::internal_with_context("update_status", format!("{name} has no resourceVersion"))
        })?;

        let api: Api<ChaosExperiment> = Api::namespaced(self.client.clone(), &namespace);

        // resourceVersion in the body turns the merge patch into a conditional write
        let status_patch = serde_json::json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status
        });

        api.patch_status(
            &name,
            &PatchParams::default(),
            &Patch::Merge(&status_patch),
        )
        .await
        .map_err(|e| Error::from_status_write(&name, e))
    }
}

/// Controller context shared across reconcile invocations
pub struct Context {
    /// Kubernetes operations (trait object for testability)
    pub client: Arc<dyn ExperimentClient>,
    /// Event sink for phase transitions
    pub events: Arc<dyn EventPublisher>,
    /// Randomness provider for target selection
    pub picker: Arc<dyn TargetPicker>,
    /// Revisit delays and deadline
    pub config: ControllerConfig,
}

impl Context {
    /// Create a production context from a kube Client
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let events: Arc<dyn EventPublisher> = if config.record_events {
            Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME))
        } else {
            Arc::new(NoopEventPublisher)
        };
        Self {
            client: Arc::new(KubeExperimentClient::new(client)),
            events,
            picker: Arc::new(ThreadRngPicker),
            config,
        }
    }

    /// Create a context for testing with custom collaborators
    ///
    /// This method is primarily for unit tests where a real Kubernetes
    /// client is not available. For production code, use [`Context::new`].
    #[cfg(test)]
    pub fn for_testing(
        client: Arc<dyn ExperimentClient>,
        events: Arc<dyn EventPublisher>,
        picker: Arc<dyn TargetPicker>,
    ) -> Self {
        Self {
            client,
            events,
            picker,
            config: ControllerConfig::default(),
        }
    }
}

/// Reconcile a ChaosExperiment resource
///
/// Runs one invocation of the state machine under the configured deadline.
/// On expiry the record is left in whatever state was last written.
#[instrument(
    skip(experiment, ctx),
    fields(
        experiment = %experiment.name_any(),
        namespace = %experiment.namespace().unwrap_or_default()
    )
)]
pub async fn reconcile(
    experiment: Arc<ChaosExperiment>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let deadline = ctx.config.reconcile_timeout;
    match tokio::time::timeout(deadline, reconcile_at(&experiment, &ctx, Utc::now())).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            experiment: experiment.name_any(),
            elapsed: deadline,
        }),
    }
}

/// Run one state machine invocation as of `now`
///
/// `trigger` only identifies the experiment; the latest copy is fetched before
/// any decision is made.
pub async fn reconcile_at(
    trigger: &ChaosExperiment,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let name = trigger.name_any();
    let namespace = trigger.namespace().ok_or_else(|| {
        Error::internal_with_context("reconcile", format!("{name} has no namespace"))
    })?;

    let Some(experiment) = ctx.client.get_experiment(&namespace, &name).await? else {
        debug!("experiment no longer exists");
        return Ok(Action::await_change());
    };

    StateMachine { ctx, name, now }.run(experiment).await
}

/// Requeue policy for failed invocations
pub fn error_policy(experiment: Arc<ChaosExperiment>, error: &Error, ctx: Arc<Context>) -> Action {
    match error {
        Error::Conflict { .. } => {
            debug!(
                experiment = %experiment.name_any(),
                "status write conflicted, refetching"
            );
            Action::requeue(ctx.config.conflict_backoff)
        }
        _ => {
            error!(
                ?error,
                experiment = %experiment.name_any(),
                retryable = error.is_retryable(),
                "reconciliation failed"
            );
            Action::requeue(ctx.config.error_backoff)
        }
    }
}

/// One invocation of the phase state machine
struct StateMachine<'a> {
    ctx: &'a Context,
    name: String,
    now: DateTime<Utc>,
}

impl StateMachine<'_> {
    async fn run(&self, experiment: ChaosExperiment) -> Result<Action, Error> {
        let mode = experiment.spec.mode;
        let validated = experiment.spec.validate(&self.name);
        let duration = validated.as_ref().ok().copied().flatten();
        let decision = decide(mode, duration, experiment.status.as_ref(), self.now);

        debug!(
            phase = ?experiment.status.as_ref().and_then(|s| s.phase),
            %mode,
            ?decision,
            "decided next step"
        );

        match decision {
            Decision::Initialize => {
                self.initialize(&experiment).await?;
                Ok(Action::requeue(self.ctx.config.init_revisit))
            }
            Decision::Terminate => {
                debug!("one-shot experiment finished, not requeueing");
                Ok(Action::await_change())
            }
            Decision::WaitFor(delay) => {
                debug!(?delay, "waiting for duration to elapse");
                Ok(Action::requeue(delay))
            }
            Decision::Complete | Decision::Retrigger | Decision::Attack => {
                let attack = match self.preflight(&experiment, validated).await? {
                    Some(attack) => attack,
                    None => return Ok(Action::await_change()),
                };

                let experiment = match decision {
                    Decision::Complete => {
                        let message = match duration {
                            Some(_) => COMPLETED_MESSAGE,
                            None => COMPLETED_NO_DURATION_MESSAGE,
                        };
                        let completed = self.complete(experiment, message).await?;
                        if mode == ExperimentMode::OneShot {
                            return Ok(Action::await_change());
                        }
                        self.retrigger(completed).await?
                    }
                    Decision::Retrigger => self.retrigger(experiment).await?,
                    _ => experiment,
                };

                self.attack(experiment, attack.as_ref(), duration).await
            }
        }
    }

    /// Check the spec and attack kind before touching any target
    ///
    /// Returns `None` after recording a misconfiguration as Failed.
    async fn preflight(
        &self,
        experiment: &ChaosExperiment,
        validated: Result<Option<Duration>, Error>,
    ) -> Result<Option<Box<dyn Attack>>, Error> {
        if let Err(e) = validated {
            warn!(error = %e, "experiment spec is invalid");
            let message = format!("Invalid experiment spec: {e}");
            self.fail(
                experiment,
                reasons::VALIDATION_FAILED,
                actions::VALIDATE,
                &message,
                message.clone(),
            )
            .await?;
            return Ok(None);
        }

        let kind = &experiment.spec.attack.type_;
        match attack_for(kind) {
            Some(attack) => Ok(Some(attack)),
            None => {
                warn!(attack = %kind, "unsupported attack type");
                self.fail(
                    experiment,
                    reasons::UNSUPPORTED_ATTACK,
                    actions::VALIDATE,
                    "Unsupported attack type.",
                    format!("ChaosExperiment specified an unsupported attack type: {kind}"),
                )
                .await?;
                Ok(None)
            }
        }
    }

    async fn initialize(&self, experiment: &ChaosExperiment) -> Result<ChaosExperiment, Error> {
        let status = self.status_for(
            experiment,
            ExperimentPhase::Pending,
            reasons::EXPERIMENT_INITIALIZED,
            "Experiment initialized and pending.",
        );
        let updated = self.write(experiment, status).await?;
        info!("experiment initialized");
        self.publish(
            &updated,
            EventType::Normal,
            reasons::EXPERIMENT_INITIALIZED,
            actions::RECONCILE,
            "ChaosExperiment is initialized.".to_string(),
        )
        .await;
        Ok(updated)
    }

    async fn complete(
        &self,
        experiment: ChaosExperiment,
        message: &str,
    ) -> Result<ChaosExperiment, Error> {
        let status = self.status_for(
            &experiment,
            ExperimentPhase::Completed,
            reasons::EXPERIMENT_COMPLETED,
            message,
        );
        let updated = self.write(&experiment, status).await?;
        self.completed(&updated).await;
        Ok(updated)
    }

    async fn completed(&self, experiment: &ChaosExperiment) {
        info!(mode = %experiment.spec.mode, "experiment run completed");
        self.publish(
            experiment,
            EventType::Normal,
            reasons::EXPERIMENT_COMPLETED,
            actions::RECONCILE,
            format!(
                "ChaosExperiment has completed its {} run.",
                experiment.spec.mode
            ),
        )
        .await;
    }

    async fn retrigger(&self, experiment: ChaosExperiment) -> Result<ChaosExperiment, Error> {
        let status = self.status_for(
            &experiment,
            ExperimentPhase::Running,
            reasons::EXPERIMENT_RETRIGGERED,
            "Recurring experiment re-triggered.",
        );
        let updated = self.write(&experiment, status).await?;
        info!("recurring experiment re-triggered");
        self.publish(
            &updated,
            EventType::Normal,
            reasons::EXPERIMENT_RETRIGGERED,
            actions::RECONCILE,
            "Recurring ChaosExperiment re-triggered.".to_string(),
        )
        .await;
        Ok(updated)
    }

    async fn attack(
        &self,
        experiment: ChaosExperiment,
        attack: &dyn Attack,
        duration: Option<Duration>,
    ) -> Result<Action, Error> {
        let config = &self.ctx.config;
        let outcome = execute(
            attack,
            self.ctx.client.as_ref(),
            self.ctx.picker.as_ref(),
            &experiment.spec.target,
        )
        .await;

        match outcome {
            Ok(AttackOutcome::Killed(pod)) => {
                let next = after_attack(experiment.spec.mode, duration, config.recurring_interval);

                // The kill and the end of a run without a duration share one write
                let status = match next {
                    Some(_) => self.status_for(
                        &experiment,
                        ExperimentPhase::Running,
                        reasons::POD_KILLED,
                        &format!("{} attack executed against pod {pod}.", attack.kind()),
                    ),
                    None => self.status_for(
                        &experiment,
                        ExperimentPhase::Completed,
                        reasons::EXPERIMENT_COMPLETED,
                        COMPLETED_NO_DURATION_MESSAGE,
                    ),
                }
                .last_run(self.now);
                let updated = self.write(&experiment, status).await?;
                self.publish(
                    &updated,
                    EventType::Normal,
                    reasons::POD_KILLED,
                    actions::ATTACK,
                    format!("Pod {pod} was successfully killed."),
                )
                .await;

                match next {
                    Some(delay) => Ok(Action::requeue(delay)),
                    None => {
                        self.completed(&updated).await;
                        Ok(Action::await_change())
                    }
                }
            }
            Ok(AttackOutcome::NoTargets) => {
                warn!(
                    selector = %experiment.spec.target.selector_string(),
                    "no target pods found"
                );
                self.fail(
                    &experiment,
                    reasons::NO_TARGET_PODS,
                    actions::ATTACK,
                    "No target pods found matching the label selector.",
                    "No target pods found for the experiment.".to_string(),
                )
                .await?;
                Ok(Action::requeue(config.no_targets_backoff))
            }
            Err(failure) => Err(self.attack_failed(&experiment, attack, failure).await),
        }
    }

    /// Record a list/delete failure and build the error handed to the runtime
    ///
    /// A failure to persist the Failed status is logged; the attack failure
    /// is what gets returned.
    async fn attack_failed(
        &self,
        experiment: &ChaosExperiment,
        attack: &dyn Attack,
        failure: AttackFailure,
    ) -> Error {
        let AttackFailure {
            step,
            target,
            source,
        } = failure;

        let (reason, message, note) = match (step, target) {
            (AttackStep::Apply, Some(pod)) => (
                reasons::POD_DELETION_FAILED,
                "Failed to delete target pod.",
                format!("Failed to delete pod {pod}: {source}"),
            ),
            _ => (
                reasons::POD_LIST_FAILED,
                "Failed to list target pods.",
                format!("Failed to list target pods: {source}"),
            ),
        };
        error!(error = %source, reason, "attack failed");

        if let Err(e) = self
            .fail(experiment, reason, actions::ATTACK, message, note.clone())
            .await
        {
            warn!(error = %e, "failed to persist Failed status");
        }

        Error::attack_for(&self.name, attack.kind().to_string(), note)
    }

    /// Persist phase Failed and emit a Warning event
    async fn fail(
        &self,
        experiment: &ChaosExperiment,
        reason: &str,
        action: &str,
        message: &str,
        note: String,
    ) -> Result<ChaosExperiment, Error> {
        let status = self.status_for(experiment, ExperimentPhase::Failed, reason, message);
        let updated = self.write(experiment, status).await?;
        self.publish(&updated, EventType::Warning, reason, action, note)
            .await;
        Ok(updated)
    }

    /// Next status: the current one with phase, message and conditions replaced
    fn status_for(
        &self,
        experiment: &ChaosExperiment,
        phase: ExperimentPhase,
        reason: &str,
        message: &str,
    ) -> ChaosExperimentStatus {
        let progressing = if phase.is_finished() {
            ConditionStatus::False
        } else {
            ConditionStatus::True
        };
        let degraded = if phase == ExperimentPhase::Failed {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };

        experiment
            .status
            .clone()
            .unwrap_or_default()
            .phase(phase)
            .message(message)
            .condition(Condition::new(
                "Progressing",
                progressing,
                reason,
                message,
                self.now,
            ))
            .condition(Condition::new("Degraded", degraded, reason, message, self.now))
    }

    async fn write(
        &self,
        experiment: &ChaosExperiment,
        status: ChaosExperimentStatus,
    ) -> Result<ChaosExperiment, Error> {
        let phase = status.phase;
        let updated = self.ctx.client.update_status(experiment, &status).await?;
        debug!(?phase, "status updated");
        Ok(updated)
    }

    async fn publish(
        &self,
        experiment: &ChaosExperiment,
        type_: EventType,
        reason: &str,
        action: &str,
        note: String,
    ) {
        let resource_ref = experiment.object_ref(&());
        self.ctx
            .events
            .publish(&resource_ref, type_, reason, action, Some(note))
            .await;
    }
}
