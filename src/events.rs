//! Kubernetes Event recording for the chaos controller.
//!
//! Every phase transition of a `ChaosExperiment` is paired with an Event so
//! the outcome of an experiment is visible via `kubectl describe` without
//! reading controller logs.
//!
//! Events are fire-and-forget: failures are logged as warnings and never
//! propagate errors.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Name reported as the "reportingComponent" on published Events
pub const CONTROLLER_NAME: &str = "kubechaos-controller";

/// Trait for publishing Kubernetes Events.
///
/// Implementations log a warning on failure but never return an error.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The experiment this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (see [`reasons`])
    /// * `action` - What action was taken (see [`actions`])
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as `controller_name`.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation, used when `ControllerConfig::record_events` is off.
///
/// All calls are silently ignored.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    /// First observation of an experiment; phase set to Pending
    pub const EXPERIMENT_INITIALIZED: &str = "ExperimentInitialized";
    /// A recurring experiment started a new cycle
    pub const EXPERIMENT_RETRIGGERED: &str = "ExperimentReTriggered";
    /// The attack deleted a target pod
    pub const POD_KILLED: &str = "PodKilled";
    /// The experiment (or one recurring cycle) finished
    pub const EXPERIMENT_COMPLETED: &str = "ExperimentCompleted";
    /// The label selector matched no pods
    pub const NO_TARGET_PODS: &str = "NoTargetPods";
    /// Listing candidate pods failed
    pub const POD_LIST_FAILED: &str = "PodListFailed";
    /// Deleting the selected pod failed
    pub const POD_DELETION_FAILED: &str = "PodDeletionFailed";
    /// The requested attack type is not implemented
    pub const UNSUPPORTED_ATTACK: &str = "UnsupportedAttackType";
    /// Spec validation failed
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
}

/// Well-known event action strings.
///
/// These appear in `kubectl get events` under the ACTION column.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Executing an attack against a target
    pub const ATTACK: &str = "Attack";
    /// Validating the experiment spec
    pub const VALIDATE: &str = "Validate";
}
