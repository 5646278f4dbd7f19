//! Integration tests for CRD operations
//!
//! These tests tell the story of how users create and inspect
//! ChaosExperiment resources through the Kubernetes API.

use std::collections::BTreeMap;

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::ResourceExt;

use kubechaos::crd::{
    AttackType, ChaosExperiment, ChaosExperimentSpec, ExperimentAttack, ExperimentMode,
    ExperimentTarget,
};

use super::helpers::{cleanup_experiment, ensure_namespace, ensure_test_cluster};

const NAMESPACE: &str = "kubechaos-crd";

fn sample_experiment(name: &str) -> ChaosExperiment {
    ChaosExperiment::new(
        name,
        ChaosExperimentSpec {
            target: ExperimentTarget {
                namespace: NAMESPACE.to_string(),
                label_selector: BTreeMap::from([("app".to_string(), "nginx".to_string())]),
            },
            attack: ExperimentAttack {
                type_: AttackType::PodKill,
            },
            duration: Some("30s".to_string()),
            mode: ExperimentMode::Recurring,
        },
    )
}

/// Story: a user applies an experiment and reads it back unchanged
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_user_creates_experiment() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, NAMESPACE)
        .await
        .expect("failed to create namespace");
    let api: Api<ChaosExperiment> = Api::namespaced(client.clone(), NAMESPACE);
    let name = "crd-create";
    cleanup_experiment(&client, NAMESPACE, name).await;

    let created = api
        .create(&PostParams::default(), &sample_experiment(name))
        .await
        .expect("failed to create experiment");

    assert_eq!(created.name_any(), name);
    assert!(created.status.is_none());

    let fetched = api.get(name).await.expect("failed to get experiment");
    assert_eq!(fetched.spec, sample_experiment(name).spec);

    cleanup_experiment(&client, NAMESPACE, name).await;
}

/// Story: a minimal manifest omits mode and duration and gets the defaults
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_minimal_manifest_defaults_to_one_shot() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, NAMESPACE)
        .await
        .expect("failed to create namespace");
    let api: Api<ChaosExperiment> = Api::namespaced(client.clone(), NAMESPACE);
    let name = "crd-minimal";
    cleanup_experiment(&client, NAMESPACE, name).await;

    let manifest = serde_json::json!({
        "apiVersion": "chaos.shanto.dev/v1alpha1",
        "kind": "ChaosExperiment",
        "metadata": { "name": name },
        "spec": {
            "target": { "namespace": NAMESPACE, "labelSelector": { "app": "nginx" } },
            "attack": { "type": "pod-kill" }
        }
    });
    api.patch(
        name,
        &PatchParams::apply("kubechaos-integration-test"),
        &Patch::Apply(&manifest),
    )
    .await
    .expect("failed to apply manifest");

    let fetched = api.get(name).await.expect("failed to get experiment");
    assert_eq!(fetched.spec.mode, ExperimentMode::OneShot);
    assert_eq!(fetched.spec.duration, None);

    cleanup_experiment(&client, NAMESPACE, name).await;
}
