use cloud_reconciler::lifecycle::ProviderSystem;
use cloud_reconciler::model::ResourceType;
use reconcile_framework::attributes::Attributes;
use reconcile_framework::mock::{Operation, ScenarioMock, STARTED};
use reconcile_framework::{
    Action, Adapters, ConvergeReport, ConvergeStop, DesiredDocument, EngineConfig, InstanceKey,
    InstanceStatus, OperationResult, Outcome, PollPolicy, ReconcileError, RetryPolicy,
    StateSnapshot,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;

const CLUSTER: &str = "kafka_cluster.orders";
const TOPIC: &str = "kafka_topic.orders";

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

fn cluster_desired(cku: u64) -> Attributes {
    attrs(json!({
        "display_name": "orders",
        "availability": "MULTI_ZONE",
        "cloud": "AWS",
        "region": "us-west-2",
        "dedicated": [{ "cku": cku }],
        "environment": [{ "id": "env-abc123" }]
    }))
}

fn cluster_payload(cku: u64) -> Attributes {
    let mut payload = cluster_desired(cku);
    payload.insert("id".to_string(), json!("lkc-abc123"));
    payload.insert(
        "bootstrap_endpoint".to_string(),
        json!("SASL_SSL://pkc-abc123.us-west-2.aws.confluent.cloud:9092"),
    );
    payload
}

fn cluster_document(cku: u64) -> DesiredDocument<ResourceType> {
    DesiredDocument::new(CLUSTER, ResourceType::KafkaCluster, cluster_desired(cku))
}

fn topic_desired(name: &str, partitions: u64) -> Attributes {
    attrs(json!({
        "topic_name": name,
        "kafka_cluster": [{ "id": "lkc-abc123" }],
        "partitions_count": partitions,
        "config": { "cleanup.policy": "compact" }
    }))
}

fn topic_payload(partitions: u64) -> Attributes {
    let mut payload = topic_desired("orders", partitions);
    payload.insert("id".to_string(), json!("lkc-abc123/orders"));
    payload
}

fn config(poll_timeout_ms: u64) -> EngineConfig {
    EngineConfig {
        poll: PollPolicy {
            interval_ms: 100,
            max_interval_ms: 100,
            timeout_ms: poll_timeout_ms,
            ..PollPolicy::default()
        },
        transient_retry: RetryPolicy::none(),
        max_provisioning_attempts: Some(2),
        pass_interval_ms: 50,
        ..EngineConfig::default()
    }
}

fn start(kind: ResourceType, remote: &ScenarioMock, config: EngineConfig) -> ProviderSystem {
    ProviderSystem::with_adapters(config, Adapters::new().register(kind, remote.client()))
}

fn result_of(report: &ConvergeReport, key: &str) -> Result<Outcome, ReconcileError> {
    report.final_results()[&InstanceKey::from(key)].clone()
}

/// A cluster that never leaves PROVISIONING.
fn stuck_cluster() -> ScenarioMock {
    let remote = ScenarioMock::new();
    remote
        .on(Operation::Create)
        .return_ok(OperationResult::with_status(cluster_payload(2), "PROVISIONING"));
    remote
        .on(Operation::Read)
        .for_id("lkc-abc123")
        .return_ok(OperationResult::with_status(cluster_payload(2), "PROVISIONING"));
    remote
}

#[tokio::test(start_paused = true)]
async fn test_stuck_provisioning_is_bounded() {
    let remote = stuck_cluster();
    let system = start(ResourceType::KafkaCluster, &remote, config(1_000));
    system.engine.apply(cluster_document(2)).await.unwrap();

    let started = Instant::now();
    let report = system.engine.converge().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.pass_count(), 2);
    assert_eq!(report.stop, ConvergeStop::Settled);
    assert!(!report.is_converged());
    match result_of(&report, CLUSTER) {
        Err(ReconcileError::ProvisioningTimeout {
            last_status,
            exhausted,
            ..
        }) => {
            assert_eq!(last_status, "PROVISIONING");
            assert!(exhausted);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(2_000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(3_000), "{elapsed:?}");

    let instance = system.engine.get(CLUSTER).await.unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Errored);
    assert_eq!(instance.id.as_deref(), Some("lkc-abc123"));
    assert_eq!(remote.count(Operation::Create), 1);

    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_provisioning_surfaces_the_remote_message() {
    let remote = ScenarioMock::new();
    remote
        .on(Operation::Create)
        .when_state(STARTED)
        .will_set_state("failing")
        .return_ok(OperationResult::with_status(cluster_payload(2), "PROVISIONING"));
    remote
        .on(Operation::Read)
        .for_id("lkc-abc123")
        .when_state("failing")
        .return_ok(
            OperationResult::with_status(cluster_payload(2), "FAILED")
                .with_message("insufficient capacity in us-west-2"),
        );
    let system = start(ResourceType::KafkaCluster, &remote, config(60_000));
    system.engine.apply(cluster_document(2)).await.unwrap();

    let report = system.engine.converge().await.unwrap();
    let error = result_of(&report, CLUSTER).unwrap_err();
    assert!(
        matches!(&error, ReconcileError::ProvisioningFailed { status, .. } if status == "FAILED"),
        "{error}"
    );
    assert!(error.to_string().ends_with("insufficient capacity in us-west-2"));
    assert!(error.to_string().contains("(id lkc-abc123)"));

    // An errored instance is not touched again.
    let calls = remote.calls().len();
    let report = system.engine.converge().await.unwrap();
    assert!(matches!(
        result_of(&report, CLUSTER),
        Err(ReconcileError::ProvisioningFailed { .. })
    ));
    assert_eq!(remote.calls().len(), calls);
    assert_eq!(
        system.engine.get(CLUSTER).await.unwrap().unwrap().status,
        InstanceStatus::Errored
    );

    remote.verify();
    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_provisioning_resumes_on_the_next_run() {
    let remote = ScenarioMock::new();
    remote
        .on(Operation::Create)
        .when_state(STARTED)
        .will_set_state("provisioning")
        .return_ok(OperationResult::with_status(cluster_payload(2), "PROVISIONING"));
    remote
        .on(Operation::Read)
        .for_id("lkc-abc123")
        .when_state("provisioning")
        .return_ok(OperationResult::with_status(cluster_payload(2), "PROVISIONING"));
    remote
        .on(Operation::Read)
        .for_id("lkc-abc123")
        .when_state("provisioned")
        .return_ok(OperationResult::with_status(cluster_payload(2), "PROVISIONED"));
    let system = start(ResourceType::KafkaCluster, &remote, config(600_000));
    system.engine.apply(cluster_document(2)).await.unwrap();

    let engine = system.engine.clone();
    let run = tokio::spawn(async move { engine.converge().await });
    tokio::time::sleep(Duration::from_millis(450)).await;
    system.cancel();
    let report = run.await.unwrap().unwrap();

    assert_eq!(report.stop, ConvergeStop::Cancelled);
    assert!(matches!(
        result_of(&report, CLUSTER),
        Err(ReconcileError::Cancelled { .. })
    ));
    let instance = system.engine.get(CLUSTER).await.unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Provisioning);
    assert_eq!(instance.id.as_deref(), Some("lkc-abc123"));

    remote.set_state("provisioned");
    let report = system.engine.converge().await.unwrap();
    assert!(report.is_converged(), "{report:?}");
    assert_eq!(result_of(&report, CLUSTER).unwrap().action, Action::Resumed);
    assert_eq!(remote.count(Operation::Create), 1);

    remote.verify();
    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resize_updates_in_place() {
    let remote = ScenarioMock::new();
    remote
        .on(Operation::Create)
        .return_ok(OperationResult::with_status(cluster_payload(2), "PROVISIONED"));
    remote
        .on(Operation::Update)
        .for_id("lkc-abc123")
        .will_set_state("resizing")
        .return_ok(OperationResult::with_status(cluster_payload(2), "PROVISIONING"));
    remote
        .on(Operation::Read)
        .for_id("lkc-abc123")
        .when_state("resizing")
        .return_ok(OperationResult::with_status(cluster_payload(4), "PROVISIONED"));
    let system = start(ResourceType::KafkaCluster, &remote, config(60_000));

    system.engine.apply(cluster_document(2)).await.unwrap();
    assert!(system.engine.converge().await.unwrap().is_converged());

    system.engine.apply(cluster_document(4)).await.unwrap();
    let report = system.engine.converge().await.unwrap();
    assert!(report.is_converged(), "{report:?}");
    assert_eq!(result_of(&report, CLUSTER).unwrap().action, Action::Updated);

    let observed = system.engine.get(CLUSTER).await.unwrap().unwrap().observed.unwrap();
    assert_eq!(observed["dedicated"][0]["cku"], json!(4));
    assert_eq!(remote.count(Operation::Update), 1);

    remote.verify();
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_cluster_size_is_rejected_before_any_call() {
    let remote = ScenarioMock::new();
    let system = start(ResourceType::KafkaCluster, &remote, config(60_000));
    system.engine.apply(cluster_document(1)).await.unwrap();

    let report = system.engine.converge().await.unwrap();
    let error = result_of(&report, CLUSTER).unwrap_err();
    assert!(
        matches!(error, ReconcileError::InvalidDesiredState { .. }),
        "{error}"
    );
    assert!(error
        .to_string()
        .ends_with("dedicated.cku must be at least 2 for MULTI_ZONE clusters"));
    assert!(remote.calls().is_empty());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_topic_rename_is_refused_and_partition_change_is_applied() {
    let remote = ScenarioMock::new();
    remote
        .on(Operation::Create)
        .return_ok(OperationResult::ready(topic_payload(6)));
    remote
        .on(Operation::Update)
        .for_id("lkc-abc123/orders")
        .return_ok(OperationResult::ready(topic_payload(12)));
    let system = start(ResourceType::KafkaTopic, &remote, config(60_000));

    let document = |name: &str, partitions| {
        DesiredDocument::new(TOPIC, ResourceType::KafkaTopic, topic_desired(name, partitions))
    };
    system.engine.apply(document("orders", 6)).await.unwrap();
    assert!(system.engine.converge().await.unwrap().is_converged());

    system.engine.apply(document("orders-v2", 6)).await.unwrap();
    let report = system.engine.converge().await.unwrap();
    match result_of(&report, TOPIC) {
        Err(ReconcileError::ImmutableFieldChanged { fields, .. }) => {
            assert_eq!(fields, vec!["topic_name".to_string()]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(remote.count(Operation::Update), 0);

    system.engine.apply(document("orders", 12)).await.unwrap();
    let report = system.engine.converge().await.unwrap();
    assert_eq!(result_of(&report, TOPIC).unwrap().action, Action::Updated);
    assert_eq!(remote.count(Operation::Update), 1);

    remote.verify();
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dropped_topic_config_is_cleared() {
    let with_retention = |retention: bool| {
        let mut attrs = topic_payload(6);
        if retention {
            attrs["config"]["retention.ms"] = json!("86400000");
        }
        attrs
    };
    let remote = ScenarioMock::new();
    remote
        .on(Operation::Create)
        .return_ok(OperationResult::ready(with_retention(true)));
    remote
        .on(Operation::Update)
        .for_id("lkc-abc123/orders")
        .return_ok(OperationResult::ready(with_retention(false)));
    let system = start(ResourceType::KafkaTopic, &remote, config(60_000));

    let mut desired = topic_desired("orders", 6);
    desired["config"]["retention.ms"] = json!("86400000");
    system
        .engine
        .apply(DesiredDocument::new(TOPIC, ResourceType::KafkaTopic, desired))
        .await
        .unwrap();
    assert!(system.engine.converge().await.unwrap().is_converged());

    let document = || {
        DesiredDocument::new(TOPIC, ResourceType::KafkaTopic, topic_desired("orders", 6))
    };
    system.engine.apply(document()).await.unwrap();
    let report = system.engine.converge().await.unwrap();
    assert_eq!(result_of(&report, TOPIC).unwrap().action, Action::Updated);

    let update = remote
        .calls()
        .into_iter()
        .find(|call| call.operation == Operation::Update)
        .unwrap();
    let body = update.body.unwrap();
    assert_eq!(
        body["config"],
        json!({ "cleanup.policy": "compact", "retention.ms": null })
    );

    // The remote no longer reports the key, so nothing is left to change.
    let report = system.engine.converge().await.unwrap();
    assert_eq!(result_of(&report, TOPIC).unwrap().action, Action::NoOp);
    assert_eq!(remote.count(Operation::Update), 1);

    remote.verify();
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restored_state_is_refreshed_without_a_create() {
    let remote = ScenarioMock::new();
    remote
        .on(Operation::Create)
        .return_ok(OperationResult::ready(topic_payload(6)));
    remote
        .on(Operation::Read)
        .for_id("lkc-abc123/orders")
        .return_ok(OperationResult::ready(topic_payload(6)));
    let document = || {
        DesiredDocument::new(TOPIC, ResourceType::KafkaTopic, topic_desired("orders", 6))
    };

    let system = start(ResourceType::KafkaTopic, &remote, config(60_000));
    system.engine.apply(document()).await.unwrap();
    assert!(system.engine.converge().await.unwrap().is_converged());
    let saved = system.engine.snapshot().await.unwrap().to_json().unwrap();
    system.shutdown().await.unwrap();

    // The restarted engine checks recorded instances against the remote first.
    let restarted = EngineConfig {
        refresh_before_plan: true,
        ..config(60_000)
    };
    let system = start(ResourceType::KafkaTopic, &remote, restarted);
    system
        .engine
        .restore(StateSnapshot::from_json(&saved).unwrap())
        .await
        .unwrap();
    system.engine.apply(document()).await.unwrap();
    let report = system.engine.converge().await.unwrap();

    assert!(report.is_converged(), "{report:?}");
    assert_eq!(result_of(&report, TOPIC).unwrap().action, Action::NoOp);
    assert_eq!(remote.count(Operation::Create), 1);
    assert_eq!(remote.count(Operation::Read), 1);

    remote.verify();
    system.shutdown().await.unwrap();
}
