//! # Cloud Reconciler Demo
//!
//! Runs the full lifecycle of an AWS egress access point against an in-memory control
//! plane: create and poll until READY, rename in place, then delete.
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

use cloud_reconciler::lifecycle::ProviderSystem;
use cloud_reconciler::model::{ResourceType, AWS_BLOCK, AZURE_BLOCK};
use reconcile_framework::attributes::{self, Attributes};
use reconcile_framework::mock::{Operation, ScenarioMock, STARTED};
use reconcile_framework::tracing::setup_tracing;
use reconcile_framework::{Adapters, DesiredDocument, EngineConfig, OperationResult, PollPolicy};
use serde_json::json;
use tracing::{error, info, Instrument};

const KEY: &str = "access_point.main";
const SERVICE_NAME: &str = "com.amazonaws.vpce.us-west-2.vpce-svc-00000000000000000";

fn to_attributes(value: serde_json::Value) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}

fn desired(display_name: &str) -> DesiredDocument<ResourceType> {
    let attrs = to_attributes(json!({
        "display_name": display_name,
        "environment": [{ "id": "env-abc123" }],
        "gateway": [{ "id": "gw-abc123" }],
        AWS_BLOCK: [{ "vpc_endpoint_service_name": SERVICE_NAME }],
    }));
    DesiredDocument::new(KEY, ResourceType::AccessPoint, attrs)
}

fn reported(display_name: &str, ready: bool) -> Attributes {
    let mut endpoint = json!({ "vpc_endpoint_service_name": SERVICE_NAME });
    if ready {
        endpoint["vpc_endpoint_id"] = json!("vpce-00000000000000000");
        endpoint["vpc_endpoint_dns_name"] =
            json!("*.vpce-00000000000000000-abcd1234.s3.us-west-2.vpce.amazonaws.com");
    }
    to_attributes(json!({
        "id": "ap-abc123",
        "display_name": display_name,
        "environment": [{ "id": "env-abc123" }],
        "gateway": [{ "id": "gw-abc123" }],
        AWS_BLOCK: [endpoint],
        AZURE_BLOCK: [],
    }))
}

/// A control plane that provisions on the second read.
fn control_plane() -> ScenarioMock {
    let remote = ScenarioMock::new();
    remote
        .on(Operation::Create)
        .when_state(STARTED)
        .will_set_state("provisioning")
        .return_ok(OperationResult::with_status(reported("prod-ap-1", false), "PROVISIONING"));
    remote
        .on(Operation::Read)
        .when_state("provisioning")
        .will_set_state("created")
        .return_ok(OperationResult::with_status(reported("prod-ap-1", false), "PROVISIONING"));
    remote
        .on(Operation::Read)
        .when_state("created")
        .return_ok(OperationResult::with_status(reported("prod-ap-1", true), "READY"));
    remote
        .on(Operation::Update)
        .will_set_state("updated")
        .return_ok(OperationResult::with_status(reported("prod-ap-2", true), "READY"));
    remote
        .on(Operation::Delete)
        .in_any_state()
        .return_no_content();
    remote
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = EngineConfig {
        poll: PollPolicy {
            interval_ms: 200,
            ..PollPolicy::default()
        },
        ..EngineConfig::default()
    };
    let remote = control_plane();
    let system = ProviderSystem::with_adapters(
        config,
        Adapters::new().register(ResourceType::AccessPoint, remote.client()),
    );

    let steps = [
        ("create", Some(desired("prod-ap-1"))),
        ("rename", Some(desired("prod-ap-2"))),
        ("delete", None),
    ];
    for (step, document) in steps {
        let span = tracing::info_span!("step", step);
        let result = async {
            match document {
                Some(document) => system.engine.apply(document).await,
                None => system.engine.remove(KEY).await,
            }
            .map_err(|e| e.to_string())?;
            system.engine.converge().await.map_err(|e| e.to_string())
        }
        .instrument(span)
        .await?;

        for (key, outcome) in result.final_results() {
            match outcome {
                Ok(outcome) => info!(%key, action = %outcome.action, status = %outcome.status, "Step finished"),
                Err(e) => error!(%key, error = %e, "Step failed"),
            }
        }
        if let Some(instance) = system.engine.get(KEY).await.map_err(|e| e.to_string())? {
            let observed = instance.observed.unwrap_or_default();
            info!(
                id = ?instance.id,
                display_name = ?attributes::get_str(&observed, "display_name"),
                endpoint = ?attributes::get_str(&observed, &format!("{AWS_BLOCK}.0.vpc_endpoint_dns_name")),
                "Access point"
            );
        }
    }

    info!(calls = remote.calls().len(), "Remote calls made");
    system.shutdown().await.map_err(|e| e.to_string())
}
