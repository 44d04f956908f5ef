//! Kafka kinds.
//!
//! Clusters provision asynchronously and report `PROVISIONED` when usable; a
//! dedicated cluster can be resized in place by changing `dedicated.cku`.
//! Topics are created synchronously on the cluster's REST endpoint, and only
//! their partition count and configuration can change afterwards.

use super::{require_reference, require_str};
use reconcile_framework::attributes::{self, Attributes};
use reconcile_framework::{FieldRule, Schema, StatusRules};
use serde_json::Value;

const CLUSTER_TYPES: [&str; 4] = ["basic", "standard", "enterprise", "dedicated"];

pub static KAFKA_CLUSTER: Schema = Schema {
    fields: &[
        FieldRule::computed("id"),
        FieldRule::computed("phase"),
        FieldRule::computed("bootstrap_endpoint"),
        FieldRule::computed("http_endpoint"),
        FieldRule::computed("rbac_crn"),
        FieldRule::mutable("display_name"),
        FieldRule::immutable("availability"),
        FieldRule::immutable("cloud"),
        FieldRule::immutable("region"),
        FieldRule::immutable("basic"),
        FieldRule::immutable("standard"),
        FieldRule::immutable("enterprise"),
        FieldRule::immutable("dedicated"),
        FieldRule::mutable("dedicated.cku"),
        FieldRule::immutable("environment"),
        FieldRule::immutable("network"),
    ],
    status: Some(StatusRules {
        pending: &["PROVISIONING"],
        ready: &["PROVISIONED"],
        failed: &["FAILED"],
        deleting: &[],
    }),
    validate: Some(validate_cluster),
};

fn validate_cluster(attrs: &Attributes) -> Result<(), String> {
    require_str(attrs, "cloud")?;
    require_str(attrs, "region")?;
    require_reference(attrs, "environment")?;

    let types: Vec<&str> = CLUSTER_TYPES
        .into_iter()
        .filter(|name| attrs.get(*name).is_some_and(|v| !v.is_null()))
        .collect();
    if types.len() != 1 {
        return Err(format!(
            "exactly one of {} must be set",
            CLUSTER_TYPES.join(", ")
        ));
    }
    if types[0] == "dedicated" {
        let cku = attributes::get_path(attrs, "dedicated.0.cku").and_then(Value::as_u64);
        let multi_zone = attributes::get_str(attrs, "availability") == Some("MULTI_ZONE");
        match cku {
            None | Some(0) => return Err("dedicated.cku must be at least 1".to_string()),
            Some(1) if multi_zone => {
                return Err("dedicated.cku must be at least 2 for MULTI_ZONE clusters".to_string())
            }
            _ => {}
        }
    }
    Ok(())
}

pub static KAFKA_TOPIC: Schema = Schema {
    fields: &[
        FieldRule::computed("id"),
        FieldRule::immutable("topic_name"),
        FieldRule::immutable("kafka_cluster"),
        FieldRule::mutable("partitions_count"),
        FieldRule::mutable("config").managed_keys(),
    ],
    status: None,
    validate: Some(validate_topic),
};

fn validate_topic(attrs: &Attributes) -> Result<(), String> {
    require_str(attrs, "topic_name")?;
    require_reference(attrs, "kafka_cluster")?;
    if let Some(partitions) = attrs.get("partitions_count") {
        if !partitions.as_u64().is_some_and(|n| n > 0) {
            return Err("partitions_count must be a positive integer".to_string());
        }
    }
    if let Some(config) = attrs.get("config") {
        let Some(config) = config.as_object() else {
            return Err("config must be a map of strings".to_string());
        };
        if let Some((name, _)) = config.iter().find(|(_, v)| !v.is_string()) {
            return Err(format!("config.{name} must be a string"));
        }
    }
    Ok(())
}
