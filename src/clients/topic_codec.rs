//! Codec for Kafka topics on a cluster's REST v3 API.
//!
//! Topics are addressed by cluster and name, so the id is the composite
//! `<cluster id>/<topic name>`. Topic configuration lives in a `configs`
//! sub-resource that is read after the topic itself and altered in one batch.
//! A config set to `null` is deleted, which resets it to the cluster default;
//! configs still at their default are left out when reading.

use super::codec::{HttpCall, PayloadCodec};
use super::ProviderError;
use reconcile_framework::attributes::{self, Attributes};
use reconcile_framework::OperationResult;
use reqwest::Method;
use serde_json::{json, Map, Value};

const KIND: &str = "kafka_topic";

#[derive(Debug, Default)]
pub struct KafkaTopicCodec;

fn topics_path(cluster: &str) -> String {
    format!("/kafka/v3/clusters/{cluster}/topics")
}

fn config_entries(desired: &Attributes) -> Option<Vec<Value>> {
    let config = desired.get("config")?.as_object()?;
    Some(
        config
            .iter()
            .map(|(name, value)| match value {
                Value::Null => json!({ "name": name, "operation": "DELETE" }),
                value => json!({ "name": name, "value": value }),
            })
            .collect(),
    )
}

impl PayloadCodec for KafkaTopicCodec {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn create_call(&self, desired: &Attributes) -> Result<HttpCall, ProviderError> {
        let cluster = attributes::get_str(desired, "kafka_cluster.0.id")
            .ok_or_else(|| ProviderError::encode(KIND, "kafka_cluster.id must be set"))?;
        let name = attributes::get_str(desired, "topic_name")
            .ok_or_else(|| ProviderError::encode(KIND, "topic_name must be set"))?;

        let mut body = json!({ "topic_name": name });
        if let Some(partitions) = desired.get("partitions_count") {
            body["partitions_count"] = partitions.clone();
        }
        if let Some(configs) = config_entries(desired) {
            body["configs"] = Value::Array(configs);
        }
        Ok(HttpCall::new(Method::POST, topics_path(cluster), Some(body)))
    }

    fn resource_path(&self, id: &str) -> Result<String, ProviderError> {
        match id.split_once('/') {
            Some((cluster, topic)) if !cluster.is_empty() && !topic.is_empty() => {
                Ok(format!("{}/{topic}", topics_path(cluster)))
            }
            _ => Err(ProviderError::encode(
                KIND,
                format!("id {id:?} is not of the form <cluster>/<topic>"),
            )),
        }
    }

    fn update_calls(&self, id: &str, desired: &Attributes) -> Result<Vec<HttpCall>, ProviderError> {
        let path = self.resource_path(id)?;
        let mut calls = Vec::new();
        if let Some(partitions) = desired.get("partitions_count") {
            calls.push(HttpCall::new(
                Method::PATCH,
                path.clone(),
                Some(json!({ "partitions_count": partitions })),
            ));
        }
        if let Some(configs) = config_entries(desired).filter(|c| !c.is_empty()) {
            calls.push(HttpCall::new(
                Method::POST,
                format!("{path}/configs:alter"),
                Some(json!({ "data": configs })),
            ));
        }
        Ok(calls)
    }

    fn expansions(&self) -> &'static [&'static str] {
        &["configs"]
    }

    fn decode(&self, body: Value) -> Result<OperationResult, ProviderError> {
        let cluster = body
            .get("cluster_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::decode(KIND, "missing cluster_id"))?;
        let name = body
            .get("topic_name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::decode(KIND, "missing topic_name"))?;

        let mut attrs = Attributes::new();
        attrs.insert("id".to_string(), json!(format!("{cluster}/{name}")));
        attrs.insert("topic_name".to_string(), json!(name));
        attrs.insert("kafka_cluster".to_string(), json!([{ "id": cluster }]));
        if let Some(partitions) = body.get("partitions_count") {
            attrs.insert("partitions_count".to_string(), partitions.clone());
        }

        // Inline on create, a `{ "data": [...] }` listing when expanded after a read.
        let entries = match body.get("configs") {
            Some(Value::Array(entries)) => Some(entries),
            Some(Value::Object(listing)) => listing.get("data").and_then(Value::as_array),
            _ => None,
        };
        if let Some(entries) = entries {
            let config: Map<String, Value> = entries
                .iter()
                .filter(|entry| entry.get("is_default") != Some(&Value::Bool(true)))
                .filter_map(|entry| {
                    let name = entry.get("name")?.as_str()?;
                    let value = entry.get("value")?;
                    Some((name.to_string(), value.clone()))
                })
                .collect();
            attrs.insert("config".to_string(), Value::Object(config));
        }
        Ok(OperationResult::ready(attrs))
    }
}
