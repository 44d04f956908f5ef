//! # Drift Detection
//!
//! Compares desired attributes against the last observed attributes under the kind's
//! field rules. The result lists every changed path; changes under an immutable rule
//! are reported separately so the reconciler can refuse them without a remote call.
//!
//! Comparison rules:
//!
//! - computed fields are never compared
//! - a field that is absent or `null` in desired is not compared (server default)
//! - objects recurse; ordered lists compare element by element
//! - unordered lists compare as sets
//! - an empty desired list or object equals an absent observed value
//! - a map with managed keys also reports observed keys missing from desired

use crate::attributes::Attributes;
use crate::entity::{FieldMode, ListOrdering, Schema};
use serde_json::Value;
use std::collections::BTreeSet;

/// Paths whose desired value differs from the observed one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    pub changed: BTreeSet<String>,
    pub immutable_violations: BTreeSet<String>,
}

impl DiffReport {
    pub fn has_change(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn has_immutable_violation(&self) -> bool {
        !self.immutable_violations.is_empty()
    }

    fn record(&mut self, schema: &Schema, path: &str) {
        if schema.mode_of(path) == FieldMode::Immutable {
            self.immutable_violations.insert(path.to_string());
        }
        self.changed.insert(path.to_string());
    }
}

/// Computes drift between `desired` and `observed`.
pub fn diff(schema: &Schema, desired: &Attributes, observed: &Attributes) -> DiffReport {
    let mut report = DiffReport::default();
    for (name, value) in desired {
        compare(schema, name, value, observed.get(name), &mut report);
    }
    report
}

fn compare(
    schema: &Schema,
    path: &str,
    desired: &Value,
    observed: Option<&Value>,
    report: &mut DiffReport,
) {
    if desired.is_null() || schema.mode_of(path) == FieldMode::Computed {
        return;
    }
    match (desired, observed) {
        (Value::Array(items), None | Some(Value::Null)) if items.is_empty() => {}
        (Value::Object(map), None | Some(Value::Null)) if map.is_empty() => {}
        (_, None | Some(Value::Null)) => report.record(schema, path),
        (Value::Object(want), Some(Value::Object(have))) => {
            for (name, value) in want {
                compare(schema, &format!("{path}.{name}"), value, have.get(name), report);
            }
            if schema.owns_keys(path) {
                for (name, value) in have {
                    if !value.is_null() && !want.contains_key(name) {
                        report.record(schema, &format!("{path}.{name}"));
                    }
                }
            }
        }
        (Value::Array(want), Some(Value::Array(have))) => {
            let unordered = schema
                .rule_for(path)
                .is_some_and(|rule| rule.ordering == ListOrdering::Unordered);
            if unordered {
                if !same_elements(want, have) {
                    report.record(schema, path);
                }
            } else if want.len() != have.len() {
                report.record(schema, path);
            } else {
                for (index, (w, h)) in want.iter().zip(have).enumerate() {
                    compare(schema, &format!("{path}.{index}"), w, Some(h), report);
                }
            }
        }
        (want, Some(have)) => {
            if want != have {
                report.record(schema, path);
            }
        }
    }
}

/// Copy of `desired` in which every key dropped from a managed-key map is set to
/// `null`, so an update can clear it remotely.
pub fn with_removed_keys(schema: &Schema, desired: &Attributes, observed: &Attributes) -> Attributes {
    let mut out = desired.clone();
    for (name, value) in out.iter_mut() {
        if let Some(have) = observed.get(name) {
            mark_removed(schema, name, value, have);
        }
    }
    out
}

fn mark_removed(schema: &Schema, path: &str, want: &mut Value, have: &Value) {
    match (want, have) {
        (Value::Object(want), Value::Object(have)) => {
            if schema.owns_keys(path) {
                for (name, value) in have {
                    if !value.is_null() && !want.contains_key(name) {
                        want.insert(name.clone(), Value::Null);
                    }
                }
            }
            for (name, value) in want.iter_mut() {
                if let Some(have) = have.get(name) {
                    mark_removed(schema, &format!("{path}.{name}"), value, have);
                }
            }
        }
        (Value::Array(want), Value::Array(have)) if want.len() == have.len() => {
            for (index, (w, h)) in want.iter_mut().zip(have).enumerate() {
                mark_removed(schema, &format!("{path}.{index}"), w, h);
            }
        }
        _ => {}
    }
}

/// Set equality. `Value` equality ignores object key order, so blocks compare by content.
fn same_elements(want: &[Value], have: &[Value]) -> bool {
    want.iter().all(|w| have.contains(w)) && have.iter().all(|h| want.contains(h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldRule;
    use serde_json::json;

    static SCHEMA: Schema = Schema {
        fields: &[
            FieldRule::computed("id"),
            FieldRule::mutable("display_name"),
            FieldRule::immutable("environment"),
            FieldRule::immutable("gateway"),
            FieldRule::immutable("azure_egress_private_link_endpoint"),
            FieldRule::computed("azure_egress_private_link_endpoint.private_endpoint_domain"),
            FieldRule::immutable("zones").unordered(),
            FieldRule::mutable("config"),
        ],
        status: None,
        validate: None,
    };

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn observed() -> Attributes {
        attrs(json!({
            "id": "ap-def456",
            "display_name": "prod-ap-1",
            "environment": [{ "id": "env-abc123" }],
            "gateway": [{ "id": "gw-abc123" }],
            "azure_egress_private_link_endpoint": [{
                "private_link_subresource_name": "sqlServer",
                "private_endpoint_domain": "dbname.database.windows.net"
            }],
            "zones": ["usw2-az1", "usw2-az2"],
            "config": { "retention.ms": "604800000", "cleanup.policy": "delete" }
        }))
    }

    #[test]
    fn test_no_drift_when_desired_matches() {
        let desired = attrs(json!({
            "display_name": "prod-ap-1",
            "environment": [{ "id": "env-abc123" }],
            "gateway": [{ "id": "gw-abc123" }],
            "azure_egress_private_link_endpoint": [{ "private_link_subresource_name": "sqlServer" }],
            "aws_egress_private_link_endpoint": [],
            "zones": ["usw2-az2", "usw2-az1"],
            "description": null
        }));
        let report = diff(&SCHEMA, &desired, &observed());
        assert!(!report.has_change(), "{report:?}");
    }

    #[test]
    fn test_mutable_change_is_reported() {
        let desired = attrs(json!({ "display_name": "prod-ap-2" }));
        let report = diff(&SCHEMA, &desired, &observed());
        assert_eq!(report.changed, BTreeSet::from(["display_name".to_string()]));
        assert!(!report.has_immutable_violation());
    }

    #[test]
    fn test_immutable_change_is_a_violation() {
        let desired = attrs(json!({
            "display_name": "prod-ap-2",
            "environment": [{ "id": "env-other" }],
            "zones": ["usw2-az1", "usw2-az3"]
        }));
        let report = diff(&SCHEMA, &desired, &observed());
        assert_eq!(
            report.immutable_violations,
            BTreeSet::from(["environment.0.id".to_string(), "zones".to_string()])
        );
        assert!(report.changed.contains("display_name"));
    }

    #[test]
    fn test_computed_fields_and_nested_maps() {
        let desired = attrs(json!({
            "id": "something-else",
            "azure_egress_private_link_endpoint": [{ "private_endpoint_domain": "other" }],
            "config": { "retention.ms": "86400000" }
        }));
        let report = diff(&SCHEMA, &desired, &observed());
        assert_eq!(
            report.changed,
            BTreeSet::from(["config.retention.ms".to_string()])
        );
    }

    #[test]
    fn test_unordered_blocks_ignore_key_order() {
        static RULES: Schema = Schema {
            fields: &[FieldRule::mutable("rules").unordered()],
            status: None,
            validate: None,
        };
        let desired = attrs(json!({
            "rules": [{ "port": 9092, "cidr": "10.0.0.0/16" }, { "port": 443, "cidr": "0.0.0.0/0" }]
        }));
        let observed = attrs(json!({
            "rules": [{ "cidr": "0.0.0.0/0", "port": 443 }, { "cidr": "10.0.0.0/16", "port": 9092 }]
        }));
        assert!(!diff(&RULES, &desired, &observed).has_change());

        let observed = attrs(json!({
            "rules": [{ "cidr": "0.0.0.0/0", "port": 443 }, { "cidr": "10.0.0.0/8", "port": 9092 }]
        }));
        let report = diff(&RULES, &desired, &observed);
        assert_eq!(report.changed, BTreeSet::from(["rules".to_string()]));
    }

    #[test]
    fn test_keys_dropped_from_a_managed_map_are_drift() {
        static TOPIC: Schema = Schema {
            fields: &[
                FieldRule::immutable("topic_name"),
                FieldRule::mutable("config").managed_keys(),
                FieldRule::mutable("labels"),
            ],
            status: None,
            validate: None,
        };
        let observed = attrs(json!({
            "topic_name": "orders",
            "config": { "retention.ms": "604800000", "cleanup.policy": "compact" },
            "labels": { "team": "payments", "tier": "gold" }
        }));
        let desired = attrs(json!({
            "topic_name": "orders",
            "config": { "retention.ms": "604800000" },
            "labels": { "team": "payments" }
        }));

        let report = diff(&TOPIC, &desired, &observed);
        assert_eq!(
            report.changed,
            BTreeSet::from(["config.cleanup.policy".to_string()])
        );

        let payload = with_removed_keys(&TOPIC, &desired, &observed);
        assert_eq!(
            Value::Object(payload),
            json!({
                "topic_name": "orders",
                "config": { "retention.ms": "604800000", "cleanup.policy": null },
                "labels": { "team": "payments" }
            })
        );
    }

    #[test]
    fn test_list_length_change() {
        let desired = attrs(json!({ "gateway": [{ "id": "gw-abc123" }, { "id": "gw-2" }] }));
        let report = diff(&SCHEMA, &desired, &observed());
        assert!(report.immutable_violations.contains("gateway"));
    }
}
