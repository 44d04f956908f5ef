//! Networking kinds. All three provision asynchronously and report `status.phase`.
//! Networks are also torn down asynchronously and pass through `DEPROVISIONING`.

use super::{require_reference, require_str};
use crate::model::access_point;
use reconcile_framework::attributes::Attributes;
use reconcile_framework::{FieldRule, Schema, StatusRules};

const PROVISIONING: StatusRules = StatusRules {
    pending: &["PROVISIONING"],
    ready: &["READY"],
    failed: &["FAILED"],
    deleting: &[],
};

pub static NETWORK: Schema = Schema {
    fields: &[
        FieldRule::computed("id"),
        FieldRule::computed("phase"),
        FieldRule::computed("resource_name"),
        FieldRule::computed("dns_domain"),
        FieldRule::computed("zonal_subdomains"),
        FieldRule::mutable("display_name"),
        FieldRule::immutable("cloud"),
        FieldRule::immutable("region"),
        FieldRule::immutable("cidr"),
        FieldRule::immutable("connection_types").unordered(),
        FieldRule::immutable("zones").unordered(),
        FieldRule::immutable("dns_config"),
        FieldRule::immutable("environment"),
    ],
    status: Some(StatusRules {
        deleting: &["DEPROVISIONING"],
        ..PROVISIONING
    }),
    validate: Some(validate_network),
};

fn validate_network(attrs: &Attributes) -> Result<(), String> {
    require_str(attrs, "cloud")?;
    require_str(attrs, "region")?;
    require_reference(attrs, "environment")?;
    match attrs.get("connection_types").and_then(|v| v.as_array()) {
        Some(types) if !types.is_empty() => Ok(()),
        _ => Err("connection_types must list at least one connection type".to_string()),
    }
}

pub static PRIVATE_LINK_ACCESS: Schema = Schema {
    fields: &[
        FieldRule::computed("id"),
        FieldRule::computed("phase"),
        FieldRule::mutable("display_name"),
        FieldRule::immutable("aws"),
        FieldRule::immutable("azure"),
        FieldRule::immutable("gcp"),
        FieldRule::immutable("environment"),
        FieldRule::immutable("network"),
    ],
    status: Some(PROVISIONING),
    validate: Some(validate_private_link_access),
};

fn validate_private_link_access(attrs: &Attributes) -> Result<(), String> {
    require_reference(attrs, "environment")?;
    require_reference(attrs, "network")?;
    let clouds = ["aws", "azure", "gcp"]
        .into_iter()
        .filter(|cloud| reconcile_framework::attributes::count(attrs, cloud) > 0)
        .count();
    if clouds == 1 {
        Ok(())
    } else {
        Err("exactly one of aws, azure or gcp must be set".to_string())
    }
}

/// Access points are removed synchronously: the delete response is final.
pub static ACCESS_POINT: Schema = Schema {
    fields: &[
        FieldRule::computed("id"),
        FieldRule::computed("phase"),
        FieldRule::mutable("display_name"),
        FieldRule::immutable("environment"),
        FieldRule::immutable("gateway"),
        FieldRule::immutable("aws_egress_private_link_endpoint"),
        FieldRule::computed("aws_egress_private_link_endpoint.vpc_endpoint_id"),
        FieldRule::computed("aws_egress_private_link_endpoint.vpc_endpoint_dns_name"),
        FieldRule::immutable("azure_egress_private_link_endpoint"),
        FieldRule::computed("azure_egress_private_link_endpoint.private_endpoint_resource_id"),
        FieldRule::computed("azure_egress_private_link_endpoint.private_endpoint_domain"),
        FieldRule::computed("azure_egress_private_link_endpoint.private_endpoint_ip_address"),
        FieldRule::computed(
            "azure_egress_private_link_endpoint.private_endpoint_custom_dns_config_domains",
        ),
    ],
    status: Some(PROVISIONING),
    validate: Some(access_point::validate),
};
