//! # Access Point Model
//!
//! An access point is an egress endpoint in a gateway. Its endpoint is a tagged union:
//! exactly one of the AWS or Azure private link variants is set, and the API carries
//! the variant in a `kind` discriminator on both the requested config and the reported
//! status.
//!
//! Attributes use one block per variant (`aws_egress_private_link_endpoint`,
//! `azure_egress_private_link_endpoint`). The block of the active variant holds one
//! element; the other block is empty.

use reconcile_framework::attributes::{self, Attributes};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const AWS_BLOCK: &str = "aws_egress_private_link_endpoint";
pub const AZURE_BLOCK: &str = "azure_egress_private_link_endpoint";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessPointError {
    #[error("exactly one of aws_egress_private_link_endpoint or azure_egress_private_link_endpoint must be set")]
    NoEndpoint,
    #[error("only one of aws_egress_private_link_endpoint or azure_egress_private_link_endpoint may be set")]
    ConflictingEndpoints,
    #[error("{block} must contain exactly one element, found {count}")]
    BlockCount { block: &'static str, count: usize },
    #[error("{block}: {message}")]
    InvalidBlock { block: &'static str, message: String },
}

/// Reference to another resource by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsEgressConfig {
    pub vpc_endpoint_service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_high_availability: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureEgressConfig {
    pub private_link_service_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_link_subresource_name: Option<String>,
}

/// The requested endpoint variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EgressEndpointConfig {
    #[serde(rename = "AwsEgressPrivateLinkEndpoint")]
    Aws(AwsEgressConfig),
    #[serde(rename = "AzureEgressPrivateLinkEndpoint")]
    Azure(AzureEgressConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsEgressStatus {
    #[serde(default)]
    pub vpc_endpoint_id: String,
    #[serde(default)]
    pub vpc_endpoint_dns_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureEgressStatus {
    #[serde(default)]
    pub private_endpoint_resource_id: String,
    #[serde(default)]
    pub private_endpoint_domain: String,
    #[serde(default)]
    pub private_endpoint_ip_address: String,
    #[serde(default)]
    pub private_endpoint_custom_dns_config_domains: Vec<String>,
}

/// What the server reports about the endpoint once it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EgressEndpointStatus {
    #[serde(rename = "AwsEgressPrivateLinkEndpointStatus")]
    Aws(AwsEgressStatus),
    #[serde(rename = "AzureEgressPrivateLinkEndpointStatus")]
    Azure(AzureEgressStatus),
}

impl EgressEndpointConfig {
    /// Name of the attribute block this variant lives in.
    pub fn block(&self) -> &'static str {
        match self {
            EgressEndpointConfig::Aws(_) => AWS_BLOCK,
            EgressEndpointConfig::Azure(_) => AZURE_BLOCK,
        }
    }

    /// Reads the variant from attributes, requiring exactly one populated block.
    pub fn from_attributes(attrs: &Attributes) -> Result<Self, AccessPointError> {
        let aws = single_block(attrs, AWS_BLOCK)?;
        let azure = single_block(attrs, AZURE_BLOCK)?;
        match (aws, azure) {
            (Some(block), None) => parse_block(AWS_BLOCK, block).map(EgressEndpointConfig::Aws),
            (None, Some(block)) => {
                parse_block(AZURE_BLOCK, block).map(EgressEndpointConfig::Azure)
            }
            (Some(_), Some(_)) => Err(AccessPointError::ConflictingEndpoints),
            (None, None) => Err(AccessPointError::NoEndpoint),
        }
    }
}

fn single_block<'a>(
    attrs: &'a Attributes,
    block: &'static str,
) -> Result<Option<&'a Map<String, Value>>, AccessPointError> {
    match attrs.get(block) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => Ok(None),
            [Value::Object(map)] => Ok(Some(map)),
            [_] => Err(AccessPointError::InvalidBlock {
                block,
                message: "expected an object".to_string(),
            }),
            _ => Err(AccessPointError::BlockCount {
                block,
                count: items.len(),
            }),
        },
        Some(_) => Err(AccessPointError::InvalidBlock {
            block,
            message: "expected a block".to_string(),
        }),
    }
}

fn parse_block<T: for<'de> Deserialize<'de>>(
    block: &'static str,
    map: &Map<String, Value>,
) -> Result<T, AccessPointError> {
    serde_json::from_value(Value::Object(map.clone())).map_err(|e| {
        AccessPointError::InvalidBlock {
            block,
            message: e.to_string(),
        }
    })
}

fn reference_block(attrs: &Attributes, block: &'static str) -> Result<ObjectRef, AccessPointError> {
    let map = single_block(attrs, block)?.ok_or(AccessPointError::BlockCount { block, count: 0 })?;
    parse_block(block, map)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub config: EgressEndpointConfig,
    pub environment: ObjectRef,
    pub gateway: ObjectRef,
}

impl AccessPointSpec {
    pub fn from_attributes(attrs: &Attributes) -> Result<Self, AccessPointError> {
        Ok(Self {
            display_name: attributes::get_str(attrs, "display_name").map(str::to_string),
            config: EgressEndpointConfig::from_attributes(attrs)?,
            environment: reference_block(attrs, "environment")?,
            gateway: reference_block(attrs, "gateway")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointStatus {
    pub phase: String,
    #[serde(default)]
    pub config: Option<EgressEndpointStatus>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// An access point as the networking API returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub id: String,
    pub spec: AccessPointSpec,
    #[serde(default)]
    pub status: Option<AccessPointStatus>,
}

impl AccessPoint {
    pub fn phase(&self) -> Option<&str> {
        self.status.as_ref().map(|status| status.phase.as_str())
    }

    /// Flattens the API object into attributes, merging the reported status into
    /// the block of the active variant.
    pub fn to_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("id".to_string(), json!(self.id));
        if let Some(name) = &self.spec.display_name {
            attrs.insert("display_name".to_string(), json!(name));
        }
        attrs.insert(
            "environment".to_string(),
            json!([{ "id": self.spec.environment.id }]),
        );
        attrs.insert("gateway".to_string(), json!([{ "id": self.spec.gateway.id }]));

        let reported = self.status.as_ref().and_then(|status| status.config.as_ref());
        let mut block = match &self.spec.config {
            EgressEndpointConfig::Aws(config) => object_of(config),
            EgressEndpointConfig::Azure(config) => object_of(config),
        };
        match (&self.spec.config, reported) {
            (EgressEndpointConfig::Aws(_), Some(EgressEndpointStatus::Aws(status))) => {
                block.extend(object_of(status));
            }
            (EgressEndpointConfig::Azure(_), Some(EgressEndpointStatus::Azure(status))) => {
                block.extend(object_of(status));
            }
            _ => {}
        }
        let active = self.spec.config.block();
        for name in [AWS_BLOCK, AZURE_BLOCK] {
            let value = if name == active {
                Value::Array(vec![Value::Object(block.clone())])
            } else {
                Value::Array(Vec::new())
            };
            attrs.insert(name.to_string(), value);
        }

        if let Some(phase) = self.phase() {
            attrs.insert("phase".to_string(), json!(phase));
        }
        attrs
    }
}

fn object_of<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Checks desired access point attributes before any request is sent.
pub fn validate(attrs: &Attributes) -> Result<(), String> {
    AccessPointSpec::from_attributes(attrs)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn azure_desired() -> Attributes {
        attrs(json!({
            "display_name": "prod-ap-1",
            "environment": [{ "id": "env-abc123" }],
            "gateway": [{ "id": "gw-abc123" }],
            "azure_egress_private_link_endpoint": [{
                "private_link_service_resource_id": "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/s-abcde/providers/Microsoft.Network/privateLinkServices/pls-plt-abcdef-az3",
                "private_link_subresource_name": "sqlServer"
            }]
        }))
    }

    #[test]
    fn test_spec_from_azure_attributes() {
        let spec = AccessPointSpec::from_attributes(&azure_desired()).unwrap();
        assert_eq!(spec.display_name.as_deref(), Some("prod-ap-1"));
        assert_eq!(spec.environment.id, "env-abc123");
        match spec.config {
            EgressEndpointConfig::Azure(config) => {
                assert_eq!(config.private_link_subresource_name.as_deref(), Some("sqlServer"))
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_exactly_one_variant_is_required() {
        let mut none = azure_desired();
        none.insert(AZURE_BLOCK.to_string(), json!([]));
        assert_eq!(
            EgressEndpointConfig::from_attributes(&none),
            Err(AccessPointError::NoEndpoint)
        );

        let mut both = azure_desired();
        both.insert(
            AWS_BLOCK.to_string(),
            json!([{ "vpc_endpoint_service_name": "com.amazonaws.vpce.us-west-2.vpce-svc-00000000000000000" }]),
        );
        assert_eq!(
            EgressEndpointConfig::from_attributes(&both),
            Err(AccessPointError::ConflictingEndpoints)
        );
    }

    #[test]
    fn test_missing_required_field_names_the_block() {
        let desired = attrs(json!({
            "environment": [{ "id": "env-abc123" }],
            "gateway": [{ "id": "gw-abc123" }],
            "aws_egress_private_link_endpoint": [{}]
        }));
        let message = validate(&desired).unwrap_err();
        assert!(message.starts_with("aws_egress_private_link_endpoint: missing field"), "{message}");
    }

    #[test]
    fn test_missing_gateway_is_rejected() {
        let mut desired = azure_desired();
        desired.remove("gateway");
        assert_eq!(
            validate(&desired),
            Err("gateway must contain exactly one element, found 0".to_string())
        );
    }

    #[test]
    fn test_status_merges_into_active_block() {
        let access_point: AccessPoint = serde_json::from_value(json!({
            "id": "ap-abc123",
            "spec": {
                "display_name": "prod-ap-1",
                "config": {
                    "kind": "AwsEgressPrivateLinkEndpoint",
                    "vpc_endpoint_service_name": "com.amazonaws.vpce.us-west-2.vpce-svc-00000000000000000"
                },
                "environment": { "id": "env-abc123", "resource_name": "crn://confluent.cloud/environment=env-abc123" },
                "gateway": { "id": "gw-abc123" }
            },
            "status": {
                "phase": "READY",
                "config": {
                    "kind": "AwsEgressPrivateLinkEndpointStatus",
                    "vpc_endpoint_id": "vpce-00000000000000000",
                    "vpc_endpoint_dns_name": "*.vpce-00000000000000000-abcd1234.s3.us-west-2.vpce.amazonaws.com"
                }
            }
        }))
        .unwrap();

        let attrs = access_point.to_attributes();
        assert_eq!(attributes::count(&attrs, AWS_BLOCK), 1);
        assert_eq!(attributes::count(&attrs, AZURE_BLOCK), 0);
        assert_eq!(
            attributes::get_str(&attrs, "aws_egress_private_link_endpoint.0.vpc_endpoint_id"),
            Some("vpce-00000000000000000")
        );
        assert_eq!(attributes::get_str(&attrs, "gateway.0.id"), Some("gw-abc123"));
        assert_eq!(attributes::get_str(&attrs, "phase"), Some("READY"));
    }
}
