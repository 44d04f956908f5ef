use super::codec::{HttpCall, PayloadCodec};
use super::ProviderError;
use crate::model::{AccessPoint, AccessPointSpec};
use reconcile_framework::attributes::Attributes;
use reconcile_framework::OperationResult;
use reqwest::Method;
use serde_json::{json, Value};

const KIND: &str = "access_point";
pub const ACCESS_POINT_PATH: &str = "/networking/v1/access-points";

/// Codec for access points. Requests and responses go through the typed
/// [`AccessPoint`] model so the endpoint variant is carried by its `kind` tag.
#[derive(Debug, Default)]
pub struct AccessPointCodec;

impl AccessPointCodec {
    fn spec(desired: &Attributes) -> Result<AccessPointSpec, ProviderError> {
        AccessPointSpec::from_attributes(desired).map_err(|e| ProviderError::encode(KIND, e.to_string()))
    }
}

impl PayloadCodec for AccessPointCodec {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn create_call(&self, desired: &Attributes) -> Result<HttpCall, ProviderError> {
        let spec = serde_json::to_value(Self::spec(desired)?)
            .map_err(|e| ProviderError::encode(KIND, e.to_string()))?;
        Ok(HttpCall::new(
            Method::POST,
            ACCESS_POINT_PATH,
            Some(json!({ "spec": spec })),
        ))
    }

    fn resource_path(&self, id: &str) -> Result<String, ProviderError> {
        if id.is_empty() || id.contains('/') {
            return Err(ProviderError::encode(KIND, format!("invalid id {id:?}")));
        }
        Ok(format!("{ACCESS_POINT_PATH}/{id}"))
    }

    /// Only the display name can change; the environment scopes the request.
    fn update_calls(&self, id: &str, desired: &Attributes) -> Result<Vec<HttpCall>, ProviderError> {
        let spec = Self::spec(desired)?;
        let mut body = json!({ "environment": { "id": spec.environment.id } });
        if let Some(name) = spec.display_name {
            body["display_name"] = Value::String(name);
        }
        Ok(vec![HttpCall::new(
            Method::PATCH,
            self.resource_path(id)?,
            Some(json!({ "spec": body })),
        )])
    }

    fn decode(&self, body: Value) -> Result<OperationResult, ProviderError> {
        let access_point: AccessPoint =
            serde_json::from_value(body).map_err(|e| ProviderError::decode(KIND, e.to_string()))?;
        Ok(OperationResult {
            payload: access_point.to_attributes(),
            remote_status: access_point.phase().map(str::to_string),
            message: access_point
                .status
                .as_ref()
                .and_then(|status| status.error_message.clone()),
        })
    }
}
