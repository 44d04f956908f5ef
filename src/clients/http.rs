//! # HTTP Remote Client
//!
//! [`HttpResourceClient`] implements the engine's [`RemoteClient`] contract over the
//! control-plane REST API. It owns no resource knowledge: paths and bodies come from
//! a [`PayloadCodec`], and every response goes through [`classify_response`]:
//!
//! | Response | Result |
//! |----------|--------|
//! | 2xx | decoded payload (empty body allowed for delete) |
//! | 404 | `NotFound` |
//! | 408, 429, 5xx, transport failure | `Transient` |
//! | any other 4xx | `Rejected`, with the remote's error detail verbatim |

use super::codec::{HttpCall, PayloadCodec};
use super::ProviderContext;
use async_trait::async_trait;
use reconcile_framework::attributes::Attributes;
use reconcile_framework::{ClientError, OperationResult, RemoteClient};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct HttpResourceClient {
    context: ProviderContext,
    codec: Arc<dyn PayloadCodec>,
}

impl HttpResourceClient {
    pub fn new(context: ProviderContext, codec: Arc<dyn PayloadCodec>) -> Self {
        Self { context, codec }
    }

    /// Sends one call and returns the response body, if any.
    async fn send(&self, call: HttpCall) -> Result<Option<Value>, ClientError> {
        let mut request = self.context.request(call.method.clone(), &call.path);
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transient(format!("{} {}: {e}", call.method, call.path)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transient(format!("reading response: {e}")))?;
        debug!(method = %call.method, path = %call.path, status = status.as_u16(), "Response");
        classify_response(status, &body)
    }

    fn decode(&self, body: Option<Value>) -> Result<OperationResult, ClientError> {
        let body = body.ok_or_else(|| {
            ClientError::Transient(format!("empty {} response body", self.codec.kind()))
        })?;
        Ok(self.codec.decode(body)?)
    }
}

#[async_trait]
impl RemoteClient for HttpResourceClient {
    #[instrument(skip_all)]
    async fn create(&self, desired: &Attributes) -> Result<OperationResult, ClientError> {
        let call = self.codec.create_call(desired)?;
        let body = self.send(call).await?;
        self.decode(body)
    }

    #[instrument(skip(self))]
    async fn read(&self, id: &str) -> Result<OperationResult, ClientError> {
        let path = self.codec.resource_path(id)?;
        let mut body = self
            .send(HttpCall::new(Method::GET, path.clone(), None))
            .await?;
        for expansion in self.codec.expansions() {
            let listing = self
                .send(HttpCall::new(Method::GET, format!("{path}/{expansion}"), None))
                .await?;
            if let (Some(Value::Object(object)), Some(listing)) = (body.as_mut(), listing) {
                object.insert(expansion.to_string(), listing);
            }
        }
        self.decode(body)
    }

    #[instrument(skip(self, desired))]
    async fn update(&self, id: &str, desired: &Attributes) -> Result<OperationResult, ClientError> {
        let mut last = None;
        for call in self.codec.update_calls(id, desired)? {
            last = self.send(call).await?;
        }
        match last {
            Some(body) => self.decode(Some(body)),
            // The update endpoint returned nothing; report what the server now has.
            None => self.read(id).await,
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<(), ClientError> {
        let path = self.codec.resource_path(id)?;
        self.send(HttpCall::new(Method::DELETE, path, None)).await?;
        Ok(())
    }
}

/// Classifies a response by status code. Successful bodies must be JSON or empty.
pub fn classify_response(status: StatusCode, body: &str) -> Result<Option<Value>, ClientError> {
    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(None);
        }
        return serde_json::from_str(body)
            .map(Some)
            .map_err(|e| ClientError::Transient(format!("unreadable response body: {e}")));
    }

    let detail = error_detail(status, body);
    match status {
        StatusCode::NOT_FOUND => Err(ClientError::NotFound),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Err(ClientError::Transient(format!("{}: {detail}", status.as_u16())))
        }
        s if s.is_server_error() => {
            Err(ClientError::Transient(format!("{}: {detail}", status.as_u16())))
        }
        _ => Err(ClientError::Rejected {
            status: status.as_u16(),
            message: detail,
        }),
    }
}

/// The remote's own description of an error: every `errors[].detail`, else the
/// raw body, else the status reason.
fn error_detail(status: StatusCode, body: &str) -> String {
    let details: Vec<String> = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("errors").and_then(Value::as_array).cloned())
        .unwrap_or_default()
        .iter()
        .filter_map(|error| error.get("detail").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    if !details.is_empty() {
        return details.join("; ");
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("no error detail")
        .to_string()
}
