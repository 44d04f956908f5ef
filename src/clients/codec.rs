//! # Payload Codecs
//!
//! A codec translates between attributes and one API's wire format: which path a
//! call goes to, how a request body is laid out, and how a response is flattened
//! back into attributes plus a remote status.
//!
//! Most control-plane APIs share one shape, handled by [`GenericCodec`]:
//!
//! ```text
//! { "id": "...", "spec": { ... }, "status": { "phase": "...", ... } }
//! ```
//!
//! Attribute blocks (lists holding one object) are sent as plain objects and come
//! back as one-element lists.

use super::ProviderError;
use reconcile_framework::attributes::Attributes;
use reconcile_framework::{FieldMode, OperationResult, Schema};
use reqwest::Method;
use serde_json::{Map, Value};

/// One HTTP request a codec asks the client to make.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl HttpCall {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }
}

pub trait PayloadCodec: Send + Sync {
    /// Kind name used in errors.
    fn kind(&self) -> &'static str;

    fn create_call(&self, desired: &Attributes) -> Result<HttpCall, ProviderError>;

    fn resource_path(&self, id: &str) -> Result<String, ProviderError>;

    /// The calls that apply `desired` to an existing resource, in order.
    fn update_calls(&self, id: &str, desired: &Attributes) -> Result<Vec<HttpCall>, ProviderError>;

    /// Sub-resources fetched after a read and merged into the body under their name.
    fn expansions(&self) -> &'static [&'static str] {
        &[]
    }

    fn decode(&self, body: Value) -> Result<OperationResult, ProviderError>;
}

/// Where an API keeps its writable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// Fields live under `spec`, status under `status`.
    Spec,
    /// Fields live at the top level; there is no status.
    Flat,
}

/// Codec for the common spec/status API shape.
pub struct GenericCodec {
    kind: &'static str,
    collection: &'static str,
    envelope: Envelope,
    schema: &'static Schema,
    /// Fields sent with every update even when immutable, e.g. the owning environment.
    scope: &'static [&'static str],
}

impl GenericCodec {
    pub fn new(
        kind: &'static str,
        collection: &'static str,
        envelope: Envelope,
        schema: &'static Schema,
    ) -> Self {
        Self {
            kind,
            collection,
            envelope,
            schema,
            scope: &[],
        }
    }

    pub fn with_scope(mut self, scope: &'static [&'static str]) -> Self {
        self.scope = scope;
        self
    }

    fn wrap(&self, fields: Map<String, Value>) -> Value {
        match self.envelope {
            Envelope::Spec => {
                let mut body = Map::new();
                body.insert("spec".to_string(), Value::Object(fields));
                Value::Object(body)
            }
            Envelope::Flat => Value::Object(fields),
        }
    }
}

impl PayloadCodec for GenericCodec {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn create_call(&self, desired: &Attributes) -> Result<HttpCall, ProviderError> {
        let fields = encode_fields(desired, |_| true);
        Ok(HttpCall::new(Method::POST, self.collection, Some(self.wrap(fields))))
    }

    fn resource_path(&self, id: &str) -> Result<String, ProviderError> {
        if id.is_empty() || id.contains('/') {
            return Err(ProviderError::encode(self.kind, format!("invalid id {id:?}")));
        }
        Ok(format!("{}/{}", self.collection, id))
    }

    fn update_calls(&self, id: &str, desired: &Attributes) -> Result<Vec<HttpCall>, ProviderError> {
        let fields = desired
            .iter()
            .filter(|(_, value)| !value.is_null())
            .filter_map(|(name, value)| {
                let part = if self.scope.contains(&name.as_str()) {
                    value.clone()
                } else {
                    updatable(self.schema, name, value)?
                };
                Some((name.clone(), encode_value(&part)))
            })
            .collect();
        Ok(vec![HttpCall::new(
            Method::PATCH,
            self.resource_path(id)?,
            Some(self.wrap(fields)),
        )])
    }

    fn decode(&self, body: Value) -> Result<OperationResult, ProviderError> {
        let Value::Object(mut body) = body else {
            return Err(ProviderError::decode(self.kind, "expected a JSON object"));
        };
        let mut attrs = Attributes::new();
        let id = body
            .remove("id")
            .ok_or_else(|| ProviderError::decode(self.kind, "missing id"))?;
        attrs.insert("id".to_string(), id);

        let status = body.remove("status");
        let fields = match self.envelope {
            Envelope::Spec => match body.remove("spec") {
                Some(Value::Object(spec)) => spec,
                _ => return Err(ProviderError::decode(self.kind, "missing spec")),
            },
            Envelope::Flat => {
                for envelope_field in ["api_version", "kind", "metadata"] {
                    body.remove(envelope_field);
                }
                body
            }
        };
        for (name, value) in fields {
            attrs.insert(name, decode_value(value));
        }

        let mut phase = None;
        let mut message = None;
        if let Some(Value::Object(status)) = status {
            for (name, value) in status {
                match name.as_str() {
                    "phase" => phase = value.as_str().map(str::to_string),
                    "error_message" => message = value.as_str().map(str::to_string),
                    "kind" => continue,
                    _ => {}
                }
                if !attrs.contains_key(&name) {
                    attrs.insert(name, decode_value(value));
                }
            }
        }

        Ok(OperationResult {
            payload: attrs,
            remote_status: phase,
            message,
        })
    }
}

/// Encodes the selected attributes, unwrapping one-element blocks into objects.
pub(crate) fn encode_fields(
    desired: &Attributes,
    include: impl Fn(&str) -> bool,
) -> Map<String, Value> {
    desired
        .iter()
        .filter(|(name, value)| !value.is_null() && include(name))
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

/// The part of `value` an update may change. A field whose nested rules all agree
/// with its own is kept whole when mutable; otherwise its children are projected
/// one by one, so a mutable leaf inside an immutable block is still sent.
fn updatable(schema: &Schema, path: &str, value: &Value) -> Option<Value> {
    let mode = schema.mode_of(path);
    let uniform = schema.rules_below(path).all(|rule| rule.mode == mode);
    if uniform {
        return (mode == FieldMode::Mutable).then(|| value.clone());
    }
    match value {
        Value::Object(block) => {
            let fields: Map<String, Value> = block
                .iter()
                .filter_map(|(name, child)| {
                    let part = updatable(schema, &format!("{path}.{name}"), child)?;
                    Some((name.clone(), part))
                })
                .collect();
            (!fields.is_empty()).then_some(Value::Object(fields))
        }
        Value::Array(items) => match items.as_slice() {
            [block] => updatable(schema, &format!("{path}.0"), block)
                .map(|part| Value::Array(vec![part])),
            _ => (mode == FieldMode::Mutable).then(|| value.clone()),
        },
        _ => (mode == FieldMode::Mutable).then(|| value.clone()),
    }
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Array(items) => match items.as_slice() {
            [Value::Object(block)] => Value::Object(block.clone()),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

fn decode_value(value: Value) -> Value {
    match value {
        Value::Object(block) => Value::Array(vec![Value::Object(block)]),
        other => other,
    }
}
