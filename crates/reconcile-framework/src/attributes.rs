//! # Attribute Model
//!
//! Desired and observed state are both plain attribute mappings: an insertion-ordered
//! JSON object (`serde_json` is built with `preserve_order`). Nested blocks follow the
//! block convention of declarative configuration languages: a block is a list of
//! objects, so a single `environment { id = ... }` block is `"environment": [{"id": ...}]`
//! and its count is the list length.
//!
//! Paths are dotted strings. Numeric segments index into lists:
//! `aws_egress_private_link_endpoint.0.vpc_endpoint_id`.
//!
//! ## References
//!
//! A desired value may point at a computed attribute of another instance:
//!
//! ```rust
//! use reconcile_framework::attributes::{self, Attributes};
//! use serde_json::json;
//!
//! let desired: Attributes = json!({
//!     "display_name": "app-manager",
//!     "owner": [{ "id": { "$ref": "service_account.app", "attribute": "id" } }]
//! })
//! .as_object()
//! .cloned()
//! .unwrap();
//!
//! let refs = attributes::references(&desired);
//! assert!(refs.contains("service_account.app"));
//! ```

use crate::instance::InstanceKey;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// An ordered attribute mapping.
pub type Attributes = Map<String, Value>;

const REF_KEY: &str = "$ref";
const REF_ATTRIBUTE: &str = "attribute";

/// Returns the value at a dotted path, indexing lists by numeric segments.
pub fn get_path<'a>(attrs: &'a Attributes, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = attrs.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Returns the string at a dotted path, if present.
pub fn get_str<'a>(attrs: &'a Attributes, path: &str) -> Option<&'a str> {
    get_path(attrs, path).and_then(Value::as_str)
}

/// Element count of the block or list at `path`; zero when absent.
///
/// This is the `block.#` count a configuration layer reports.
pub fn count(attrs: &Attributes, path: &str) -> usize {
    match get_path(attrs, path) {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        _ => 0,
    }
}

/// The remote identifier carried in a payload.
pub fn id_of(attrs: &Attributes) -> Option<&str> {
    attrs.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())
}

/// Strips list indices from a path so it can be matched against field rules.
pub fn normalize_path(path: &str) -> String {
    path.split('.')
        .filter(|segment| segment.parse::<usize>().is_err())
        .collect::<Vec<_>>()
        .join(".")
}

/// Builds an attribute reference value.
pub fn reference(key: &str, attribute: &str) -> Value {
    let mut map = Map::new();
    map.insert(REF_KEY.to_string(), Value::String(key.to_string()));
    map.insert(REF_ATTRIBUTE.to_string(), Value::String(attribute.to_string()));
    Value::Object(map)
}

fn as_reference(value: &Value) -> Option<(&str, &str)> {
    let map = value.as_object()?;
    let key = map.get(REF_KEY)?.as_str()?;
    let attribute = map.get(REF_ATTRIBUTE).and_then(Value::as_str).unwrap_or("id");
    Some((key, attribute))
}

/// All instance keys referenced anywhere in the mapping.
pub fn references(attrs: &Attributes) -> BTreeSet<InstanceKey> {
    let mut found = BTreeSet::new();
    for value in attrs.values() {
        collect_references(value, &mut found);
    }
    found
}

fn collect_references(value: &Value, found: &mut BTreeSet<InstanceKey>) {
    if let Some((key, _)) = as_reference(value) {
        found.insert(InstanceKey::from(key));
        return;
    }
    match value {
        Value::Object(map) => map.values().for_each(|v| collect_references(v, found)),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, found)),
        _ => {}
    }
}

/// A reference that could not be resolved against the current observed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub key: InstanceKey,
    pub attribute: String,
}

/// Replaces every reference with the referenced instance's observed value.
///
/// `lookup` returns the observed attributes of an instance, or `None` when the
/// instance is unknown or has not been observed yet.
pub fn resolve<'a, F>(attrs: &Attributes, lookup: F) -> Result<Attributes, UnresolvedReference>
where
    F: Fn(&InstanceKey) -> Option<&'a Attributes>,
{
    let mut resolved = Attributes::new();
    for (name, value) in attrs {
        resolved.insert(name.clone(), resolve_value(value, &lookup)?);
    }
    Ok(resolved)
}

fn resolve_value<'a, F>(value: &Value, lookup: &F) -> Result<Value, UnresolvedReference>
where
    F: Fn(&InstanceKey) -> Option<&'a Attributes>,
{
    if let Some((key, attribute)) = as_reference(value) {
        let key = InstanceKey::from(key);
        return lookup(&key)
            .and_then(|observed| get_path(observed, attribute))
            .cloned()
            .ok_or(UnresolvedReference {
                key,
                attribute: attribute.to_string(),
            });
    }
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (name, inner) in map {
                out.insert(name.clone(), resolve_value(inner, lookup)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|inner| resolve_value(inner, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}
