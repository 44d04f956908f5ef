//! # ResourceKind Trait & Schemas
//!
//! The `ResourceKind` trait is the contract every managed resource type (environment,
//! network, access point, ...) implements so the generic engine can reconcile it.
//! The engine is written *once* against this trait; the domain crate supplies an enum of
//! kinds and a static [`Schema`] per kind.
//!
//! A schema tells the engine three things:
//!
//! - **Field rules**: which attributes are mutable, immutable after create, or computed by
//!   the server, and which lists compare as sets.
//! - **Status rules**: which remote statuses are pending, ready, failed, or deleting.
//!   Kinds without asynchronous provisioning have no status rules and are ready as soon
//!   as a call returns.
//! - **Validation**: an optional check of the desired attributes, run before any
//!   Create/Update is sent.

use crate::attributes::{self, Attributes};
use serde_json::Value;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait that any resource type must implement to be managed by the engine.
///
/// Kinds are small `Copy` enums; the trait only maps a kind to its name and schema.
pub trait ResourceKind:
    Copy + Eq + Ord + Hash + Display + Debug + Send + Sync + 'static
{
    /// Stable name used in logs, errors and persisted state (e.g. `access_point`).
    fn name(&self) -> &'static str;

    /// The field and status rules for this kind.
    fn schema(&self) -> &'static Schema;

    /// Parses a name produced by [`ResourceKind::name`].
    fn from_name(name: &str) -> Option<Self>;
}

/// How a field behaves across the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    /// May change via Update.
    Mutable,
    /// Fixed at create; changing it is a configuration error.
    Immutable,
    /// Server-assigned; never compared.
    Computed,
}

/// How list values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrdering {
    Ordered,
    Unordered,
}

/// Rule for one dotted attribute path. Child paths inherit the rule of their
/// closest ancestor.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub path: &'static str,
    pub mode: FieldMode,
    pub ordering: ListOrdering,
    pub sensitive: bool,
    /// A map whose keys are all owned by the desired state: a key dropped from desired
    /// is drift and is cleared remotely.
    pub managed_keys: bool,
}

impl FieldRule {
    const fn new(path: &'static str, mode: FieldMode) -> Self {
        Self {
            path,
            mode,
            ordering: ListOrdering::Ordered,
            sensitive: false,
            managed_keys: false,
        }
    }

    pub const fn mutable(path: &'static str) -> Self {
        Self::new(path, FieldMode::Mutable)
    }

    pub const fn immutable(path: &'static str) -> Self {
        Self::new(path, FieldMode::Immutable)
    }

    pub const fn computed(path: &'static str) -> Self {
        Self::new(path, FieldMode::Computed)
    }

    /// Compare this list by set equality.
    pub const fn unordered(self) -> Self {
        Self {
            ordering: ListOrdering::Unordered,
            ..self
        }
    }

    /// Treat this map's key set as managed.
    pub const fn managed_keys(self) -> Self {
        Self {
            managed_keys: true,
            ..self
        }
    }

    /// Never log this value.
    pub const fn sensitive(self) -> Self {
        Self {
            sensitive: true,
            ..self
        }
    }
}

/// Classification of a remote status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Ready,
    Failed,
    Deleting,
}

/// Remote statuses of a kind with asynchronous provisioning.
#[derive(Debug, Clone, Copy)]
pub struct StatusRules {
    pub pending: &'static [&'static str],
    pub ready: &'static [&'static str],
    pub failed: &'static [&'static str],
    /// Non-empty when deletion is asynchronous and must be polled until gone.
    pub deleting: &'static [&'static str],
}

impl StatusRules {
    /// Classifies a status. A missing or unknown status is treated as pending so
    /// the poller keeps reading until the deadline.
    pub fn classify(&self, status: Option<&str>) -> Phase {
        let Some(status) = status else {
            return Phase::Pending;
        };
        let matches = |set: &[&str]| set.iter().any(|s| s.eq_ignore_ascii_case(status));
        if matches(self.ready) {
            Phase::Ready
        } else if matches(self.failed) {
            Phase::Failed
        } else if matches(self.deleting) {
            Phase::Deleting
        } else {
            Phase::Pending
        }
    }

    pub fn deletes_asynchronously(&self) -> bool {
        !self.deleting.is_empty()
    }
}

/// Static description of a resource kind.
pub struct Schema {
    pub fields: &'static [FieldRule],
    pub status: Option<StatusRules>,
    pub validate: Option<fn(&Attributes) -> Result<(), String>>,
}

impl Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields)
            .field("status", &self.status)
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

impl Schema {
    /// The rule for `path`: the longest rule path that equals it or is a
    /// segment-aligned prefix of it. List indices are ignored.
    pub fn rule_for(&self, path: &str) -> Option<&FieldRule> {
        let normalized = attributes::normalize_path(path);
        self.fields
            .iter()
            .filter(|rule| {
                normalized == rule.path
                    || normalized
                        .strip_prefix(rule.path)
                        .is_some_and(|rest| rest.starts_with('.'))
            })
            .max_by_key(|rule| rule.path.len())
    }

    /// Rules declared strictly beneath `path`.
    pub fn rules_below<'a>(&'a self, path: &str) -> impl Iterator<Item = &'a FieldRule> + 'a {
        let prefix = format!("{}.", attributes::normalize_path(path));
        self.fields
            .iter()
            .filter(move |rule| rule.path.starts_with(&prefix))
    }

    /// Whether `path` itself is a map with a managed key set.
    pub fn owns_keys(&self, path: &str) -> bool {
        let normalized = attributes::normalize_path(path);
        self.fields
            .iter()
            .any(|rule| rule.managed_keys && rule.path == normalized)
    }

    pub fn mode_of(&self, path: &str) -> FieldMode {
        self.rule_for(path).map_or(FieldMode::Mutable, |rule| rule.mode)
    }

    /// Classifies a remote status; kinds without status rules are always ready.
    pub fn classify(&self, status: Option<&str>) -> Phase {
        self.status
            .as_ref()
            .map_or(Phase::Ready, |rules| rules.classify(status))
    }

    pub fn check(&self, desired: &Attributes) -> Result<(), String> {
        self.validate.map_or(Ok(()), |validate| validate(desired))
    }

    /// Copy of `attrs` with sensitive values masked, for logging.
    pub fn redact(&self, attrs: &Attributes) -> Attributes {
        let mut out = Attributes::new();
        for (name, value) in attrs {
            out.insert(name.clone(), self.redact_value(name, value));
        }
        out
    }

    fn redact_value(&self, path: &str, value: &Value) -> Value {
        if self.rule_for(path).is_some_and(|rule| rule.sensitive) {
            return Value::String("(sensitive)".to_string());
        }
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.redact_value(&format!("{path}.{k}"), v)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.redact_value(path, v))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static SCHEMA: Schema = Schema {
        fields: &[
            FieldRule::computed("id"),
            FieldRule::mutable("display_name"),
            FieldRule::immutable("environment"),
            FieldRule::computed("credentials"),
            FieldRule::computed("credentials.secret").sensitive(),
            FieldRule::immutable("zones").unordered(),
        ],
        status: Some(StatusRules {
            pending: &["PROVISIONING"],
            ready: &["READY"],
            failed: &["FAILED"],
            deleting: &["DEPROVISIONING"],
        }),
        validate: None,
    };

    #[test]
    fn test_rule_lookup_inherits_from_block() {
        assert_eq!(SCHEMA.mode_of("environment.0.id"), FieldMode::Immutable);
        assert_eq!(SCHEMA.mode_of("display_name"), FieldMode::Mutable);
        assert_eq!(SCHEMA.mode_of("unknown"), FieldMode::Mutable);
        // "environment_name" must not inherit from "environment".
        assert_eq!(SCHEMA.mode_of("environment_name"), FieldMode::Mutable);
        assert!(SCHEMA.rule_for("credentials.0.secret").unwrap().sensitive);
    }

    #[test]
    fn test_nested_rules_and_managed_maps() {
        static NESTED: Schema = Schema {
            fields: &[
                FieldRule::immutable("dedicated"),
                FieldRule::mutable("dedicated.cku"),
                FieldRule::mutable("config").managed_keys(),
            ],
            status: None,
            validate: None,
        };
        let below: Vec<_> = NESTED.rules_below("dedicated.0").map(|r| r.path).collect();
        assert_eq!(below, vec!["dedicated.cku"]);
        assert_eq!(NESTED.rules_below("config").count(), 0);
        assert!(NESTED.owns_keys("config"));
        assert!(!NESTED.owns_keys("config.retention.ms"));
        assert!(!NESTED.owns_keys("dedicated"));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(SCHEMA.classify(Some("READY")), Phase::Ready);
        assert_eq!(SCHEMA.classify(Some("ready")), Phase::Ready);
        assert_eq!(SCHEMA.classify(Some("FAILED")), Phase::Failed);
        assert_eq!(SCHEMA.classify(Some("DEPROVISIONING")), Phase::Deleting);
        assert_eq!(SCHEMA.classify(Some("SOMETHING_NEW")), Phase::Pending);
        assert_eq!(SCHEMA.classify(None), Phase::Pending);
    }

    #[test]
    fn test_redact_masks_sensitive_values() {
        let attrs = json!({ "id": "key-1", "credentials": [{ "secret": "s3cr3t" }] })
            .as_object()
            .cloned()
            .unwrap();
        let redacted = SCHEMA.redact(&attrs);
        assert_eq!(
            attributes::get_str(&redacted, "credentials.0.secret"),
            Some("(sensitive)")
        );
        assert_eq!(attributes::get_str(&redacted, "id"), Some("key-1"));
    }
}
