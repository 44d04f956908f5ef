//! # Resource Instances
//!
//! A [`ResourceInstance`] is the engine's record of one declared resource: its desired
//! attributes, the last observed attributes, the remote id and the lifecycle status.
//! Only the reconciler writes `observed` and `status`; everything else reads them.

use crate::attributes::{self, Attributes};
use crate::entity::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display};

/// Configuration address of an instance (e.g. `access_point.main`).
///
/// This is what `depends_on` refers to; the remote id is only known after create.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for InstanceKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Unmanaged,
    Creating,
    Provisioning,
    Ready,
    Updating,
    Deleting,
    Deleted,
    Errored,
}

impl InstanceStatus {
    /// A remote operation was started but has not reached a terminal state.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            InstanceStatus::Creating
                | InstanceStatus::Provisioning
                | InstanceStatus::Updating
                | InstanceStatus::Deleting
        )
    }
}

impl Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceStatus::Unmanaged => "unmanaged",
            InstanceStatus::Creating => "creating",
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Ready => "ready",
            InstanceStatus::Updating => "updating",
            InstanceStatus::Deleting => "deleting",
            InstanceStatus::Deleted => "deleted",
            InstanceStatus::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// The desired state of one instance as handed over by the configuration layer.
#[derive(Debug, Clone)]
pub struct DesiredDocument<K: ResourceKind> {
    pub key: InstanceKey,
    pub kind: K,
    pub attributes: Attributes,
    pub depends_on: BTreeSet<InstanceKey>,
}

impl<K: ResourceKind> DesiredDocument<K> {
    pub fn new(key: impl Into<InstanceKey>, kind: K, attributes: Attributes) -> Self {
        Self {
            key: key.into(),
            kind,
            attributes,
            depends_on: BTreeSet::new(),
        }
    }

    /// Adds an explicit dependency.
    pub fn depends_on(mut self, key: impl Into<InstanceKey>) -> Self {
        self.depends_on.insert(key.into());
        self
    }

    /// Explicit dependencies plus those implied by attribute references.
    pub fn effective_dependencies(&self) -> BTreeSet<InstanceKey> {
        let mut deps = self.depends_on.clone();
        deps.extend(attributes::references(&self.attributes));
        deps
    }
}

/// The engine's record of one managed instance.
#[derive(Debug, Clone)]
pub struct ResourceInstance<K: ResourceKind> {
    pub key: InstanceKey,
    pub kind: K,
    pub id: Option<String>,
    pub desired: Option<Attributes>,
    pub observed: Option<Attributes>,
    pub status: InstanceStatus,
    pub depends_on: BTreeSet<InstanceKey>,
    /// Consecutive provisioning timeouts since the instance was last ready.
    pub timeouts: u32,
    pub last_error: Option<String>,
}

impl<K: ResourceKind> ResourceInstance<K> {
    /// A fresh, never-created instance for a desired document.
    pub fn from_document(doc: DesiredDocument<K>) -> Self {
        let depends_on = doc.effective_dependencies();
        Self {
            key: doc.key,
            kind: doc.kind,
            id: None,
            desired: Some(doc.attributes),
            observed: None,
            status: InstanceStatus::Unmanaged,
            depends_on,
            timeouts: 0,
            last_error: None,
        }
    }

    pub fn target(&self) -> Target {
        Target {
            kind: self.kind.name(),
            key: self.key.clone(),
            id: self.id.clone(),
        }
    }

    /// Whether the instance should still exist remotely.
    pub fn is_desired(&self) -> bool {
        self.desired.is_some()
    }
}

/// Identifies the instance an error or log line refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: &'static str,
    pub key: InstanceKey,
    pub id: Option<String>,
}

impl Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} {} (id {})", self.kind, self.key, id),
            None => write!(f, "{} {} (not yet created)", self.kind, self.key),
        }
    }
}
