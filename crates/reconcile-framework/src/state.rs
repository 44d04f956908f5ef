//! # Persisted State
//!
//! A [`StateSnapshot`] records what the engine knows about every instance it manages
//! (remote id, status, last observed attributes) so a later run picks up where the
//! previous one stopped instead of creating everything again.
//!
//! Desired attributes are not part of the snapshot; they come from configuration. An
//! instance restored from a snapshot that is never re-applied is deleted by the next
//! pass.

use crate::attributes::Attributes;
use crate::entity::ResourceKind;
use crate::error::EngineError;
use crate::instance::{InstanceKey, InstanceStatus, ResourceInstance};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    pub kind: String,
    pub id: Option<String>,
    pub status: InstanceStatus,
    #[serde(default)]
    pub observed: Option<Attributes>,
    #[serde(default)]
    pub depends_on: BTreeSet<InstanceKey>,
    #[serde(default)]
    pub timeouts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub instances: BTreeMap<InstanceKey, InstanceState>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: VERSION,
            instances: BTreeMap::new(),
        }
    }
}

impl StateSnapshot {
    /// Captures every instance that still exists remotely or is mid-operation.
    pub fn capture<'a, K, I>(instances: I) -> Self
    where
        K: ResourceKind,
        I: IntoIterator<Item = &'a ResourceInstance<K>>,
    {
        let instances = instances
            .into_iter()
            .filter(|instance| instance.id.is_some())
            .map(|instance| {
                (
                    instance.key.clone(),
                    InstanceState {
                        kind: instance.kind.name().to_string(),
                        id: instance.id.clone(),
                        status: instance.status,
                        observed: instance.observed.clone(),
                        depends_on: instance.depends_on.clone(),
                        timeouts: instance.timeouts,
                        last_error: instance.last_error.clone(),
                    },
                )
            })
            .collect();
        Self {
            version: VERSION,
            instances,
        }
    }

    /// Rebuilds instances with no desired state; `apply` supplies it again.
    pub fn restore<K: ResourceKind>(&self) -> Result<Vec<ResourceInstance<K>>, EngineError> {
        self.instances
            .iter()
            .map(|(key, state)| {
                let kind = K::from_name(&state.kind)
                    .ok_or_else(|| EngineError::UnknownKind(state.kind.clone()))?;
                Ok(ResourceInstance {
                    key: key.clone(),
                    kind,
                    id: state.id.clone(),
                    desired: None,
                    observed: state.observed.clone(),
                    status: state.status,
                    depends_on: state.depends_on.clone(),
                    timeouts: state.timeouts,
                    last_error: state.last_error.clone(),
                })
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
