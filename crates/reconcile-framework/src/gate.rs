//! # Dependency Gate
//!
//! Decides whether an instance may be mutated in the current pass. The gate works on a
//! read-only snapshot of every instance's status taken at the start of a pass, so it
//! never observes a half-finished pass.
//!
//! - Create/Update is granted only when every dependency is `ready`.
//! - Delete is not gated by the instance's own dependencies. It is forbidden while a
//!   dependent is still desired, and blocked until dependents being removed are gone.
//! - Instances on a dependency cycle are rejected before any remote call.

use crate::error::ReconcileError;
use crate::instance::{InstanceKey, InstanceStatus, ResourceInstance};
use crate::entity::ResourceKind;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Verdict of the gate for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    /// Retry on a later pass once these instances settle.
    Blocked { waiting_on: Vec<InstanceKey> },
    /// A configuration error: these instances still need this one.
    Forbidden { dependents: Vec<InstanceKey> },
}

impl Authorization {
    pub fn is_granted(&self) -> bool {
        matches!(self, Authorization::Granted)
    }
}

#[derive(Debug, Clone)]
struct GateEntry {
    status: InstanceStatus,
    desired: bool,
    has_id: bool,
    depends_on: BTreeSet<InstanceKey>,
}

/// Status view of all instances, as seen at the start of a pass.
#[derive(Debug, Clone, Default)]
pub struct DependencyGate {
    entries: BTreeMap<InstanceKey, GateEntry>,
}

impl DependencyGate {
    pub fn from_instances<'a, K, I>(instances: I) -> Self
    where
        K: ResourceKind,
        I: IntoIterator<Item = &'a ResourceInstance<K>>,
    {
        let entries = instances
            .into_iter()
            .map(|instance| {
                (
                    instance.key.clone(),
                    GateEntry {
                        status: instance.status,
                        desired: instance.is_desired(),
                        has_id: instance.id.is_some(),
                        depends_on: instance.depends_on.clone(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Every dependency of `key` exists and is ready.
    pub fn is_authorized(&self, key: &InstanceKey) -> bool {
        self.authorize(key).is_granted()
    }

    /// Authorization to Create or Update `key`.
    pub fn authorize(&self, key: &InstanceKey) -> Authorization {
        let Some(entry) = self.entries.get(key) else {
            return Authorization::Granted;
        };
        let waiting_on: Vec<InstanceKey> = entry
            .depends_on
            .iter()
            .filter(|dep| {
                !self
                    .entries
                    .get(*dep)
                    .is_some_and(|d| d.status == InstanceStatus::Ready && d.desired)
            })
            .cloned()
            .collect();
        if waiting_on.is_empty() {
            Authorization::Granted
        } else {
            Authorization::Blocked { waiting_on }
        }
    }

    /// Authorization to Delete `key`.
    pub fn authorize_delete(&self, key: &InstanceKey) -> Authorization {
        let mut still_desired = Vec::new();
        let mut being_removed = Vec::new();
        for dependent in self.dependents_of(key) {
            let Some(entry) = self.entries.get(&dependent) else {
                continue;
            };
            if entry.desired {
                still_desired.push(dependent);
            } else if entry.has_id && entry.status != InstanceStatus::Deleted {
                being_removed.push(dependent);
            }
        }
        if !still_desired.is_empty() {
            Authorization::Forbidden {
                dependents: still_desired,
            }
        } else if !being_removed.is_empty() {
            Authorization::Blocked {
                waiting_on: being_removed,
            }
        } else {
            Authorization::Granted
        }
    }

    /// Create/Update authorization for desired instances, Delete authorization otherwise.
    pub fn authorization_for(&self, key: &InstanceKey) -> Authorization {
        match self.entries.get(key) {
            Some(entry) if !entry.desired => self.authorize_delete(key),
            _ => self.authorize(key),
        }
    }

    /// Instances that declare a dependency on `key`, in key order.
    pub fn dependents_of(&self, key: &InstanceKey) -> Vec<InstanceKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.depends_on.contains(key))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    /// Strongly connected components that form a cycle (Tarjan). Components and their
    /// members are sorted so the result is deterministic.
    pub fn find_cycles(&self) -> Vec<Vec<InstanceKey>> {
        let mut tarjan = Tarjan::new(&self.entries);
        for key in self.entries.keys() {
            if !tarjan.index.contains_key(key) {
                tarjan.visit(key);
            }
        }
        let mut cycles: Vec<Vec<InstanceKey>> = tarjan
            .components
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component.first().is_some_and(|key| {
                        self.entries
                            .get(key)
                            .is_some_and(|entry| entry.depends_on.contains(key))
                    })
            })
            .map(|mut component| {
                component.sort();
                component
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Fails with the first cycle found.
    pub fn check_acyclic(&self) -> Result<(), ReconcileError> {
        match self.find_cycles().into_iter().next() {
            Some(members) => Err(ReconcileError::DependencyCycle { members }),
            None => Ok(()),
        }
    }
}

struct Tarjan<'a> {
    entries: &'a BTreeMap<InstanceKey, GateEntry>,
    next_index: usize,
    index: HashMap<&'a InstanceKey, usize>,
    low_link: HashMap<&'a InstanceKey, usize>,
    stack: Vec<&'a InstanceKey>,
    on_stack: BTreeSet<&'a InstanceKey>,
    components: Vec<Vec<InstanceKey>>,
}

impl<'a> Tarjan<'a> {
    fn new(entries: &'a BTreeMap<InstanceKey, GateEntry>) -> Self {
        Self {
            entries,
            next_index: 0,
            index: HashMap::new(),
            low_link: HashMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, key: &'a InstanceKey) {
        self.index.insert(key, self.next_index);
        self.low_link.insert(key, self.next_index);
        self.next_index += 1;
        self.stack.push(key);
        self.on_stack.insert(key);

        let entries = self.entries;
        if let Some(entry) = entries.get(key) {
            for dep in &entry.depends_on {
                // Unknown dependencies cannot be part of a cycle.
                let Some((dep, _)) = entries.get_key_value(dep) else {
                    continue;
                };
                if !self.index.contains_key(dep) {
                    self.visit(dep);
                    let low = self.low_link[key].min(self.low_link[dep]);
                    self.low_link.insert(key, low);
                } else if self.on_stack.contains(dep) {
                    let low = self.low_link[key].min(self.index[dep]);
                    self.low_link.insert(key, low);
                }
            }
        }

        if self.low_link[key] == self.index[key] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(member);
                component.push(member.clone());
                if member == key {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
