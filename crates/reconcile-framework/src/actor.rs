//! # Reconciliation Engine
//!
//! `ReconcileEngine` is the server side of the engine. It owns the instance store and
//! processes [`EngineRequest`]s one at a time from its channel, so the store needs no
//! locks. A pass is the only place where work fans out:
//!
//! 1. Reject instances on a dependency cycle.
//! 2. Ask the [`DependencyGate`] for a verdict on every instance, using a status view
//!    taken before anything runs.
//! 3. Resolve attribute references against observed state.
//! 4. Move each instance into its own task. A task is the only writer of its instance
//!    and makes at most one remote call at a time.
//! 5. Collect the instances back, drop the deleted ones and report per instance.
//!
//! # Usage Pattern
//!
//! ```rust,ignore
//! let (engine, client) = ReconcileEngine::<ResourceType>::new(EngineConfig::default());
//! tokio::spawn(engine.run(adapters));
//!
//! client.apply(document).await?;
//! let report = client.converge().await?;
//! ```

use crate::attributes;
use crate::client::Adapters;
use crate::config::EngineConfig;
use crate::engine_client::EngineClient;
use crate::entity::ResourceKind;
use crate::error::{EngineError, ReconcileError};
use crate::gate::DependencyGate;
use crate::instance::{DesiredDocument, InstanceKey, InstanceStatus, ResourceInstance};
use crate::message::EngineRequest;
use crate::poller::{self, CancelHandle, ConvergencePoller};
use crate::reconciler::{Outcome, Reconciler};
use crate::report::{ConvergeStop, ConvergeReport, PassReport};
use crate::state::StateSnapshot;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// The engine that manages every declared instance.
pub struct ReconcileEngine<K: ResourceKind> {
    receiver: mpsc::Receiver<EngineRequest<K>>,
    store: BTreeMap<InstanceKey, ResourceInstance<K>>,
    config: EngineConfig,
    cancel: CancelHandle,
    passes: u64,
}

/// Work prepared for one instance before the pass fans out.
struct Planned<K: ResourceKind> {
    reconciler: Reconciler,
    desired: Option<attributes::Attributes>,
    authorization: crate::gate::Authorization,
    instance: ResourceInstance<K>,
}

impl<K: ResourceKind> ReconcileEngine<K> {
    /// Creates the engine and its client.
    pub fn new(config: EngineConfig) -> (Self, EngineClient<K>) {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        let (cancel, _) = poller::cancellation();
        let engine = Self {
            receiver,
            store: BTreeMap::new(),
            config,
            cancel: cancel.clone(),
            passes: 0,
        };
        (engine, EngineClient::new(sender, cancel))
    }

    /// Processes requests until every client is dropped.
    pub async fn run(mut self, adapters: Adapters<K>) {
        let adapters = adapters.with_retry(&self.config.transient_retry, &self.cancel.token());
        info!("Engine started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                EngineRequest::Apply {
                    document,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.apply(document, &adapters));
                }
                EngineRequest::Remove { key, respond_to } => {
                    let _ = respond_to.send(self.remove(key));
                }
                EngineRequest::Get { key, respond_to } => {
                    let instance = self.store.get(&key).cloned();
                    debug!(%key, found = instance.is_some(), "Get");
                    let _ = respond_to.send(Ok(instance));
                }
                EngineRequest::RunPass { respond_to } => {
                    self.cancel.reset();
                    let report = self.run_pass(&adapters).await;
                    let _ = respond_to.send(Ok(report));
                }
                EngineRequest::Converge { respond_to } => {
                    self.cancel.reset();
                    let report = self.converge(&adapters).await;
                    let _ = respond_to.send(Ok(report));
                }
                EngineRequest::Refresh { key, respond_to } => {
                    let _ = respond_to.send(self.refresh(key, &adapters).await);
                }
                EngineRequest::Snapshot { respond_to } => {
                    let _ = respond_to.send(Ok(StateSnapshot::capture(self.store.values())));
                }
                EngineRequest::Restore {
                    snapshot,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.restore(snapshot, &adapters));
                }
            }
        }

        info!(size = self.store.len(), "Shutdown");
    }

    fn apply(&mut self, document: DesiredDocument<K>, adapters: &Adapters<K>) -> Result<(), EngineError> {
        if !adapters.contains(document.kind) {
            return Err(EngineError::UnregisteredKind(document.kind.name()));
        }
        let key = document.key.clone();
        match self.store.get_mut(&key) {
            Some(existing) if existing.kind != document.kind => Err(EngineError::KindMismatch {
                key,
                existing: existing.kind.name(),
                requested: document.kind.name(),
            }),
            Some(existing) => {
                existing.depends_on = document.effective_dependencies();
                existing.desired = Some(document.attributes);
                // A create the remote refused gets another chance with the new document.
                if existing.id.is_none()
                    && matches!(existing.status, InstanceStatus::Errored | InstanceStatus::Deleted)
                {
                    existing.status = InstanceStatus::Unmanaged;
                    existing.last_error = None;
                }
                debug!(%key, "Desired state updated");
                Ok(())
            }
            None => {
                debug!(%key, kind = %document.kind, "Declared");
                self.store
                    .insert(key, ResourceInstance::from_document(document));
                Ok(())
            }
        }
    }

    fn remove(&mut self, key: InstanceKey) -> Result<(), EngineError> {
        match self.store.get_mut(&key) {
            Some(instance) => {
                instance.desired = None;
                debug!(%key, "Marked for deletion");
                Ok(())
            }
            None => {
                warn!(%key, "Not found");
                Err(EngineError::UnknownInstance(key))
            }
        }
    }

    fn restore(&mut self, snapshot: StateSnapshot, adapters: &Adapters<K>) -> Result<(), EngineError> {
        let instances = snapshot.restore::<K>()?;
        if let Some(instance) = instances.iter().find(|i| !adapters.contains(i.kind)) {
            return Err(EngineError::UnregisteredKind(instance.kind.name()));
        }
        for instance in instances {
            self.store.entry(instance.key.clone()).or_insert(instance);
        }
        info!(size = self.store.len(), "State restored");
        Ok(())
    }

    fn reconciler_for(&self, kind: K, adapters: &Adapters<K>) -> Option<Reconciler> {
        let client = adapters.get(kind)?;
        let poller = ConvergencePoller::new(self.config.poll.clone(), self.cancel.token());
        Some(
            Reconciler::new(client, poller)
                .with_max_provisioning_attempts(self.config.max_provisioning_attempts)
                .with_refresh_before_plan(self.config.refresh_before_plan),
        )
    }

    async fn refresh(&mut self, key: InstanceKey, adapters: &Adapters<K>) -> Result<Outcome, EngineError> {
        let kind = self
            .store
            .get(&key)
            .map(|instance| instance.kind)
            .ok_or_else(|| EngineError::UnknownInstance(key.clone()))?;
        let reconciler = self
            .reconciler_for(kind, adapters)
            .ok_or(EngineError::UnregisteredKind(kind.name()))?;
        let instance = self
            .store
            .get_mut(&key)
            .ok_or_else(|| EngineError::UnknownInstance(key.clone()))?;
        Ok(reconciler.refresh(instance).await?)
    }

    async fn run_pass(&mut self, adapters: &Adapters<K>) -> PassReport {
        self.passes += 1;
        let pass = self.passes;
        let span = info_span!("pass", pass);
        self.execute_pass(pass, adapters).instrument(span).await
    }

    async fn execute_pass(&mut self, pass: u64, adapters: &Adapters<K>) -> PassReport {
        let mut report = PassReport::new(pass);
        let gate = DependencyGate::from_instances(self.store.values());

        for members in gate.find_cycles() {
            warn!(members = ?members, "Dependency cycle");
            for member in &members {
                report.results.insert(
                    member.clone(),
                    Err(ReconcileError::DependencyCycle {
                        members: members.clone(),
                    }),
                );
            }
        }

        // Plan against a consistent view before any instance leaves the store.
        let mut plans: Vec<(InstanceKey, Reconciler, Option<attributes::Attributes>)> = Vec::new();
        for (key, instance) in &self.store {
            if report.results.contains_key(key) {
                continue;
            }
            let Some(reconciler) = self.reconciler_for(instance.kind, adapters) else {
                error!(%key, kind = %instance.kind, "No remote client registered");
                continue;
            };
            let desired = match &instance.desired {
                None => None,
                Some(raw) => {
                    let lookup = |dep: &InstanceKey| {
                        self.store.get(dep).and_then(|d| d.observed.as_ref())
                    };
                    match attributes::resolve(raw, lookup) {
                        Ok(resolved) => Some(resolved),
                        Err(unresolved) => {
                            report.results.insert(
                                key.clone(),
                                Err(ReconcileError::DependencyNotReady {
                                    target: instance.target(),
                                    waiting_on: vec![unresolved.key],
                                }),
                            );
                            continue;
                        }
                    }
                }
            };
            plans.push((key.clone(), reconciler, desired));
        }

        let mut tasks = JoinSet::new();
        let mut backups = HashMap::new();
        for (key, reconciler, desired) in plans {
            let Some(instance) = self.store.remove(&key) else {
                continue;
            };
            let authorization = gate.authorization_for(&key);
            backups.insert(key.clone(), instance.clone());
            let planned = Planned {
                reconciler,
                desired,
                authorization,
                instance,
            };
            let span = info_span!("reconcile", key = %key, kind = planned.instance.kind.name());
            tasks.spawn(
                async move {
                    let Planned {
                        reconciler,
                        desired,
                        authorization,
                        mut instance,
                    } = planned;
                    let result = reconciler
                        .reconcile(&mut instance, desired.as_ref(), &authorization)
                        .await;
                    (key, instance, result)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, instance, result)) => {
                    backups.remove(&key);
                    match &result {
                        Ok(outcome) => debug!(%key, action = %outcome.action, status = %outcome.status, "Reconciled"),
                        Err(e) => warn!(%key, error = %e, "Reconcile failed"),
                    }
                    report.results.insert(key.clone(), result);
                    self.store.insert(key, instance);
                }
                Err(e) => error!(error = %e, "Reconcile task failed"),
            }
        }
        // Tasks that panicked leave their instance as it was before the pass.
        for (key, instance) in backups {
            warn!(%key, "Restoring instance after failed task");
            self.store.insert(key, instance);
        }

        self.store.retain(|key, instance| {
            let gone = !instance.is_desired()
                && instance.id.is_none()
                && matches!(instance.status, InstanceStatus::Deleted | InstanceStatus::Unmanaged);
            if gone {
                debug!(%key, "Forgotten");
            }
            !gone
        });

        info!(
            instances = report.results.len(),
            errors = report.errors().count(),
            "Pass complete"
        );
        report
    }

    async fn converge(&mut self, adapters: &Adapters<K>) -> ConvergeReport {
        let mut passes = Vec::new();
        let token = self.cancel.token();
        let stop = loop {
            let report = self.run_pass(adapters).await;
            let again = report.needs_another_pass();
            let stalled = !again && report.errors().any(|(_, e)| e.is_retryable());
            passes.push(report);

            if token.is_cancelled() {
                break ConvergeStop::Cancelled;
            }
            if !again {
                break if stalled {
                    ConvergeStop::Stalled
                } else {
                    ConvergeStop::Settled
                };
            }
            if passes.len() as u32 >= self.config.max_passes {
                break ConvergeStop::PassLimit;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.pass_interval()) => {}
                _ = token.cancelled() => break ConvergeStop::Cancelled,
            }
        };
        info!(passes = passes.len(), stop = ?stop, "Converge finished");
        ConvergeReport { passes, stop }
    }
}
