//! # Resource Reconciler
//!
//! Drives one instance one step toward its desired state. Given the instance, its
//! resolved desired attributes and the gate's verdict, the reconciler decides which
//! remote call (if any) to make:
//!
//! | Instance | Desired | Action |
//! |----------|---------|--------|
//! | no id | present | Create, then poll until settled |
//! | id, nothing observed | present | Read first; Create again if it is gone |
//! | in progress | present | Resume polling |
//! | observed, drift | present | Update (refused for immutable fields) |
//! | observed, no drift | present | Nothing |
//! | id | absent | Delete (`NotFound` counts as success) |
//!
//! The instance is updated in place. `observed` is only ever written from a successful
//! remote call, and an id is only recorded once the remote has returned it.

use crate::attributes::{self, Attributes};
use crate::client::{OperationResult, RemoteClient};
use crate::diff;
use crate::entity::{Phase, ResourceKind};
use crate::error::{ClientError, ReconcileError};
use crate::gate::Authorization;
use crate::instance::{InstanceStatus, ResourceInstance};
use crate::poller::ConvergencePoller;
use std::fmt::{self, Display};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a reconcile step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    Deleted,
    /// An earlier, interrupted operation was polled to completion.
    Resumed,
    Refreshed,
    NoOp,
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Deleted => "deleted",
            Action::Resumed => "resumed",
            Action::Refreshed => "refreshed",
            Action::NoOp => "no-op",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub action: Action,
    pub status: InstanceStatus,
}

impl Outcome {
    fn new(action: Action, status: InstanceStatus) -> Self {
        Self { action, status }
    }
}

/// Reconciles instances of any kind through one remote client.
#[derive(Clone)]
pub struct Reconciler {
    client: Arc<dyn RemoteClient>,
    poller: ConvergencePoller,
    max_provisioning_attempts: Option<u32>,
    refresh_before_plan: bool,
}

impl Reconciler {
    pub fn new(client: Arc<dyn RemoteClient>, poller: ConvergencePoller) -> Self {
        Self {
            client,
            poller,
            max_provisioning_attempts: None,
            refresh_before_plan: false,
        }
    }

    /// Marks an instance errored after this many timed-out polls.
    pub fn with_max_provisioning_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_provisioning_attempts = attempts;
        self
    }

    /// Read ready instances before diffing them.
    pub fn with_refresh_before_plan(mut self, refresh: bool) -> Self {
        self.refresh_before_plan = refresh;
        self
    }

    /// Moves `instance` toward `desired`; `None` removes it.
    pub async fn reconcile<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
        desired: Option<&Attributes>,
        authorization: &Authorization,
    ) -> Result<Outcome, ReconcileError> {
        match desired {
            Some(desired) => self.converge(instance, desired, authorization).await,
            None => self.delete(instance, authorization).await,
        }
    }

    /// Reads the instance once and records the result as observed. An instance the
    /// remote no longer knows is untracked so the next pass creates it again.
    pub async fn refresh<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
    ) -> Result<Outcome, ReconcileError> {
        let Some(id) = instance.id.clone() else {
            return Ok(Outcome::new(Action::NoOp, instance.status));
        };
        match self.client.read(&id).await {
            Ok(result) => {
                debug!(target = %instance.target(), "Refreshed");
                instance.observed = Some(result.payload);
                Ok(Outcome::new(Action::Refreshed, instance.status))
            }
            Err(ClientError::NotFound) => {
                warn!(target = %instance.target(), "Gone remotely, untracking");
                untrack(instance);
                Ok(Outcome::new(Action::Refreshed, instance.status))
            }
            Err(error) => Err(ReconcileError::from_client(instance.target(), error)),
        }
    }

    async fn converge<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
        desired: &Attributes,
        authorization: &Authorization,
    ) -> Result<Outcome, ReconcileError> {
        if instance.status == InstanceStatus::Errored && instance.id.is_some() {
            return Err(ReconcileError::ProvisioningFailed {
                target: instance.target(),
                status: InstanceStatus::Errored.to_string(),
                message: instance
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "remote reported a failure".to_string()),
            });
        }

        let mut resumed = false;
        if instance.id.is_some() {
            match instance.status {
                InstanceStatus::Creating
                | InstanceStatus::Provisioning
                | InstanceStatus::Updating => {
                    info!(target = %instance.target(), status = %instance.status, "Resuming");
                    self.settle(instance, Action::Resumed).await?;
                    resumed = true;
                }
                InstanceStatus::Deleting => {
                    // Re-declared while a delete was in flight: wait until it is gone.
                    self.finish_delete(instance).await?;
                }
                _ => {}
            }
        }

        if self.refresh_before_plan
            && instance.status == InstanceStatus::Ready
            && instance.observed.is_some()
        {
            self.refresh(instance).await?;
        }

        if instance.id.is_some() && instance.observed.is_none() {
            self.adopt(instance).await?;
        }

        if instance.id.is_none() {
            return self.create(instance, desired, authorization).await;
        }

        let outcome = self.update(instance, desired, authorization).await?;
        if resumed && outcome.action == Action::NoOp {
            return Ok(Outcome::new(Action::Resumed, outcome.status));
        }
        Ok(outcome)
    }

    /// Reads an instance known only by id (restored state).
    async fn adopt<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
    ) -> Result<(), ReconcileError> {
        let Some(id) = instance.id.clone() else {
            return Ok(());
        };
        match self.client.read(&id).await {
            Ok(result) => {
                let phase = instance.kind.schema().classify(result.remote_status.as_deref());
                instance.observed = Some(result.payload.clone());
                match phase {
                    Phase::Ready => {
                        instance.status = InstanceStatus::Ready;
                        Ok(())
                    }
                    Phase::Failed => Err(self.mark_failed(instance, result)),
                    Phase::Pending | Phase::Deleting => {
                        instance.status = InstanceStatus::Provisioning;
                        self.settle(instance, Action::Resumed).await.map(|_| ())
                    }
                }
            }
            Err(ClientError::NotFound) => {
                info!(target = %instance.target(), "Recorded id no longer exists, will create");
                untrack(instance);
                Ok(())
            }
            Err(error) => Err(ReconcileError::from_client(instance.target(), error)),
        }
    }

    async fn create<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
        desired: &Attributes,
        authorization: &Authorization,
    ) -> Result<Outcome, ReconcileError> {
        if let Authorization::Blocked { waiting_on } = authorization {
            return Err(ReconcileError::DependencyNotReady {
                target: instance.target(),
                waiting_on: waiting_on.clone(),
            });
        }
        let schema = instance.kind.schema();
        schema
            .check(desired)
            .map_err(|message| ReconcileError::InvalidDesiredState {
                target: instance.target(),
                message,
            })?;

        debug!(target = %instance.target(), desired = ?schema.redact(desired), "Create");
        instance.status = InstanceStatus::Creating;
        let result = match self.client.create(desired).await {
            Ok(result) => result,
            Err(error) => {
                instance.status = match error {
                    ClientError::Rejected { .. } => InstanceStatus::Errored,
                    _ => InstanceStatus::Unmanaged,
                };
                let error = ReconcileError::from_client(instance.target(), error);
                warn!(error = %error, "Create failed");
                instance.last_error = Some(error.to_string());
                return Err(error);
            }
        };

        let Some(id) = attributes::id_of(&result.payload).map(str::to_string) else {
            instance.status = InstanceStatus::Errored;
            let error = ReconcileError::ProvisioningFailed {
                target: instance.target(),
                status: result
                    .remote_status
                    .unwrap_or_else(|| "unknown".to_string()),
                message: "create response carried no id".to_string(),
            };
            instance.last_error = Some(error.to_string());
            return Err(error);
        };

        instance.id = Some(id);
        instance.last_error = None;
        info!(target = %instance.target(), status = ?result.remote_status, "Created");
        self.record(instance, result, Action::Created, InstanceStatus::Provisioning)
            .await
    }

    async fn update<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
        desired: &Attributes,
        authorization: &Authorization,
    ) -> Result<Outcome, ReconcileError> {
        let (Some(id), Some(observed)) = (instance.id.clone(), instance.observed.as_ref()) else {
            return Ok(Outcome::new(Action::NoOp, instance.status));
        };
        let schema = instance.kind.schema();
        let report = diff::diff(schema, desired, observed);
        let payload = diff::with_removed_keys(schema, desired, observed);

        if report.has_immutable_violation() {
            return Err(ReconcileError::ImmutableFieldChanged {
                target: instance.target(),
                fields: report.immutable_violations.into_iter().collect(),
            });
        }
        if !report.has_change() {
            instance.status = InstanceStatus::Ready;
            debug!(target = %instance.target(), "No drift");
            return Ok(Outcome::new(Action::NoOp, instance.status));
        }
        if let Authorization::Blocked { waiting_on } = authorization {
            return Err(ReconcileError::DependencyNotReady {
                target: instance.target(),
                waiting_on: waiting_on.clone(),
            });
        }
        schema
            .check(desired)
            .map_err(|message| ReconcileError::InvalidDesiredState {
                target: instance.target(),
                message,
            })?;

        debug!(target = %instance.target(), changed = ?report.changed, "Update");
        let previous = instance.status;
        instance.status = InstanceStatus::Updating;
        let result = match self.client.update(&id, &payload).await {
            Ok(result) => result,
            Err(ClientError::NotFound) => {
                warn!(target = %instance.target(), "Gone remotely during update, untracking");
                let target = instance.target();
                untrack(instance);
                return Err(ReconcileError::NotFound { target });
            }
            Err(error) => {
                instance.status = previous;
                let error = ReconcileError::from_client(instance.target(), error);
                warn!(error = %error, "Update failed");
                return Err(error);
            }
        };

        info!(target = %instance.target(), changed = report.changed.len(), "Updated");
        self.record(instance, result, Action::Updated, InstanceStatus::Updating)
            .await
    }

    async fn delete<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
        authorization: &Authorization,
    ) -> Result<Outcome, ReconcileError> {
        let Some(id) = instance.id.clone() else {
            instance.status = InstanceStatus::Deleted;
            instance.observed = None;
            return Ok(Outcome::new(Action::NoOp, instance.status));
        };
        match authorization {
            Authorization::Granted => {}
            Authorization::Blocked { waiting_on } => {
                return Err(ReconcileError::DependencyNotReady {
                    target: instance.target(),
                    waiting_on: waiting_on.clone(),
                });
            }
            Authorization::Forbidden { dependents } => {
                return Err(ReconcileError::DependentsStillManaged {
                    target: instance.target(),
                    dependents: dependents.clone(),
                });
            }
        }

        if instance.status != InstanceStatus::Deleting {
            let previous = instance.status;
            instance.status = InstanceStatus::Deleting;
            match self.client.delete(&id).await {
                Ok(()) => {}
                Err(ClientError::NotFound) => {
                    debug!(target = %instance.target(), "Already gone");
                }
                Err(error) => {
                    instance.status = previous;
                    let error = ReconcileError::from_client(instance.target(), error);
                    warn!(error = %error, "Delete failed");
                    return Err(error);
                }
            }
        }

        self.finish_delete(instance).await?;
        Ok(Outcome::new(Action::Deleted, instance.status))
    }

    /// Waits for an asynchronous delete and forgets the remote id.
    async fn finish_delete<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
    ) -> Result<(), ReconcileError> {
        let schema = instance.kind.schema();
        if let (Some(id), Some(rules)) = (instance.id.clone(), schema.status.as_ref()) {
            if rules.deletes_asynchronously() {
                self.poller
                    .poll_until_gone(self.client.as_ref(), &instance.target(), &id, rules)
                    .await?;
            }
        }
        info!(target = %instance.target(), "Deleted");
        instance.id = None;
        instance.observed = None;
        instance.status = InstanceStatus::Deleted;
        instance.timeouts = 0;
        Ok(())
    }

    /// Records a create/update response and polls if it is not terminal.
    async fn record<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
        result: OperationResult,
        action: Action,
        in_progress: InstanceStatus,
    ) -> Result<Outcome, ReconcileError> {
        let schema = instance.kind.schema();
        debug!(target = %instance.target(), payload = ?schema.redact(&result.payload), "Response");
        match schema.classify(result.remote_status.as_deref()) {
            Phase::Ready => {
                instance.observed = Some(result.payload);
                mark_ready(instance);
                Ok(Outcome::new(action, instance.status))
            }
            Phase::Failed => {
                instance.observed = Some(result.payload.clone());
                Err(self.mark_failed(instance, result))
            }
            Phase::Pending | Phase::Deleting => {
                instance.observed = Some(result.payload);
                instance.status = in_progress;
                self.settle(instance, action).await
            }
        }
    }

    /// Polls an in-progress instance to a terminal status.
    async fn settle<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
        action: Action,
    ) -> Result<Outcome, ReconcileError> {
        let schema = instance.kind.schema();
        let (Some(id), Some(rules)) = (instance.id.clone(), schema.status.as_ref()) else {
            mark_ready(instance);
            return Ok(Outcome::new(action, instance.status));
        };

        let target = instance.target();
        match self
            .poller
            .poll_until_terminal(self.client.as_ref(), &target, &id, rules)
            .await
        {
            Ok(result) => {
                instance.observed = Some(result.payload);
                mark_ready(instance);
                info!(%target, "Ready");
                Ok(Outcome::new(action, instance.status))
            }
            Err(ReconcileError::ProvisioningTimeout {
                target,
                last_status,
                elapsed,
                ..
            }) => {
                instance.timeouts += 1;
                let exhausted = self
                    .max_provisioning_attempts
                    .is_some_and(|max| instance.timeouts >= max);
                let error = ReconcileError::ProvisioningTimeout {
                    target,
                    last_status,
                    elapsed,
                    exhausted,
                };
                if exhausted {
                    instance.status = InstanceStatus::Errored;
                    instance.last_error = Some(error.to_string());
                }
                warn!(error = %error, attempts = instance.timeouts, "Provisioning timed out");
                Err(error)
            }
            Err(error @ ReconcileError::ProvisioningFailed { .. }) => {
                instance.status = InstanceStatus::Errored;
                instance.last_error = Some(error.to_string());
                warn!(error = %error, "Provisioning failed");
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    fn mark_failed<K: ResourceKind>(
        &self,
        instance: &mut ResourceInstance<K>,
        result: OperationResult,
    ) -> ReconcileError {
        instance.status = InstanceStatus::Errored;
        let error = ReconcileError::ProvisioningFailed {
            target: instance.target(),
            status: result
                .remote_status
                .unwrap_or_else(|| "unknown".to_string()),
            message: result
                .message
                .unwrap_or_else(|| "no diagnostic reported".to_string()),
        };
        instance.last_error = Some(error.to_string());
        warn!(error = %error, "Provisioning failed");
        error
    }
}

fn mark_ready<K: ResourceKind>(instance: &mut ResourceInstance<K>) {
    instance.status = InstanceStatus::Ready;
    instance.timeouts = 0;
    instance.last_error = None;
}

fn untrack<K: ResourceKind>(instance: &mut ResourceInstance<K>) {
    instance.id = None;
    instance.observed = None;
    instance.status = InstanceStatus::Unmanaged;
    instance.timeouts = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollPolicy;
    use crate::entity::{FieldRule, Schema, StatusRules};
    use crate::instance::DesiredDocument;
    use crate::mock::{Operation, ScenarioMock, STARTED};
    use crate::poller::Cancellation;
    use serde_json::{json, Value};
    use std::fmt;

    static ASYNC_SCHEMA: Schema = Schema {
        fields: &[
            FieldRule::computed("id"),
            FieldRule::mutable("display_name"),
            FieldRule::immutable("environment"),
            FieldRule::computed("status"),
        ],
        status: Some(StatusRules {
            pending: &["PROVISIONING"],
            ready: &["READY"],
            failed: &["FAILED"],
            deleting: &[],
        }),
        validate: Some(named),
    };

    fn named(attrs: &Attributes) -> Result<(), String> {
        if attributes::get_str(attrs, "display_name").is_some_and(str::is_empty) {
            Err("display_name must not be empty".to_string())
        } else {
            Ok(())
        }
    }

    static SYNC_SCHEMA: Schema = Schema {
        fields: &[FieldRule::computed("id"), FieldRule::mutable("display_name")],
        status: None,
        validate: None,
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    enum Kind {
        Gateway,
        Account,
    }

    impl fmt::Display for Kind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name())
        }
    }

    impl ResourceKind for Kind {
        fn name(&self) -> &'static str {
            match self {
                Kind::Gateway => "gateway",
                Kind::Account => "account",
            }
        }
        fn schema(&self) -> &'static Schema {
            match self {
                Kind::Gateway => &ASYNC_SCHEMA,
                Kind::Account => &SYNC_SCHEMA,
            }
        }
        fn from_name(name: &str) -> Option<Self> {
            match name {
                "gateway" => Some(Kind::Gateway),
                "account" => Some(Kind::Account),
                _ => None,
            }
        }
    }

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn payload(name: &str, status: &str) -> OperationResult {
        OperationResult::with_status(
            attrs(json!({
                "id": "gw-1",
                "display_name": name,
                "environment": [{ "id": "env-1" }],
                "status": status
            })),
            status,
        )
    }

    fn desired(name: &str) -> Attributes {
        attrs(json!({ "display_name": name, "environment": [{ "id": "env-1" }] }))
    }

    fn reconciler(mock: &ScenarioMock) -> Reconciler {
        Reconciler::new(
            mock.client(),
            ConvergencePoller::new(
                PollPolicy {
                    interval_ms: 1_000,
                    timeout_ms: 30_000,
                    ..PollPolicy::default()
                },
                Cancellation::never(),
            ),
        )
    }

    fn gateway(name: &str) -> ResourceInstance<Kind> {
        ResourceInstance::from_document(DesiredDocument::new("gateway.main", Kind::Gateway, desired(name)))
    }

    fn ready_gateway(name: &str) -> ResourceInstance<Kind> {
        let mut instance = gateway(name);
        instance.id = Some("gw-1".to_string());
        instance.observed = Some(payload(name, "READY").payload);
        instance.status = InstanceStatus::Ready;
        instance
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_polls_until_ready() {
        let mock = ScenarioMock::new();
        mock.on(Operation::Create)
            .when_state(STARTED)
            .will_set_state("provisioning")
            .return_ok(payload("gw", "PROVISIONING"));
        mock.on(Operation::Read)
            .when_state("provisioning")
            .will_set_state("ready")
            .return_ok(payload("gw", "PROVISIONING"));
        mock.on(Operation::Read)
            .when_state("ready")
            .return_ok(payload("gw", "READY"));

        let mut instance = gateway("gw");
        let outcome = reconciler(&mock)
            .reconcile(&mut instance, Some(&desired("gw")), &Authorization::Granted)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::new(Action::Created, InstanceStatus::Ready));
        assert_eq!(instance.id.as_deref(), Some("gw-1"));
        assert_eq!(instance.observed, Some(payload("gw", "READY").payload));
        mock.verify();
    }

    #[tokio::test]
    async fn test_no_drift_makes_no_remote_call() {
        let mock = ScenarioMock::new();
        let mut instance = ready_gateway("gw");
        let before = instance.observed.clone();

        let outcome = reconciler(&mock)
            .reconcile(&mut instance, Some(&desired("gw")), &Authorization::Granted)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::new(Action::NoOp, InstanceStatus::Ready));
        assert_eq!(instance.observed, before);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_immutable_change_is_refused_without_call() {
        let mock = ScenarioMock::new();
        let mut instance = ready_gateway("gw");
        let changed = attrs(json!({ "display_name": "gw", "environment": [{ "id": "env-2" }] }));

        let err = reconciler(&mock)
            .reconcile(&mut instance, Some(&changed), &Authorization::Granted)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::ImmutableFieldChanged { ref fields, .. } if fields == &["environment.0.id".to_string()]
        ));
        assert_eq!(instance.status, InstanceStatus::Ready);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_waits_for_dependencies() {
        let mock = ScenarioMock::new();
        let mut instance = gateway("gw");
        let blocked = Authorization::Blocked {
            waiting_on: vec!["environment.prod".into()],
        };

        let err = reconciler(&mock)
            .reconcile(&mut instance, Some(&desired("gw")), &blocked)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::DependencyNotReady { .. }));
        assert_eq!(instance.status, InstanceStatus::Unmanaged);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_desired_state_is_rejected_before_create() {
        let mock = ScenarioMock::new();
        let mut instance = gateway("");

        let err = reconciler(&mock)
            .reconcile(&mut instance, Some(&desired("")), &Authorization::Granted)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidDesiredState { .. }));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_create_keeps_no_id() {
        let mock = ScenarioMock::new();
        mock.on(Operation::Create).return_err(ClientError::Rejected {
            status: 400,
            message: "Environment env-1 not found".to_string(),
        });

        let mut instance = gateway("gw");
        let err = reconciler(&mock)
            .reconcile(&mut instance, Some(&desired("gw")), &Authorization::Granted)
            .await
            .unwrap_err();

        assert!(err.to_string().ends_with("Environment env-1 not found"));
        assert!(instance.id.is_none());
        assert!(instance.observed.is_none());
        assert_eq!(instance.status, InstanceStatus::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_marks_errored_and_is_not_retried() {
        let mock = ScenarioMock::new();
        mock.on(Operation::Create).return_ok(
            OperationResult::with_status(attrs(json!({ "id": "gw-1" })), "FAILED")
                .with_message("capacity exhausted"),
        );

        let reconciler = reconciler(&mock);
        let mut instance = gateway("gw");
        let err = reconciler
            .reconcile(&mut instance, Some(&desired("gw")), &Authorization::Granted)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ProvisioningFailed { ref message, .. } if message == "capacity exhausted"));
        assert_eq!(instance.status, InstanceStatus::Errored);

        let again = reconciler
            .reconcile(&mut instance, Some(&desired("gw")), &Authorization::Granted)
            .await
            .unwrap_err();
        assert!(again.to_string().contains("capacity exhausted"));
        assert_eq!(mock.count(Operation::Create), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_bounded_then_resumed_polls_reuse_the_id() {
        let mock = ScenarioMock::new();
        mock.on(Operation::Create).return_ok(payload("gw", "PROVISIONING"));
        mock.on(Operation::Read).return_ok(payload("gw", "PROVISIONING"));

        let reconciler = reconciler(&mock).with_max_provisioning_attempts(Some(2));
        let mut instance = gateway("gw");

        let first = reconciler
            .reconcile(&mut instance, Some(&desired("gw")), &Authorization::Granted)
            .await
            .unwrap_err();
        assert!(first.is_retryable());
        assert_eq!(instance.status, InstanceStatus::Provisioning);

        let second = reconciler
            .reconcile(&mut instance, Some(&desired("gw")), &Authorization::Granted)
            .await
            .unwrap_err();
        assert!(matches!(second, ReconcileError::ProvisioningTimeout { exhausted: true, .. }));
        assert_eq!(instance.status, InstanceStatus::Errored);
        assert_eq!(mock.count(Operation::Create), 1);
    }

    #[tokio::test]
    async fn test_update_on_drift() {
        let mock = ScenarioMock::new();
        mock.on(Operation::Update)
            .for_id("gw-1")
            .return_ok(payload("gw-2", "READY"));

        let mut instance = ready_gateway("gw");
        let outcome = reconciler(&mock)
            .reconcile(&mut instance, Some(&desired("gw-2")), &Authorization::Granted)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::new(Action::Updated, InstanceStatus::Ready));
        assert_eq!(
            instance.observed.as_ref().and_then(|o| attributes::get_str(o, "display_name")),
            Some("gw-2")
        );
        mock.verify();
    }

    #[tokio::test]
    async fn test_delete_treats_not_found_as_success() {
        let mock = ScenarioMock::new();
        mock.on(Operation::Delete).return_err(ClientError::NotFound);

        let mut instance = ready_gateway("gw");
        let outcome = reconciler(&mock)
            .reconcile(&mut instance, None, &Authorization::Granted)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::new(Action::Deleted, InstanceStatus::Deleted));
        assert!(instance.id.is_none());
        mock.verify();
    }

    #[tokio::test]
    async fn test_delete_forbidden_while_dependents_remain() {
        let mock = ScenarioMock::new();
        let mut instance = ready_gateway("gw");
        let forbidden = Authorization::Forbidden {
            dependents: vec!["route.main".into()],
        };

        let err = reconciler(&mock)
            .reconcile(&mut instance, None, &forbidden)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::DependentsStillManaged { .. }));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restored_id_is_read_before_create() {
        let mock = ScenarioMock::new();
        mock.on(Operation::Read)
            .for_id("gw-gone")
            .return_err(ClientError::NotFound);
        mock.on(Operation::Create).return_ok(payload("gw", "READY"));

        let mut instance = gateway("gw");
        instance.id = Some("gw-gone".to_string());
        instance.status = InstanceStatus::Ready;

        let outcome = reconciler(&mock)
            .reconcile(&mut instance, Some(&desired("gw")), &Authorization::Granted)
            .await
            .unwrap();
        assert_eq!(outcome.action, Action::Created);
        assert_eq!(instance.id.as_deref(), Some("gw-1"));
        mock.verify();
    }

    #[tokio::test]
    async fn test_sync_kind_is_ready_on_return() {
        let mock = ScenarioMock::new();
        mock.on(Operation::Create)
            .return_ok(OperationResult::ready(attrs(json!({ "id": "sa-1", "display_name": "app" }))));

        let mut instance = ResourceInstance::from_document(DesiredDocument::new(
            "account.app",
            Kind::Account,
            attrs(json!({ "display_name": "app" })),
        ));
        let desired = instance.desired.clone();
        let outcome = reconciler(&mock)
            .reconcile(&mut instance, desired.as_ref(), &Authorization::Granted)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::new(Action::Created, InstanceStatus::Ready));
        assert_eq!(mock.count(Operation::Read), 0);
    }

    #[tokio::test]
    async fn test_refresh_untracks_vanished_instance() {
        let mock = ScenarioMock::new();
        mock.on(Operation::Read).return_err(ClientError::NotFound);

        let mut instance = ready_gateway("gw");
        let outcome = reconciler(&mock).refresh(&mut instance).await.unwrap();

        assert_eq!(outcome, Outcome::new(Action::Refreshed, InstanceStatus::Unmanaged));
        assert!(instance.id.is_none());
        assert!(instance.observed.is_none());
    }
}
