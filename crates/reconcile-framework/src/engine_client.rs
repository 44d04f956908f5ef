//! # Engine Client
//!
//! The cloneable handle used to talk to a running [`ReconcileEngine`](crate::ReconcileEngine).
//! Every method sends one request and awaits the reply. Requests are processed in
//! order, so a `converge` holds back later requests until it returns; `cancel` does
//! not go through the queue and takes effect immediately.

use crate::entity::ResourceKind;
use crate::error::EngineError;
use crate::instance::{DesiredDocument, InstanceKey, ResourceInstance};
use crate::message::{EngineRequest, Response};
use crate::poller::CancelHandle;
use crate::reconciler::Outcome;
use crate::report::{ConvergeReport, PassReport};
use crate::state::StateSnapshot;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone)]
pub struct EngineClient<K: ResourceKind> {
    sender: mpsc::Sender<EngineRequest<K>>,
    cancel: CancelHandle,
}

impl<K: ResourceKind> EngineClient<K> {
    pub fn new(sender: mpsc::Sender<EngineRequest<K>>, cancel: CancelHandle) -> Self {
        Self { sender, cancel }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Response<T>) -> EngineRequest<K>,
    ) -> Result<T, EngineError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| EngineError::EngineClosed)?;
        response.await.map_err(|_| EngineError::EngineDropped)?
    }

    /// Declares (or re-declares) the desired state of an instance.
    pub async fn apply(&self, document: DesiredDocument<K>) -> Result<(), EngineError> {
        self.request(|respond_to| EngineRequest::Apply {
            document,
            respond_to,
        })
        .await
    }

    /// Marks an instance for deletion on the next pass.
    pub async fn remove(&self, key: impl Into<InstanceKey>) -> Result<(), EngineError> {
        let key = key.into();
        self.request(|respond_to| EngineRequest::Remove { key, respond_to })
            .await
    }

    pub async fn get(
        &self,
        key: impl Into<InstanceKey>,
    ) -> Result<Option<ResourceInstance<K>>, EngineError> {
        let key = key.into();
        self.request(|respond_to| EngineRequest::Get { key, respond_to })
            .await
    }

    /// Runs exactly one reconciliation pass.
    pub async fn run_pass(&self) -> Result<PassReport, EngineError> {
        self.request(|respond_to| EngineRequest::RunPass { respond_to })
            .await
    }

    /// Runs passes until nothing more can be done.
    pub async fn converge(&self) -> Result<ConvergeReport, EngineError> {
        self.request(|respond_to| EngineRequest::Converge { respond_to })
            .await
    }

    /// Re-reads one instance from the remote side.
    pub async fn refresh(&self, key: impl Into<InstanceKey>) -> Result<Outcome, EngineError> {
        let key = key.into();
        self.request(|respond_to| EngineRequest::Refresh { key, respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<StateSnapshot, EngineError> {
        self.request(|respond_to| EngineRequest::Snapshot { respond_to })
            .await
    }

    /// Seeds the engine with previously persisted state.
    pub async fn restore(&self, snapshot: StateSnapshot) -> Result<(), EngineError> {
        self.request(|respond_to| EngineRequest::Restore {
            snapshot,
            respond_to,
        })
        .await
    }

    /// Interrupts the running pass or converge loop. In-flight polls stop at their
    /// next wait and leave their instances in progress.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}
