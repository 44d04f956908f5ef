//! # Convergence Poller
//!
//! After a Create or Update the remote side usually reports a non-terminal status
//! (`PROVISIONING`). The poller re-reads the resource until it reaches a terminal
//! status, the deadline passes, or the run is cancelled.
//!
//! One read is in flight per instance at any time. The wait between reads is the only
//! suspension point and it races against the [`Cancellation`] token, so cancelling a
//! run leaves every instance in its current non-terminal status for a later resume.

use crate::client::{OperationResult, RemoteClient};
use crate::config::PollPolicy;
use crate::entity::{Phase, StatusRules};
use crate::error::{ClientError, ReconcileError};
use crate::instance::Target;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Creates a linked cancel handle and token.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle {
            sender: Arc::new(sender),
        },
        Cancellation { receiver },
    )
}

/// Cancels every poll and converge loop holding a linked [`Cancellation`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Re-arms the token so a later run can proceed.
    pub fn reset(&self) {
        self.sender.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn token(&self) -> Cancellation {
        Cancellation {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        cancellation().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is gone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Polls a remote resource until it settles.
#[derive(Debug, Clone)]
pub struct ConvergencePoller {
    policy: PollPolicy,
    cancel: Cancellation,
}

enum Tick<T> {
    Done(T),
    Pending(String),
}

impl ConvergencePoller {
    pub fn new(policy: PollPolicy, cancel: Cancellation) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Reads `id` until its status is ready or failed.
    ///
    /// `NotFound` right after a create counts as pending; the control plane is
    /// eventually consistent. A failure status ends the poll immediately with the
    /// remote diagnostic.
    pub async fn poll_until_terminal(
        &self,
        client: &dyn RemoteClient,
        target: &Target,
        id: &str,
        rules: &StatusRules,
    ) -> Result<OperationResult, ReconcileError> {
        self.run(target, move || async move {
            match client.read(id).await {
                Ok(result) => match rules.classify(result.remote_status.as_deref()) {
                    Phase::Ready => Ok(Tick::Done(result)),
                    Phase::Failed => Err(failed(target, result)),
                    Phase::Pending | Phase::Deleting => Ok(Tick::Pending(status_of(&result))),
                },
                Err(error) => pending_or_error(target, error).map(Tick::Pending),
            }
        })
        .await
    }

    /// Reads `id` until the remote reports it gone.
    pub async fn poll_until_gone(
        &self,
        client: &dyn RemoteClient,
        target: &Target,
        id: &str,
        rules: &StatusRules,
    ) -> Result<(), ReconcileError> {
        self.run(target, move || async move {
            match client.read(id).await {
                Err(ClientError::NotFound) => Ok(Tick::Done(())),
                Ok(result) => match rules.classify(result.remote_status.as_deref()) {
                    Phase::Failed => Err(failed(target, result)),
                    _ => Ok(Tick::Pending(status_of(&result))),
                },
                Err(error) => pending_or_error(target, error).map(Tick::Pending),
            }
        })
        .await
    }

    async fn run<T, F, Fut>(&self, target: &Target, mut read: F) -> Result<T, ReconcileError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Tick<T>, ReconcileError>>,
    {
        let started = Instant::now();
        let deadline = started + self.policy.timeout();
        let mut tick = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled {
                    target: target.clone(),
                });
            }

            let last_status = match read().await? {
                Tick::Done(value) => return Ok(value),
                Tick::Pending(status) => status,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(ReconcileError::ProvisioningTimeout {
                    target: target.clone(),
                    last_status,
                    elapsed: now - started,
                    exhausted: false,
                });
            }

            let delay = self.policy.delay(tick).min(deadline - now);
            tick += 1;
            debug!(%target, status = %last_status, ?delay, "Not settled, polling again");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    return Err(ReconcileError::Cancelled { target: target.clone() });
                }
            }
        }
    }
}

fn status_of(result: &OperationResult) -> String {
    result
        .remote_status
        .clone()
        .unwrap_or_else(|| "unknown".to_string())
}

fn failed(target: &Target, result: OperationResult) -> ReconcileError {
    ReconcileError::ProvisioningFailed {
        target: target.clone(),
        status: status_of(&result),
        message: result
            .message
            .unwrap_or_else(|| "no diagnostic reported".to_string()),
    }
}

fn pending_or_error(target: &Target, error: ClientError) -> Result<String, ReconcileError> {
    match error {
        ClientError::NotFound => Ok("not yet visible".to_string()),
        ClientError::Transient(message) | ClientError::RetriesExhausted { message, .. } => {
            Ok(format!("unreachable ({message})"))
        }
        other => Err(ReconcileError::from_client(target.clone(), other)),
    }
}
