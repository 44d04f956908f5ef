//! # Remote Client Adapter
//!
//! [`RemoteClient`] is the seam between the engine and a control-plane API. There is
//! one binding per resource kind; the engine never talks HTTP itself. Adapters map
//! their transport failures onto [`ClientError`] so the engine can classify them.
//!
//! [`RetryingClient`] wraps any adapter and retries `Transient` failures with the
//! configured backoff before the error reaches the reconciler. A failure that outlives
//! the budget comes back as `RetriesExhausted` carrying the attempt count; cancelling
//! the run interrupts the backoff wait.

use crate::attributes::Attributes;
use crate::config::RetryPolicy;
use crate::entity::ResourceKind;
use crate::error::ClientError;
use crate::poller::Cancellation;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// What a successful remote call returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationResult {
    /// Attributes in reported shape, including computed fields.
    pub payload: Attributes,
    /// Provider status string; `None` for kinds that are ready on return.
    pub remote_status: Option<String>,
    /// Diagnostic attached by the remote side (e.g. why provisioning failed).
    pub message: Option<String>,
}

impl OperationResult {
    pub fn ready(payload: Attributes) -> Self {
        Self {
            payload,
            remote_status: None,
            message: None,
        }
    }

    pub fn with_status(payload: Attributes, status: impl Into<String>) -> Self {
        Self {
            payload,
            remote_status: Some(status.into()),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Create/Read/Update/Delete against the remote control plane for one kind.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn create(&self, desired: &Attributes) -> Result<OperationResult, ClientError>;
    async fn read(&self, id: &str) -> Result<OperationResult, ClientError>;
    async fn update(&self, id: &str, desired: &Attributes) -> Result<OperationResult, ClientError>;
    /// Deleting an id that no longer exists reports `NotFound`; callers treat it as success.
    async fn delete(&self, id: &str) -> Result<(), ClientError>;
}

/// Retries transient failures of the wrapped client.
pub struct RetryingClient {
    inner: Arc<dyn RemoteClient>,
    policy: RetryPolicy,
    cancel: Cancellation,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn RemoteClient>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            cancel: Cancellation::never(),
        }
    }

    /// Stops waiting between attempts once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ClientError>> + Send,
        T: Send,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let message = match call().await {
                Err(ClientError::Transient(message)) => message,
                other => return other,
            };
            if !self.policy.should_retry(attempts) {
                return Err(ClientError::RetriesExhausted { attempts, message });
            }
            let delay = self.policy.delay(attempts - 1);
            warn!(operation, attempts, ?delay, error = %message, "Transient failure, retrying");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
            }
        }
    }
}

#[async_trait]
impl RemoteClient for RetryingClient {
    async fn create(&self, desired: &Attributes) -> Result<OperationResult, ClientError> {
        self.with_retry("create", || self.inner.create(desired)).await
    }

    async fn read(&self, id: &str) -> Result<OperationResult, ClientError> {
        self.with_retry("read", || self.inner.read(id)).await
    }

    async fn update(&self, id: &str, desired: &Attributes) -> Result<OperationResult, ClientError> {
        self.with_retry("update", || self.inner.update(id, desired)).await
    }

    async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.with_retry("delete", || self.inner.delete(id)).await
    }
}

/// The adapter registered for each kind.
pub struct Adapters<K: ResourceKind> {
    clients: HashMap<K, Arc<dyn RemoteClient>>,
}

impl<K: ResourceKind> Default for Adapters<K> {
    fn default() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }
}

impl<K: ResourceKind> Clone for Adapters<K> {
    fn clone(&self) -> Self {
        Self {
            clients: self.clients.clone(),
        }
    }
}

impl<K: ResourceKind> Adapters<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: K, client: Arc<dyn RemoteClient>) -> Self {
        self.clients.insert(kind, client);
        self
    }

    pub fn get(&self, kind: K) -> Option<Arc<dyn RemoteClient>> {
        self.clients.get(&kind).cloned()
    }

    pub fn contains(&self, kind: K) -> bool {
        self.clients.contains_key(&kind)
    }

    /// Wraps every registered adapter in a [`RetryingClient`].
    pub fn with_retry(self, policy: &RetryPolicy, cancel: &Cancellation) -> Self {
        let clients = self
            .clients
            .into_iter()
            .map(|(kind, client)| {
                let wrapped: Arc<dyn RemoteClient> = Arc::new(
                    RetryingClient::new(client, policy.clone()).with_cancellation(cancel.clone()),
                );
                (kind, wrapped)
            })
            .collect();
        Self { clients }
    }
}
