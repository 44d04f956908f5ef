//! # Errors
//!
//! Three layers of errors, from the wire up:
//!
//! - [`ClientError`]: what a remote client adapter reports for a single call.
//! - [`ReconcileError`]: the outcome of reconciling one instance. Only the instance
//!   it names is affected; unrelated instances keep reconciling.
//! - [`EngineError`]: failures talking to the engine itself (closed channel, unknown
//!   instance, unregistered kind).

use crate::instance::{InstanceKey, Target};
use std::time::Duration;

/// Classified failure of one remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The id does not exist remotely (404).
    #[error("not found")]
    NotFound,
    /// Network failure, throttling or a server-side error; safe to retry.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The remote rejected the request (4xx validation failure). Not retried.
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// Every attempt allowed by the retry policy failed transiently.
    #[error("transient failure after {attempts} attempt(s): {message}")]
    RetriesExhausted { attempts: u32, message: String },
    /// The run was cancelled while waiting to retry.
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Transient(_) | ClientError::RetriesExhausted { .. }
        )
    }
}

/// Why reconciling one instance did not complete.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    #[error("{target}: transient network error after {attempts} attempt(s): {message}")]
    TransientNetwork {
        target: Target,
        attempts: u32,
        message: String,
    },

    #[error("{target}: not found")]
    NotFound { target: Target },

    #[error("{target}: provisioning failed with status {status}: {message}")]
    ProvisioningFailed {
        target: Target,
        status: String,
        message: String,
    },

    #[error("{target}: still {last_status} after {elapsed:?}")]
    ProvisioningTimeout {
        target: Target,
        last_status: String,
        elapsed: Duration,
        /// The configured number of timed-out attempts has been used up.
        exhausted: bool,
    },

    #[error("{target}: immutable field(s) changed: {}", fields.join(", "))]
    ImmutableFieldChanged { target: Target, fields: Vec<String> },

    #[error("dependency cycle: {}", display_keys(members))]
    DependencyCycle { members: Vec<InstanceKey> },

    #[error("{target}: waiting on {}", display_keys(waiting_on))]
    DependencyNotReady {
        target: Target,
        waiting_on: Vec<InstanceKey>,
    },

    #[error("{target}: cannot delete while still required by {}", display_keys(dependents))]
    DependentsStillManaged {
        target: Target,
        dependents: Vec<InstanceKey>,
    },

    #[error("{target}: remote rejected request ({status}): {message}")]
    RemoteRejected {
        target: Target,
        status: u16,
        message: String,
    },

    #[error("{target}: invalid desired state: {message}")]
    InvalidDesiredState { target: Target, message: String },

    #[error("{target}: cancelled")]
    Cancelled { target: Target },
}

fn display_keys(keys: &[InstanceKey]) -> String {
    keys.iter()
        .map(InstanceKey::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ReconcileError {
    /// Maps an adapter error for `target`.
    pub fn from_client(target: Target, error: ClientError) -> Self {
        match error {
            ClientError::NotFound => ReconcileError::NotFound { target },
            ClientError::Transient(message) => ReconcileError::TransientNetwork {
                target,
                attempts: 1,
                message,
            },
            ClientError::RetriesExhausted { attempts, message } => {
                ReconcileError::TransientNetwork {
                    target,
                    attempts,
                    message,
                }
            }
            ClientError::Cancelled => ReconcileError::Cancelled { target },
            ClientError::Rejected { status, message } => ReconcileError::RemoteRejected {
                target,
                status,
                message,
            },
        }
    }

    /// A later pass may succeed without any change to the configuration.
    ///
    /// `NotFound` is retryable: the instance was untracked and the next pass
    /// creates it again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::TransientNetwork { .. }
            | ReconcileError::DependencyNotReady { .. }
            | ReconcileError::NotFound { .. } => true,
            ReconcileError::ProvisioningTimeout { exhausted, .. } => !exhausted,
            _ => false,
        }
    }

    /// The error stems from the declared configuration rather than the remote side.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ReconcileError::ImmutableFieldChanged { .. }
                | ReconcileError::DependencyCycle { .. }
                | ReconcileError::DependentsStillManaged { .. }
                | ReconcileError::InvalidDesiredState { .. }
        )
    }
}

/// Errors that can occur talking to the engine itself.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine closed")]
    EngineClosed,
    #[error("Engine dropped response channel")]
    EngineDropped,
    #[error("Instance not found: {0}")]
    UnknownInstance(InstanceKey),
    #[error("No remote client registered for kind {0}")]
    UnregisteredKind(&'static str),
    #[error("Instance {key} is a {existing}, not a {requested}")]
    KindMismatch {
        key: InstanceKey,
        existing: &'static str,
        requested: &'static str,
    },
    #[error("Unknown resource kind in state: {0}")]
    UnknownKind(String),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Invalid engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: Option<&str>) -> Target {
        Target {
            kind: "access_point",
            key: InstanceKey::from("access_point.main"),
            id: id.map(str::to_string),
        }
    }

    #[test]
    fn test_messages_name_kind_id_and_remote_text() {
        let err = ReconcileError::from_client(
            target(None),
            ClientError::Rejected {
                status: 400,
                message: "Gateway gw-abc123 does not exist".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "access_point access_point.main (not yet created): remote rejected request (400): Gateway gw-abc123 does not exist"
        );

        let err = ReconcileError::ProvisioningFailed {
            target: target(Some("ap-abc123")),
            status: "FAILED".to_string(),
            message: "quota exceeded".to_string(),
        };
        assert!(err.to_string().contains("(id ap-abc123)"));
        assert!(err.to_string().ends_with("quota exceeded"));
    }

    #[test]
    fn test_exhausted_retries_report_the_attempt_count() {
        let err = ReconcileError::from_client(
            target(Some("ap-abc123")),
            ClientError::RetriesExhausted {
                attempts: 3,
                message: "503: Service Unavailable".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "access_point access_point.main (id ap-abc123): transient network error after 3 attempt(s): 503: Service Unavailable"
        );
        assert!(err.is_retryable());

        let err = ReconcileError::from_client(target(None), ClientError::Cancelled);
        assert!(matches!(err, ReconcileError::Cancelled { .. }));
    }

    #[test]
    fn test_retryable_classification() {
        let timeout = |exhausted| ReconcileError::ProvisioningTimeout {
            target: target(Some("ap-1")),
            last_status: "PROVISIONING".to_string(),
            elapsed: Duration::from_secs(60),
            exhausted,
        };
        assert!(timeout(false).is_retryable());
        assert!(!timeout(true).is_retryable());

        let cycle = ReconcileError::DependencyCycle {
            members: vec!["a".into(), "b".into()],
        };
        assert!(!cycle.is_retryable());
        assert!(cycle.is_configuration_error());
        assert_eq!(cycle.to_string(), "dependency cycle: a -> b");
    }
}
