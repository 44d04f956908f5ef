use reconcile_framework::{ClientError, ConfigError, EngineError};

/// Errors raised by the provider layer around the engine.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Desired attributes could not be turned into a request body.
    #[error("Cannot encode {kind} request: {message}")]
    Encode { kind: &'static str, message: String },

    /// A response body did not have the expected shape.
    #[error("Cannot decode {kind} response: {message}")]
    Decode { kind: &'static str, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Engine task failed: {0}")]
    Shutdown(String),
}

impl ProviderError {
    pub(crate) fn encode(kind: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Encode {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn decode(kind: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Decode {
            kind,
            message: message.into(),
        }
    }
}

/// Codec failures surface through the remote client contract. A request that cannot
/// be encoded is never sent and is reported as a rejected request; an unreadable
/// response is treated as transient.
impl From<ProviderError> for ClientError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Encode { .. } => ClientError::Rejected {
                status: 400,
                message: e.to_string(),
            },
            other => ClientError::Transient(other.to_string()),
        }
    }
}
