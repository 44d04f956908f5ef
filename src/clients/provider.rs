//! # Provider Configuration & Context
//!
//! [`ProviderConfig`] is the serializable configuration of the provider: where the
//! control plane lives, the credentials to use, and the engine's timing knobs.
//! [`ProviderContext`] is built from it once and handed to every HTTP adapter, so no
//! adapter reads global state.

use super::ProviderError;
use reconcile_framework::{ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.confluent.cloud";

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_secret: String,
    pub request_timeout_ms: u64,
    pub engine: EngineConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout_ms: 30_000,
            engine: EngineConfig::default(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key)
            .field("api_secret", &"(sensitive)")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("engine", &self.engine)
            .finish()
    }
}

impl ProviderConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ProviderError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(invalid(format!(
                "endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(invalid("api_key and api_secret must both be set"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms must be positive"));
        }
        self.engine.validate()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn invalid(message: impl Into<String>) -> ProviderError {
    ProviderError::Config(ConfigError::Invalid(message.into()))
}

/// Shared HTTP state injected into every adapter.
#[derive(Clone)]
pub struct ProviderContext {
    endpoint: String,
    api_key: String,
    api_secret: String,
    http: reqwest::Client,
}

impl ProviderContext {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Starts an authenticated request to `path` on the endpoint.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.endpoint, path))
            .basic_auth(&self.api_key, Some(&self.api_secret))
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}
