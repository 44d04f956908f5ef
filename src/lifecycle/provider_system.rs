use crate::clients::{self, ProviderConfig, ProviderContext, ProviderError};
use crate::model::ResourceType;
use reconcile_framework::{Adapters, EngineClient, EngineConfig, ReconcileEngine};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The running provider: one reconciliation engine wired to a remote client per kind.
///
/// # Example
///
/// ```ignore
/// let system = ProviderSystem::new(ProviderConfig::from_json(&config_json)?)?;
///
/// system.engine.apply(document).await?;
/// let report = system.engine.converge().await?;
///
/// system.shutdown().await?;
/// ```
pub struct ProviderSystem {
    /// Client for the reconciliation engine.
    pub engine: EngineClient<ResourceType>,

    handle: JoinHandle<()>,
}

impl ProviderSystem {
    /// Starts the engine with HTTP adapters built from `config`.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let context = ProviderContext::new(&config)?;
        info!(endpoint = context.endpoint(), "Starting provider");
        Ok(Self::with_adapters(config.engine, clients::http_adapters(&context)))
    }

    /// Starts the engine with the given adapters, e.g. scenario mocks in tests.
    pub fn with_adapters(config: EngineConfig, adapters: Adapters<ResourceType>) -> Self {
        let (engine, client) = ReconcileEngine::new(config);
        let handle = tokio::spawn(engine.run(adapters));
        Self {
            engine: client,
            handle,
        }
    }

    /// Stops any in-flight pass or converge loop.
    pub fn cancel(&self) {
        self.engine.cancel();
    }

    /// Closes the engine's channel and waits for it to stop.
    ///
    /// Clones of [`ProviderSystem::engine`] keep the engine alive; drop them first.
    pub async fn shutdown(self) -> Result<(), ProviderError> {
        info!("Shutting down provider...");
        drop(self.engine);

        if let Err(e) = self.handle.await {
            error!("Engine task failed: {:?}", e);
            return Err(ProviderError::Shutdown(e.to_string()));
        }

        info!("Provider shutdown complete.");
        Ok(())
    }
}
