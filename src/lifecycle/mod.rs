//! # Provider Lifecycle
//!
//! Starting, wiring and stopping the reconciliation engine.
//!
//! [`ProviderSystem::new`] builds a [`ProviderContext`](crate::clients::ProviderContext)
//! from the configuration, creates one HTTP adapter per resource kind, and spawns the
//! engine with those adapters injected into its `run` loop. Tests inject scenario
//! mocks instead through [`ProviderSystem::with_adapters`].
//!
//! Shutdown follows the channel-closure pattern: dropping the engine client closes
//! the request channel, the engine's loop ends, and `shutdown` awaits the task.
//!
//! Logging is set up once per process with
//! [`setup_tracing`](reconcile_framework::tracing::setup_tracing).

pub mod provider_system;

pub use provider_system::*;
