//! # Reconcile Framework
//!
//! This crate provides the building blocks for reconciling declared resources against a
//! remote control plane whose operations complete asynchronously. It follows the
//! **Actor Model**: one engine task owns every instance record and processes requests
//! sequentially, while a pass fans out one task per instance.
//!
//! ## Architecture Overview
//!
//! The framework separates concerns into three layers:
//!
//! 1. **Kind Layer** ([`ResourceKind`], [`Schema`]) - what each resource type looks like:
//!    mutable, immutable and computed fields, and which remote statuses are terminal.
//! 2. **Runtime Layer** ([`ReconcileEngine`], [`Reconciler`], [`ConvergencePoller`],
//!    [`DependencyGate`]) - the lifecycle state machine, polling and dependency ordering.
//! 3. **Interface Layer** ([`EngineClient`], [`RemoteClient`]) - requests into the engine
//!    and calls out to the remote API.
//!
//! You describe a kind **once** (an enum implementing [`ResourceKind`] plus a static
//! [`Schema`]), register a [`RemoteClient`] per kind, and the engine handles creation,
//! polling, drift detection, updates, deletion and ordering.
//!
//! ## Lifecycle
//!
//! ```text
//! unmanaged ──create──▶ creating ──▶ provisioning ──poll──▶ ready ◀──poll── updating
//!                                         │                   │  ╲__update__╱
//!                                         ▼                   ▼
//!                                      errored            deleting ──▶ deleted
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use reconcile_framework::{
//!     Adapters, DesiredDocument, EngineConfig, FieldRule, ReconcileEngine, ResourceKind, Schema,
//! };
//! use reconcile_framework::mock::{Operation, ScenarioMock};
//! use reconcile_framework::OperationResult;
//! use serde_json::json;
//! use std::fmt;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
//! struct ServiceAccount;
//!
//! static SCHEMA: Schema = Schema {
//!     fields: &[FieldRule::computed("id"), FieldRule::mutable("description")],
//!     status: None,
//!     validate: None,
//! };
//!
//! impl fmt::Display for ServiceAccount {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("service_account") }
//! }
//!
//! impl ResourceKind for ServiceAccount {
//!     fn name(&self) -> &'static str { "service_account" }
//!     fn schema(&self) -> &'static Schema { &SCHEMA }
//!     fn from_name(name: &str) -> Option<Self> { (name == "service_account").then_some(ServiceAccount) }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let created = json!({ "id": "sa-123", "description": "app" }).as_object().cloned().unwrap();
//!     let remote = ScenarioMock::new();
//!     remote.on(Operation::Create).return_ok(OperationResult::ready(created));
//!
//!     let (engine, client) = ReconcileEngine::new(EngineConfig::default());
//!     tokio::spawn(engine.run(Adapters::new().register(ServiceAccount, remote.client())));
//!
//!     let desired = json!({ "description": "app" }).as_object().cloned().unwrap();
//!     client.apply(DesiredDocument::new("service_account.app", ServiceAccount, desired)).await.unwrap();
//!
//!     let report = client.converge().await.unwrap();
//!     assert!(report.is_converged());
//!
//!     let instance = client.get("service_account.app").await.unwrap().unwrap();
//!     assert_eq!(instance.id.as_deref(), Some("sa-123"));
//!     remote.verify();
//! }
//! ```
//!
//! ## Testing
//!
//! See [`mock`] for the scenario mock that stands in for a remote API in tests.

pub mod actor;
pub mod attributes;
pub mod client;
pub mod config;
pub mod diff;
pub mod engine_client;
pub mod entity;
pub mod error;
pub mod gate;
pub mod instance;
pub mod message;
pub mod mock;
pub mod poller;
pub mod reconciler;
pub mod report;
pub mod state;
pub mod tracing;

pub use actor::ReconcileEngine;
pub use attributes::Attributes;
pub use client::{Adapters, OperationResult, RemoteClient, RetryingClient};
pub use config::{Backoff, EngineConfig, PollPolicy, RetryPolicy};
pub use diff::{diff, DiffReport};
pub use engine_client::EngineClient;
pub use entity::{FieldMode, FieldRule, ListOrdering, Phase, ResourceKind, Schema, StatusRules};
pub use error::{ClientError, ConfigError, EngineError, ReconcileError};
pub use gate::{Authorization, DependencyGate};
pub use instance::{DesiredDocument, InstanceKey, InstanceStatus, ResourceInstance, Target};
pub use message::EngineRequest;
pub use poller::{cancellation, CancelHandle, Cancellation, ConvergencePoller};
pub use reconciler::{Action, Outcome, Reconciler};
pub use report::{ConvergeReport, ConvergeStop, PassReport};
pub use state::{InstanceState, StateSnapshot};
