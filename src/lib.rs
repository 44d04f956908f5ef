//! # Cloud Reconciler
//!
//! > **Declared cloud resources, reconciled against an asynchronous control plane.**
//!
//! This crate manages environments, private networks, Kafka clusters and topics,
//! service accounts, API keys, role bindings and egress access points. You declare
//! what should exist; the engine from [`reconcile_framework`] creates, polls, updates
//! and deletes until the remote side matches, in dependency order.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Kinds ([`model`], [`resources`])
//! - **Role**: [`ResourceType`](model::ResourceType) lists every kind; each kind has a
//!   static schema saying which fields can change in place, which are fixed at creation,
//!   which the server computes, and which statuses end a poll.
//! - **Access points** carry a tagged union of egress endpoints (AWS or Azure private
//!   link). Exactly one variant is set; see [`model::access_point`].
//!
//! ### 2. The Adapters ([`clients`])
//! - **Role**: turn attributes into REST calls and responses back into attributes.
//! - **Key items**: [`HttpResourceClient`](clients::HttpResourceClient),
//!   [`PayloadCodec`](clients::PayloadCodec), [`ProviderContext`](clients::ProviderContext).
//!
//! ### 3. The Orchestrator ([`lifecycle`])
//! - **Role**: spins up the engine with its adapters and shuts it down.
//! - **Key items**: [`ProviderSystem`](lifecycle::ProviderSystem).
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the demo scenario with info logs
//! RUST_LOG=info cargo run
//!
//! # Run all tests
//! cargo test
//! ```

pub mod clients;
pub mod lifecycle;
pub mod model;
pub mod resources;
