//! # Scenario Mock & Testing Guide
//!
//! `ScenarioMock` implements [`RemoteClient`] entirely in memory. It models the remote
//! control plane as an explicit finite-state machine: every row of its table says
//! "when operation X arrives (for id Y) while the scenario is in state S, answer R and
//! move to state T". This mirrors how a provisioning API behaves over time: the same
//! `read` answers `PROVISIONING` first and `READY` later.
//!
//! ## When to use the Scenario Mock vs a real HTTP adapter
//!
//! | Feature | ScenarioMock | HTTP adapter |
//! |---------|--------------|--------------|
//! | **Speed** | Instant (in-memory) | Network round trips |
//! | **Determinism** | Fully deterministic | Subject to the remote |
//! | **Error Injection** | Easy (`return_err`) | Needs a stub server |
//! | **Use Case** | Reconciler, poller, engine tests | Codec and classification tests |
//!
//! ## Example
//!
//! ```rust
//! use reconcile_framework::mock::{Operation, ScenarioMock, STARTED};
//! use reconcile_framework::{ClientError, OperationResult, RemoteClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let payload = json!({ "id": "ap-abc123", "display_name": "prod-ap-1" })
//!         .as_object()
//!         .cloned()
//!         .unwrap();
//!
//!     let mock = ScenarioMock::new();
//!     mock.on(Operation::Create)
//!         .when_state(STARTED)
//!         .will_set_state("provisioning")
//!         .return_ok(OperationResult::with_status(payload.clone(), "PROVISIONING"));
//!     mock.on(Operation::Read)
//!         .for_id("ap-abc123")
//!         .when_state("provisioning")
//!         .return_ok(OperationResult::with_status(payload.clone(), "READY"));
//!     mock.on(Operation::Delete)
//!         .in_any_state()
//!         .return_err(ClientError::NotFound);
//!
//!     let client = mock.client();
//!     let created = client.create(&payload).await.unwrap();
//!     assert_eq!(created.remote_status.as_deref(), Some("PROVISIONING"));
//!     assert_eq!(mock.state(), "provisioning");
//!
//!     let read = client.read("ap-abc123").await.unwrap();
//!     assert_eq!(read.remote_status.as_deref(), Some("READY"));
//!
//!     assert_eq!(client.delete("ap-abc123").await, Err(ClientError::NotFound));
//!     mock.verify();
//! }
//! ```
//!
//! Calls that match no row are answered with a `Transient` error and recorded;
//! [`ScenarioMock::verify`] fails on them and on rows that were never hit.

use crate::attributes::Attributes;
use crate::client::{OperationResult, RemoteClient};
use crate::error::ClientError;
use async_trait::async_trait;
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Initial state of every scenario.
pub const STARTED: &str = "Started";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One call the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: Operation,
    pub id: Option<String>,
    pub body: Option<Attributes>,
    /// Scenario state when the call arrived.
    pub state: String,
}

#[derive(Debug, Clone)]
enum Response {
    Ok(OperationResult),
    NoContent,
    Err(ClientError),
}

#[derive(Debug)]
struct Transition {
    operation: Operation,
    id: Option<String>,
    state: Option<String>,
    next_state: Option<String>,
    response: Response,
    hits: u32,
}

impl Transition {
    fn matches(&self, operation: Operation, id: Option<&str>, state: &str) -> bool {
        self.operation == operation
            && filter_matches(self.id.as_deref(), id)
            && filter_matches(self.state.as_deref(), Some(state))
    }
}

/// An unset filter matches everything.
fn filter_matches(filter: Option<&str>, value: Option<&str>) -> bool {
    filter.is_none() || filter == value
}

#[derive(Debug)]
struct Inner {
    state: String,
    transitions: Vec<Transition>,
    calls: Vec<RecordedCall>,
    unmatched: Vec<RecordedCall>,
}

/// An in-memory remote control plane driven by a state table.
#[derive(Debug, Clone)]
pub struct ScenarioMock {
    inner: Arc<Mutex<Inner>>,
}

impl Default for ScenarioMock {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioMock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: STARTED.to_string(),
                transitions: Vec::new(),
                calls: Vec::new(),
                unmatched: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a table row for `operation`. Rows match in any state until
    /// [`TransitionBuilder::when_state`] narrows them.
    pub fn on(&self, operation: Operation) -> TransitionBuilder {
        TransitionBuilder {
            mock: self.clone(),
            operation,
            id: None,
            state: None,
            next_state: None,
        }
    }

    /// The mock as a shareable adapter.
    pub fn client(&self) -> Arc<dyn RemoteClient> {
        Arc::new(self.clone())
    }

    pub fn state(&self) -> String {
        self.lock().state.clone()
    }

    /// Moves the scenario to `state` without a call.
    pub fn set_state(&self, state: &str) {
        self.lock().state = state.to_string();
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Number of received calls of one operation.
    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Number of mutating calls (create, update, delete).
    pub fn mutations(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation != Operation::Read)
            .count()
    }

    /// Panics if a call matched no row or a row was never hit.
    pub fn verify(&self) {
        let inner = self.lock();
        if let Some(call) = inner.unmatched.first() {
            panic!(
                "unexpected {} (id {:?}) in state {:?}; {} unmatched call(s) in total",
                call.operation,
                call.id,
                call.state,
                inner.unmatched.len()
            );
        }
        let unhit: Vec<String> = inner
            .transitions
            .iter()
            .filter(|t| t.hits == 0)
            .map(|t| format!("{} (id {:?}) in state {:?}", t.operation, t.id, t.state))
            .collect();
        if !unhit.is_empty() {
            panic!("scenario rows never hit: {}", unhit.join(", "));
        }
    }

    fn dispatch(
        &self,
        operation: Operation,
        id: Option<&str>,
        body: Option<&Attributes>,
    ) -> Result<Option<OperationResult>, ClientError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let call = RecordedCall {
            operation,
            id: id.map(str::to_string),
            body: body.cloned(),
            state: inner.state.clone(),
        };
        inner.calls.push(call.clone());

        let position = inner
            .transitions
            .iter()
            .position(|t| t.matches(operation, id, &inner.state));
        let Some(position) = position else {
            let state = inner.state.clone();
            inner.unmatched.push(call);
            return Err(ClientError::Transient(format!(
                "scenario has no {operation} row for state {state}"
            )));
        };

        let row = &mut inner.transitions[position];
        row.hits += 1;
        let response = row.response.clone();
        if let Some(next) = row.next_state.clone() {
            inner.state = next;
        }
        match response {
            Response::Ok(result) => Ok(Some(result)),
            Response::NoContent => Ok(None),
            Response::Err(error) => Err(error),
        }
    }
}

/// Fluent builder for one table row.
pub struct TransitionBuilder {
    mock: ScenarioMock,
    operation: Operation,
    id: Option<String>,
    state: Option<String>,
    next_state: Option<String>,
}

impl TransitionBuilder {
    pub fn for_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn when_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }

    pub fn in_any_state(mut self) -> Self {
        self.state = None;
        self
    }

    pub fn will_set_state(mut self, state: &str) -> Self {
        self.next_state = Some(state.to_string());
        self
    }

    pub fn return_ok(self, result: OperationResult) {
        self.finish(Response::Ok(result));
    }

    /// An empty success, as for `204 No Content` on delete.
    pub fn return_no_content(self) {
        self.finish(Response::NoContent);
    }

    pub fn return_err(self, error: ClientError) {
        self.finish(Response::Err(error));
    }

    fn finish(self, response: Response) {
        self.mock.lock().transitions.push(Transition {
            operation: self.operation,
            id: self.id,
            state: self.state,
            next_state: self.next_state,
            response,
            hits: 0,
        });
    }
}

#[async_trait]
impl RemoteClient for ScenarioMock {
    async fn create(&self, desired: &Attributes) -> Result<OperationResult, ClientError> {
        self.dispatch(Operation::Create, None, Some(desired))
            .map(Option::unwrap_or_default)
    }

    async fn read(&self, id: &str) -> Result<OperationResult, ClientError> {
        self.dispatch(Operation::Read, Some(id), None)
            .map(Option::unwrap_or_default)
    }

    async fn update(&self, id: &str, desired: &Attributes) -> Result<OperationResult, ClientError> {
        self.dispatch(Operation::Update, Some(id), Some(desired))
            .map(Option::unwrap_or_default)
    }

    async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.dispatch(Operation::Delete, Some(id), None).map(|_| ())
    }
}
