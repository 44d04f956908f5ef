//! # Engine Messages
//!
//! Requests the [`EngineClient`](crate::EngineClient) sends to the
//! [`ReconcileEngine`](crate::ReconcileEngine). Every request carries a oneshot
//! sender for its reply.

use crate::entity::ResourceKind;
use crate::error::EngineError;
use crate::instance::{DesiredDocument, InstanceKey, ResourceInstance};
use crate::reconciler::Outcome;
use crate::report::{ConvergeReport, PassReport};
use crate::state::StateSnapshot;
use tokio::sync::oneshot;

pub type Response<T> = oneshot::Sender<Result<T, EngineError>>;

#[derive(Debug)]
pub enum EngineRequest<K: ResourceKind> {
    Apply {
        document: DesiredDocument<K>,
        respond_to: Response<()>,
    },
    Remove {
        key: InstanceKey,
        respond_to: Response<()>,
    },
    Get {
        key: InstanceKey,
        respond_to: Response<Option<ResourceInstance<K>>>,
    },
    RunPass {
        respond_to: Response<PassReport>,
    },
    Converge {
        respond_to: Response<ConvergeReport>,
    },
    Refresh {
        key: InstanceKey,
        respond_to: Response<Outcome>,
    },
    Snapshot {
        respond_to: Response<StateSnapshot>,
    },
    Restore {
        snapshot: StateSnapshot,
        respond_to: Response<()>,
    },
}
