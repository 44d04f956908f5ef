//! # Resource Schemas
//!
//! One static [`Schema`](reconcile_framework::Schema) per kind, grouped by the API
//! family that serves it. A schema decides what drift means for its kind: which
//! fields can be updated in place, which are fixed at creation, which the server
//! computes, and which remote statuses end a poll.
//!
//! | Module | Kinds | Asynchronous |
//! |--------|-------|--------------|
//! | [`org`] | environment | no |
//! | [`networking`] | network, private link access, access point | yes |
//! | [`kafka`] | Kafka cluster, topic | cluster only |
//! | [`iam`] | service account, API key, role binding | no |

pub mod iam;
pub mod kafka;
pub mod networking;
pub mod org;

use reconcile_framework::attributes::{self, Attributes};

/// Requires `block` to hold exactly one element with a non-empty `id`.
pub(crate) fn require_reference(attrs: &Attributes, block: &str) -> Result<(), String> {
    match attributes::count(attrs, block) {
        1 => {}
        n => return Err(format!("{block} must contain exactly one element, found {n}")),
    }
    let id = attributes::get_str(attrs, &format!("{block}.0.id"))
        .or_else(|| attributes::get_str(attrs, &format!("{block}.id")));
    match id {
        Some(id) if !id.is_empty() => Ok(()),
        _ => Err(format!("{block}.id must be set")),
    }
}

/// Requires a non-empty string attribute.
pub(crate) fn require_str(attrs: &Attributes, name: &str) -> Result<(), String> {
    match attributes::get_str(attrs, name) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(format!("{name} must be set")),
    }
}
