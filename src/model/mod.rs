//! Resource kinds and the typed API models that need more than plain attributes.

pub mod access_point;
pub mod resource_type;

pub use access_point::*;
pub use resource_type::*;
