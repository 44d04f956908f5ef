use reconcile_framework::{FieldRule, Schema};

/// Environments are created synchronously; the response is final.
pub static ENVIRONMENT: Schema = Schema {
    fields: &[
        FieldRule::computed("id"),
        FieldRule::computed("resource_name"),
        FieldRule::mutable("display_name"),
        FieldRule::mutable("stream_governance"),
    ],
    status: None,
    validate: Some(validate_environment),
};

fn validate_environment(attrs: &reconcile_framework::Attributes) -> Result<(), String> {
    super::require_str(attrs, "display_name")
}
