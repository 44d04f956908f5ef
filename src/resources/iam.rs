use super::{require_reference, require_str};
use reconcile_framework::attributes::{self, Attributes};
use reconcile_framework::{FieldRule, Schema};

pub static SERVICE_ACCOUNT: Schema = Schema {
    fields: &[
        FieldRule::computed("id"),
        FieldRule::immutable("display_name"),
        FieldRule::mutable("description"),
    ],
    status: None,
    validate: Some(validate_service_account),
};

fn validate_service_account(attrs: &Attributes) -> Result<(), String> {
    require_str(attrs, "display_name")
}

/// The secret is only returned by the create call and is never logged.
pub static API_KEY: Schema = Schema {
    fields: &[
        FieldRule::computed("id"),
        FieldRule::computed("secret").sensitive(),
        FieldRule::mutable("display_name"),
        FieldRule::mutable("description"),
        FieldRule::immutable("owner"),
        FieldRule::immutable("managed_resource"),
    ],
    status: None,
    validate: Some(validate_api_key),
};

fn validate_api_key(attrs: &Attributes) -> Result<(), String> {
    require_reference(attrs, "owner")?;
    if attributes::count(attrs, "managed_resource") > 0 {
        require_reference(attrs, "managed_resource")?;
    }
    Ok(())
}

/// Role bindings have no mutable fields; any change is a replacement.
pub static ROLE_BINDING: Schema = Schema {
    fields: &[
        FieldRule::computed("id"),
        FieldRule::immutable("principal"),
        FieldRule::immutable("role_name"),
        FieldRule::immutable("crn_pattern"),
    ],
    status: None,
    validate: Some(validate_role_binding),
};

fn validate_role_binding(attrs: &Attributes) -> Result<(), String> {
    require_str(attrs, "role_name")?;
    require_str(attrs, "crn_pattern")?;
    match attributes::get_str(attrs, "principal") {
        Some(principal) if principal.starts_with("User:") || principal.starts_with("Group:") => {
            Ok(())
        }
        _ => Err("principal must be of the form User:<id> or Group:<id>".to_string()),
    }
}
