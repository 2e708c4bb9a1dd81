//! Key namespace for policy data.
//!
//! ```text
//! a1.policy_type.<type>
//! a1.policy_instance.<type>.<instance>
//! a1.policy_inst_metadata.<type>.<instance>
//! a1.policy_handler.<type>.<instance>.<handler>
//! ```
//!
//! Instance ids never contain `.`, so the remainder after an instance-scoped
//! prefix is always exactly one id.

use crate::policy::model::PolicyTypeId;

/// Prefix of policy type keys.
pub const TYPE_PREFIX: &str = "a1.policy_type.";
/// Prefix of policy instance keys.
pub const INSTANCE_PREFIX: &str = "a1.policy_instance.";
/// Prefix of instance metadata keys.
pub const METADATA_PREFIX: &str = "a1.policy_inst_metadata.";
/// Prefix of handler status keys.
pub const HANDLER_PREFIX: &str = "a1.policy_handler.";

/// Separator between key components.
pub const SEPARATOR: char = '.';

/// Key of a policy type.
pub fn type_key(type_id: PolicyTypeId) -> String {
    format!("{TYPE_PREFIX}{type_id}")
}

/// Prefix covering every instance of a type.
pub fn instance_prefix(type_id: PolicyTypeId) -> String {
    format!("{INSTANCE_PREFIX}{type_id}.")
}

/// Key of a policy instance.
pub fn instance_key(type_id: PolicyTypeId, instance_id: &str) -> String {
    format!("{INSTANCE_PREFIX}{type_id}.{instance_id}")
}

/// Key of an instance's metadata record.
pub fn metadata_key(type_id: PolicyTypeId, instance_id: &str) -> String {
    format!("{METADATA_PREFIX}{type_id}.{instance_id}")
}

/// Prefix covering every handler status of an instance.
pub fn handler_prefix(type_id: PolicyTypeId, instance_id: &str) -> String {
    format!("{HANDLER_PREFIX}{type_id}.{instance_id}.")
}

/// Key of one handler's status for an instance.
pub fn handler_key(type_id: PolicyTypeId, instance_id: &str, handler_id: &str) -> String {
    format!("{HANDLER_PREFIX}{type_id}.{instance_id}.{handler_id}")
}

/// Parse a type id out of a type key.
pub fn parse_type_key(key: &str) -> Option<PolicyTypeId> {
    key.strip_prefix(TYPE_PREFIX)?.parse().ok()
}

/// Strip a scan prefix, returning the trailing id component.
pub fn strip_scan_prefix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|rest| !rest.is_empty())
}
