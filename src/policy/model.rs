//! Policy data model.
//!
//! Types are registered once and never modified. Instances belong to exactly
//! one type and carry a per-handler status map that is reset whenever the
//! payload is replaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Policy type identifier. Also used as the routing key for outbound messages.
pub type PolicyTypeId = i64;

/// Handler status meaning the policy is applied.
pub const STATUS_OK: &str = "OK";

/// Handler status meaning the policy was removed by that handler.
pub const STATUS_DELETED: &str = "DELETED";

/// Field of a type body holding the instance schema.
pub const CREATE_SCHEMA_FIELD: &str = "create_schema";

/// Optional field of a type body echoing the type id.
pub const TYPE_ID_FIELD: &str = "policy_type_id";

/// A registered policy type.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyType {
    /// Type identifier.
    pub id: PolicyTypeId,
    /// Opaque type document; contains `create_schema`.
    pub body: Value,
}

impl PolicyType {
    /// The schema that instance payloads are validated against.
    pub fn create_schema(&self) -> Option<&Value> {
        self.body.get(CREATE_SCHEMA_FIELD)
    }
}

/// Bookkeeping stored alongside each instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    /// When the current payload was written.
    pub created_at: DateTime<Utc>,
    /// Whether deletion has been requested.
    pub has_been_deleted: bool,
    /// When deletion was first requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl InstanceMetadata {
    /// Metadata for a freshly written instance.
    pub fn created(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            has_been_deleted: false,
            deleted_at: None,
        }
    }

    /// Mark deletion requested. The first request's timestamp is kept.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        if !self.has_been_deleted {
            self.has_been_deleted = true;
            self.deleted_at = Some(now);
        }
    }
}

/// A policy instance with its handler statuses.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyInstance {
    pub type_id: PolicyTypeId,
    pub instance_id: String,
    pub payload: Value,
    pub metadata: InstanceMetadata,
    /// handler id -> last reported status.
    pub statuses: HashMap<String, String>,
}

/// Instance-level verdict derived from handler statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateStatus {
    /// At least one handler reported OK.
    #[serde(rename = "IN EFFECT")]
    InEffect,
    /// No handler reported OK.
    #[serde(rename = "NOT IN EFFECT")]
    NotInEffect,
}

impl AggregateStatus {
    /// Collapse handler statuses into one verdict.
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a str>) -> Self {
        if statuses.into_iter().any(|s| s == STATUS_OK) {
            Self::InEffect
        } else {
            Self::NotInEffect
        }
    }

    /// Wire string for this verdict.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InEffect => "IN EFFECT",
            Self::NotInEffect => "NOT IN EFFECT",
        }
    }
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether a status set qualifies the instance for purge.
///
/// The set must be non-empty and every entry must be DELETED. An instance that
/// never heard from any handler is never purged.
pub fn all_deleted<'a>(statuses: impl IntoIterator<Item = &'a str>) -> bool {
    let mut seen = false;
    for status in statuses {
        if status != STATUS_DELETED {
            return false;
        }
        seen = true;
    }
    seen
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatusReport {
    pub instance_status: AggregateStatus,
    pub created_at: DateTime<Utc>,
    pub has_been_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl InstanceStatusReport {
    /// Build a report from metadata and the current status set.
    pub fn new<'a>(
        metadata: &InstanceMetadata,
        statuses: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            instance_status: AggregateStatus::from_statuses(statuses),
            created_at: metadata.created_at,
            has_been_deleted: metadata.has_been_deleted,
            deleted_at: metadata.deleted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_status() {
        assert_eq!(
            AggregateStatus::from_statuses(Vec::<&str>::new()),
            AggregateStatus::NotInEffect
        );
        assert_eq!(
            AggregateStatus::from_statuses(["OK"]),
            AggregateStatus::InEffect
        );
        assert_eq!(
            AggregateStatus::from_statuses(["DELETED", "OK"]),
            AggregateStatus::InEffect
        );
        assert_eq!(
            AggregateStatus::from_statuses(["ERROR", "DELETED"]),
            AggregateStatus::NotInEffect
        );
        // Exact match only.
        assert_eq!(
            AggregateStatus::from_statuses(["ok"]),
            AggregateStatus::NotInEffect
        );
        assert_eq!(AggregateStatus::InEffect.to_string(), "IN EFFECT");
    }

    #[test]
    fn test_all_deleted() {
        assert!(!all_deleted(Vec::<&str>::new()));
        assert!(all_deleted(["DELETED"]));
        assert!(all_deleted(["DELETED", "DELETED"]));
        assert!(!all_deleted(["DELETED", "OK"]));
        assert!(!all_deleted(["deleted"]));
    }

    #[test]
    fn test_mark_deleted_keeps_first_timestamp() {
        let t0 = Utc::now();
        let mut meta = InstanceMetadata::created(t0);
        let first = t0 + chrono::Duration::seconds(1);
        meta.mark_deleted(first);
        meta.mark_deleted(first + chrono::Duration::seconds(5));
        assert!(meta.has_been_deleted);
        assert_eq!(meta.deleted_at, Some(first));
    }

    #[test]
    fn test_status_serializes_as_wire_string() {
        let json = serde_json::to_string(&AggregateStatus::NotInEffect).unwrap();
        assert_eq!(json, "\"NOT IN EFFECT\"");
    }
}
