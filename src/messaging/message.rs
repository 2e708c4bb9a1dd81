//! Message types and JSON bodies exchanged with policy handlers.

use crate::policy::model::PolicyTypeId;
use crate::storage::keys::SEPARATOR;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Outbound CREATE/DELETE requests and query replies.
pub const A1_POLICY_REQUEST: i32 = 20010;
/// Inbound handler status reports.
pub const A1_POLICY_RESPONSE: i32 = 20011;
/// Inbound "send me every instance of type X" queries.
pub const A1_POLICY_QUERY: i32 = 20012;

/// Operation carried by a handler request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Body sent to handlers for an instance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerRequest {
    pub operation: Operation,
    pub policy_type_id: PolicyTypeId,
    pub policy_instance_id: String,
    /// Instance payload for CREATE; null for DELETE.
    pub payload: Option<Value>,
}

impl HandlerRequest {
    /// CREATE request carrying the payload.
    pub fn create(type_id: PolicyTypeId, instance_id: &str, payload: Value) -> Self {
        Self {
            operation: Operation::Create,
            policy_type_id: type_id,
            policy_instance_id: instance_id.to_string(),
            payload: Some(payload),
        }
    }

    /// DELETE request.
    pub fn delete(type_id: PolicyTypeId, instance_id: &str) -> Self {
        Self {
            operation: Operation::Delete,
            policy_type_id: type_id,
            policy_instance_id: instance_id.to_string(),
            payload: None,
        }
    }

    /// Encode as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Status report from one handler about one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub policy_type_id: PolicyTypeId,
    pub policy_instance_id: String,
    pub handler_id: String,
    pub status: String,
}

/// Query for every instance of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyQuery {
    pub policy_type_id: PolicyTypeId,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Status(StatusReport),
    Query(PolicyQuery),
}

/// Reasons an inbound message is dropped before touching state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedMessage {
    #[error("unexpected message type {0}")]
    UnexpectedType(i32),

    #[error("invalid body: {0}")]
    InvalidBody(String),

    #[error("invalid handler id {0:?}")]
    InvalidHandlerId(String),
}

/// Decode an inbound message by type.
pub fn parse_inbound(message_type: i32, payload: &[u8]) -> Result<Inbound, MalformedMessage> {
    let invalid = |e: serde_json::Error| MalformedMessage::InvalidBody(e.to_string());
    match message_type {
        A1_POLICY_RESPONSE => {
            let report: StatusReport = serde_json::from_slice(payload).map_err(invalid)?;
            check_handler_id(&report.handler_id)?;
            Ok(Inbound::Status(report))
        }
        A1_POLICY_QUERY => serde_json::from_slice(payload)
            .map(Inbound::Query)
            .map_err(invalid),
        other => Err(MalformedMessage::UnexpectedType(other)),
    }
}

/// Handler ids become the last key segment of a status record.
fn check_handler_id(handler_id: &str) -> Result<(), MalformedMessage> {
    if handler_id.is_empty()
        || handler_id.contains(SEPARATOR)
        || handler_id.chars().any(char::is_control)
    {
        return Err(MalformedMessage::InvalidHandlerId(handler_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let create = HandlerRequest::create(20000, "p1", json!({"enforce": true}));
        let v: Value = serde_json::from_slice(&create.to_bytes().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "operation": "CREATE",
                "policy_type_id": 20000,
                "policy_instance_id": "p1",
                "payload": {"enforce": true}
            })
        );

        let delete = HandlerRequest::delete(20000, "p1");
        let v: Value = serde_json::from_slice(&delete.to_bytes().unwrap()).unwrap();
        assert_eq!(v["operation"], "DELETE");
        assert!(v["payload"].is_null());
    }

    #[test]
    fn test_parse_status() {
        let body = br#"{"policy_type_id": 20000, "policy_instance_id": "p1", "handler_id": "h1", "status": "OK"}"#;
        let parsed = parse_inbound(A1_POLICY_RESPONSE, body).unwrap();
        assert_eq!(
            parsed,
            Inbound::Status(StatusReport {
                policy_type_id: 20000,
                policy_instance_id: "p1".into(),
                handler_id: "h1".into(),
                status: "OK".into(),
            })
        );
    }

    #[test]
    fn test_parse_rejects_missing_fields_and_garbage() {
        let missing = br#"{"policy_type_id": 20000, "policy_instance_id": "p1", "status": "OK"}"#;
        assert!(matches!(
            parse_inbound(A1_POLICY_RESPONSE, missing),
            Err(MalformedMessage::InvalidBody(_))
        ));
        assert!(parse_inbound(A1_POLICY_RESPONSE, b"asdf").is_err());
        assert!(parse_inbound(A1_POLICY_QUERY, b"{}").is_err());
        assert_eq!(
            parse_inbound(A1_POLICY_REQUEST, b"{}"),
            Err(MalformedMessage::UnexpectedType(A1_POLICY_REQUEST))
        );
    }

    #[test]
    fn test_parse_rejects_unusable_handler_ids() {
        for handler in ["", "h.1", "h\n1"] {
            let body = serde_json::to_vec(&json!({
                "policy_type_id": 20000,
                "policy_instance_id": "p1",
                "handler_id": handler,
                "status": "OK",
            }))
            .unwrap();
            assert_eq!(
                parse_inbound(A1_POLICY_RESPONSE, &body),
                Err(MalformedMessage::InvalidHandlerId(handler.to_string()))
            );
        }
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse_inbound(A1_POLICY_QUERY, br#"{"policy_type_id": 7}"#).unwrap(),
            Inbound::Query(PolicyQuery { policy_type_id: 7 })
        );
    }
}
