//! Error types and outcome mapping.
//!
//! Lifecycle operations surface a small, closed set of outcomes: not-found,
//! conflict, validation failure, and service-unavailable. Transport failures
//! and malformed inbound messages are handled inside the background path and
//! never reach a lifecycle caller.

use crate::policy::model::PolicyTypeId;
use thiserror::Error;

/// Errors returned by the lifecycle core.
#[derive(Debug, Error)]
pub enum MediatorError {
    /// The policy type does not exist.
    #[error("policy type {type_id} not found")]
    TypeNotFound { type_id: PolicyTypeId },

    /// The policy instance does not exist (or was purged by reconciliation).
    #[error("policy instance {type_id}/{instance_id} not found")]
    InstanceNotFound {
        type_id: PolicyTypeId,
        instance_id: String,
    },

    /// A type with the same id is already registered. Types are immutable.
    #[error("policy type {type_id} already exists")]
    TypeAlreadyExists { type_id: PolicyTypeId },

    /// The type still owns at least one instance.
    #[error("policy type {type_id} still owns {instance_count} instance(s)")]
    TypeNotEmpty {
        type_id: PolicyTypeId,
        instance_count: usize,
    },

    /// The type body is unusable (missing or uncompilable `create_schema`, id mismatch).
    #[error("invalid policy type definition: {message}")]
    InvalidTypeDefinition { message: String },

    /// An instance payload failed validation against its type's schema.
    #[error("schema validation failed: {message}")]
    SchemaValidation { message: String },

    /// An identifier cannot be used as part of a storage key.
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: String },

    /// The State Store backend is unreachable or refused the operation.
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// Stored data could not be decoded.
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Coarse outcome classes for the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Type or instance absent. Not retried.
    NotFound,
    /// Type already exists, or type non-empty on delete. Not retried.
    Conflict,
    /// Payload or definition rejected. Not retried.
    Validation,
    /// Backend unreachable; distinct from NotFound.
    Unavailable,
    /// Corrupt stored state.
    Internal,
}

impl MediatorError {
    /// Create a TypeNotFound error.
    pub fn type_not_found(type_id: PolicyTypeId) -> Self {
        Self::TypeNotFound { type_id }
    }

    /// Create an InstanceNotFound error.
    pub fn instance_not_found(type_id: PolicyTypeId, instance_id: impl Into<String>) -> Self {
        Self::InstanceNotFound {
            type_id,
            instance_id: instance_id.into(),
        }
    }

    /// Create an InvalidTypeDefinition error.
    pub fn invalid_type(message: impl Into<String>) -> Self {
        Self::InvalidTypeDefinition {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeNotFound { .. } | Self::InstanceNotFound { .. } => ErrorKind::NotFound,
            Self::TypeAlreadyExists { .. } | Self::TypeNotEmpty { .. } => ErrorKind::Conflict,
            Self::InvalidTypeDefinition { .. }
            | Self::SchemaValidation { .. }
            | Self::InvalidIdentifier { .. } => ErrorKind::Validation,
            Self::ServiceUnavailable { .. } => ErrorKind::Unavailable,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error means the entity is absent.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if the caller may retry the same request later.
    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}

/// Result type using MediatorError.
pub type MediatorResult<T> = Result<T, MediatorError>;

/// Failures reported by a State Store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backend refused the request.
    #[error("store rejected request: {0}")]
    Rejected(String),

    /// The backend is not connected.
    #[error("store not connected")]
    NotConnected,

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for MediatorError {
    fn from(err: StoreError) -> Self {
        Self::ServiceUnavailable {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// HTTP outcome mapping
// ============================================================================

/// Successful outcomes of lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Type registered.
    Created,
    /// Instance change queued for delivery.
    Accepted,
    /// Type removed.
    Deleted,
    /// Read succeeded.
    Ok,
}

/// Status-code mapping for the HTTP surface.
pub struct HttpStatusMapping;

impl HttpStatusMapping {
    /// Map a successful outcome to an HTTP status code.
    pub fn outcome_status(outcome: Outcome) -> u16 {
        match outcome {
            Outcome::Created => 201,
            Outcome::Accepted => 202,
            Outcome::Deleted => 204,
            Outcome::Ok => 200,
        }
    }

    /// Map an error to an HTTP status code.
    pub fn error_status(error: &MediatorError) -> u16 {
        match error.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::Validation => 400,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// Map an operation result to an HTTP status code.
    pub fn status<T>(result: &MediatorResult<T>, outcome: Outcome) -> u16 {
        match result {
            Ok(_) => Self::outcome_status(outcome),
            Err(e) => Self::error_status(e),
        }
    }
}
