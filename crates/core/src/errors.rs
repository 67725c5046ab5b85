use thiserror::Error;

use crate::domain::request::{RequestId, RequestStatus};
use crate::workflow::TransitionError;

/// Engine-level error taxonomy. Single-item operations return these with no
/// partial effect; batch operations capture everything except
/// `Authentication` per item.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("permission denied for profile `{profile}`: {reason}")]
    PermissionDenied { profile: String, reason: String },
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("request `{}` not found", .0 .0)]
    NotFound(RequestId),
    #[error("request `{}` changed concurrently, expected status {expected:?}", request_id.0)]
    ConcurrencyConflict { request_id: RequestId, expected: RequestStatus },
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Whether the error aborts a whole batch call rather than a single
    /// item. Only authentication does; see the batch contract.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}
