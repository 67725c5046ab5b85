use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::ApprovalLevel;
use crate::domain::request::RequestStatus;

/// Caller-intended action against a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Approve,
    Reject,
    MarkPaid,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::MarkPaid => "mark_paid",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition: cannot {action:?} a request in status {from:?}")]
    InvalidTransition { from: RequestStatus, action: WorkflowAction },
}

/// Next status after an approval. Advances exactly one step along the
/// pending chain; approval is not idempotent and never re-advances an
/// approved or terminal request.
pub fn next_on_approve(status: RequestStatus) -> Result<RequestStatus, TransitionError> {
    match status {
        RequestStatus::PendingManagement => Ok(RequestStatus::PendingDirector),
        RequestStatus::PendingDirector => Ok(RequestStatus::PendingPresident),
        RequestStatus::PendingPresident => Ok(RequestStatus::Approved),
        RequestStatus::Approved | RequestStatus::Paid | RequestStatus::Rejected => {
            Err(TransitionError::InvalidTransition { from: status, action: WorkflowAction::Approve })
        }
    }
}

/// Rejection is legal from any pending status and nowhere else.
pub fn next_on_reject(status: RequestStatus) -> Result<RequestStatus, TransitionError> {
    if status.is_pending() {
        Ok(RequestStatus::Rejected)
    } else {
        Err(TransitionError::InvalidTransition { from: status, action: WorkflowAction::Reject })
    }
}

/// Settlement is legal only once the full chain has approved.
pub fn next_on_mark_paid(status: RequestStatus) -> Result<RequestStatus, TransitionError> {
    match status {
        RequestStatus::Approved => Ok(RequestStatus::Paid),
        _ => Err(TransitionError::InvalidTransition { from: status, action: WorkflowAction::MarkPaid }),
    }
}

pub fn next_status(
    status: RequestStatus,
    action: WorkflowAction,
) -> Result<RequestStatus, TransitionError> {
    match action {
        WorkflowAction::Approve => next_on_approve(status),
        WorkflowAction::Reject => next_on_reject(status),
        WorkflowAction::MarkPaid => next_on_mark_paid(status),
    }
}

/// The approval level required to act on a pending status. This map is the
/// single source of truth consulted by the permission validator.
pub fn required_level(status: RequestStatus) -> Option<ApprovalLevel> {
    match status {
        RequestStatus::PendingManagement => Some(ApprovalLevel::Management),
        RequestStatus::PendingDirector => Some(ApprovalLevel::Director),
        RequestStatus::PendingPresident => Some(ApprovalLevel::President),
        RequestStatus::Approved | RequestStatus::Paid | RequestStatus::Rejected => None,
    }
}
