pub mod audit;
pub mod batch;
pub mod config;
pub mod domain;
pub mod errors;
pub mod permissions;
pub mod workflow;

pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, NoopAuditSink,
};
pub use batch::{BatchFailure, BatchResult};
pub use config::{BatchConfig, DatabaseConfig, EngineConfig, LoadOptions, LogFormat, LoggingConfig};
pub use domain::approval::{ApprovalAction, ApprovalLevel, ApprovalRecord, ApprovalRecordId};
pub use domain::request::{
    FinancialRequest, PaymentMethod, RequestId, RequestStatus, UrgencyLevel,
};
pub use errors::EngineError;
pub use permissions::{
    AccessProfile, PermissionDecision, PermissionDenyReason, PermissionValidator,
};
pub use workflow::{
    next_on_approve, next_on_mark_paid, next_on_reject, next_status, required_level,
    TransitionError, WorkflowAction,
};

pub use chrono;
pub use rust_decimal;
