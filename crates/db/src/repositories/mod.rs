use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use payable_core::domain::approval::{ApprovalAction, ApprovalLevel, ApprovalRecord, ApprovalRecordId};
use payable_core::domain::request::{FinancialRequest, RequestId, RequestStatus};
use payable_core::errors::EngineError;

pub mod account;
pub mod memory;

pub use account::SqlAccountRepository;
pub use memory::InMemoryAccountRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request `{}` not found", request_id.0)]
    NotFound { request_id: RequestId },
    #[error("request `{}` no longer in status {expected:?}", request_id.0)]
    ConcurrencyConflict { request_id: RequestId, expected: RequestStatus },
}

impl From<RepositoryError> for EngineError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound { request_id } => EngineError::NotFound(request_id),
            RepositoryError::ConcurrencyConflict { request_id, expected } => {
                EngineError::ConcurrencyConflict { request_id, expected }
            }
            RepositoryError::Database(error) => EngineError::Persistence(error.to_string()),
            RepositoryError::Decode(message) => EngineError::Persistence(message),
        }
    }
}

/// One status transition to be applied as a single atomic unit: the guarded
/// status update plus, for approvals and rejections, the matching ledger row.
///
/// `expected_status` is the status the caller read before deciding; the
/// update must fail with `ConcurrencyConflict` if the row has moved on.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionRecord {
    pub record_id: ApprovalRecordId,
    pub request_id: RequestId,
    pub expected_status: RequestStatus,
    pub next_status: RequestStatus,
    pub actor_id: String,
    /// Level the actor acted at. `None` for settlement (mark paid), which
    /// writes no ledger row.
    pub level: Option<ApprovalLevel>,
    pub action: Option<ApprovalAction>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub payment_attachment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn insert(&self, request: FinancialRequest) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<FinancialRequest>, RepositoryError>;

    /// Loads the requests that exist among `ids`; missing ids are simply
    /// absent from the result.
    async fn find_many(&self, ids: &[RequestId]) -> Result<Vec<FinancialRequest>, RepositoryError>;

    /// Applies the transition unit atomically and returns the updated
    /// request. Either the status update and the ledger row both commit, or
    /// neither does.
    async fn apply_transition(
        &self,
        record: TransitionRecord,
    ) -> Result<FinancialRequest, RepositoryError>;

    /// The append-only ledger for a request, oldest first.
    async fn approval_history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError>;
}
