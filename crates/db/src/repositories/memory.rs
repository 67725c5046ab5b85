use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use payable_core::domain::approval::ApprovalRecord;
use payable_core::domain::request::{FinancialRequest, RequestId, RequestStatus};

use super::{AccountRepository, RepositoryError, TransitionRecord};

/// Trait-faithful in-memory store for engine tests, including the
/// expected-status guard. `fail_next_transition_for` poisons a single id so
/// batch tests can exercise per-item failure isolation.
#[derive(Default)]
pub struct InMemoryAccountRepository {
    requests: RwLock<HashMap<String, FinancialRequest>>,
    records: RwLock<Vec<ApprovalRecord>>,
    poisoned: RwLock<HashSet<String>>,
}

impl InMemoryAccountRepository {
    pub async fn fail_next_transition_for(&self, id: &RequestId) {
        self.poisoned.write().await.insert(id.0.clone());
    }
}

#[async_trait::async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn insert(&self, request: FinancialRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<FinancialRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn find_many(&self, ids: &[RequestId]) -> Result<Vec<FinancialRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut found: Vec<FinancialRequest> =
            ids.iter().filter_map(|id| requests.get(&id.0).cloned()).collect();
        found.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        found.dedup_by(|left, right| left.id == right.id);
        Ok(found)
    }

    async fn apply_transition(
        &self,
        record: TransitionRecord,
    ) -> Result<FinancialRequest, RepositoryError> {
        if self.poisoned.write().await.remove(&record.request_id.0) {
            return Err(RepositoryError::Decode(format!(
                "injected transition failure for `{}`",
                record.request_id.0
            )));
        }

        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(&record.request_id.0) else {
            return Err(RepositoryError::NotFound { request_id: record.request_id });
        };

        if request.status != record.expected_status {
            return Err(RepositoryError::ConcurrencyConflict {
                request_id: record.request_id,
                expected: record.expected_status,
            });
        }

        request.status = record.next_status;
        request.updated_at = record.occurred_at;
        match record.next_status {
            RequestStatus::Approved => request.approved_at = Some(record.occurred_at),
            RequestStatus::Paid => {
                request.paid_at = Some(record.occurred_at);
                request.payment_attachment = record.payment_attachment.clone();
            }
            RequestStatus::Rejected => {
                request.rejected_at = Some(record.occurred_at);
                request.rejection_reason = record.rejection_reason.clone();
            }
            _ => {}
        }

        if let (Some(level), Some(action)) = (record.level, record.action) {
            self.records.write().await.push(ApprovalRecord {
                id: record.record_id,
                request_id: request.id.clone(),
                actor_id: record.actor_id,
                level,
                action,
                notes: record.notes,
                created_at: record.occurred_at,
            });
        }

        Ok(request.clone())
    }

    async fn approval_history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut history: Vec<ApprovalRecord> =
            records.iter().filter(|record| &record.request_id == request_id).cloned().collect();
        history.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(history)
    }
}
