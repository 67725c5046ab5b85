//! Batch processing over many requests with one actor.
//!
//! The contract is per-item isolation: one request failing its transition
//! never aborts its siblings, and requests the actor cannot act on are
//! excluded up front without being counted as failures. The only condition
//! that aborts a whole call is the actor failing to authenticate.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use payable_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use payable_core::batch::BatchResult;
use payable_core::domain::request::RequestId;
use payable_core::errors::EngineError;
use payable_core::workflow::WorkflowAction;

use crate::service::ApprovalEngine;

impl ApprovalEngine {
    /// Approves every request in `ids` the actor is eligible for, in
    /// parallel up to the configured limit.
    pub async fn batch_approve(
        &self,
        ids: &[RequestId],
        actor_id: &str,
        notes: Option<String>,
    ) -> Result<BatchResult, EngineError> {
        self.run_batch(ids, actor_id, WorkflowAction::Approve, notes, None).await
    }

    /// Rejects every eligible request in `ids` with one shared reason. The
    /// reason is mandatory; without one every item fails validation rather
    /// than the call erroring, so callers read one result shape.
    pub async fn batch_reject(
        &self,
        ids: &[RequestId],
        actor_id: &str,
        reason: &str,
    ) -> Result<BatchResult, EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            let mut result = BatchResult::new(ids.len());
            for id in ids {
                result.record_failure(
                    id.clone(),
                    EngineError::Validation("rejection reason is required".to_owned()),
                );
            }
            return Ok(result);
        }

        self.run_batch(ids, actor_id, WorkflowAction::Reject, None, Some(reason.to_owned())).await
    }

    async fn run_batch(
        &self,
        ids: &[RequestId],
        actor_id: &str,
        action: WorkflowAction,
        notes: Option<String>,
        rejection_reason: Option<String>,
    ) -> Result<BatchResult, EngineError> {
        let correlation = Uuid::new_v4().to_string();
        let mut result = BatchResult::new(ids.len());

        // The actor must authenticate once for the whole call. A profile
        // outside the capability table is not fatal: it simply makes every
        // item ineligible below.
        let profile_name = self
            .identity
            .profile_name(actor_id)
            .await
            .map_err(|error| EngineError::Authentication(format!("identity provider: {error}")))?
            .ok_or_else(|| {
                EngineError::Authentication(format!("actor `{actor_id}` is not resolvable"))
            })?;
        let profile = self.validator.profile(&profile_name);

        let loaded = match self.repo.find_many(ids).await {
            Ok(loaded) => loaded,
            Err(repo_error) => {
                // Cannot tell which item is at fault, so every item carries
                // the failure and the call still returns a result.
                let error = EngineError::from(repo_error);
                for id in ids {
                    result.record_failure(id.clone(), error.clone());
                }
                self.emit_batch_completed(actor_id, &correlation, action, &result);
                return Ok(result);
            }
        };
        let mut by_id: HashMap<RequestId, _> =
            loaded.into_iter().map(|request| (request.id.clone(), request)).collect();

        let semaphore = Arc::new(Semaphore::new(self.batch.max_parallelism.max(1)));
        let mut tasks: JoinSet<(RequestId, Result<(), EngineError>)> = JoinSet::new();
        let mut task_ids: HashMap<tokio::task::Id, RequestId> = HashMap::new();

        for id in ids {
            let Some(request) = by_id.remove(id) else {
                result.record_failure(id.clone(), EngineError::NotFound(id.clone()));
                continue;
            };

            let decision = self.validator.can_act(profile, request.status, action);
            if !decision.allowed {
                // Ineligible, not failed. The caller selected broadly and
                // the engine acts on what the actor may touch.
                continue;
            }
            // An allowed decision implies the profile resolved.
            let Some(profile) = profile.cloned() else { continue };

            let engine = self.clone();
            let actor = actor_id.to_owned();
            let notes = notes.clone();
            let rejection_reason = rejection_reason.clone();
            let correlation = correlation.clone();
            let semaphore = Arc::clone(&semaphore);
            let request_id = request.id.clone();

            let handle = tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            request_id,
                            Err(EngineError::Persistence("batch scheduler closed".to_owned())),
                        );
                    }
                };
                let outcome = engine
                    .transition_loaded(
                        request,
                        &profile,
                        &actor,
                        action,
                        notes,
                        rejection_reason,
                        None,
                        &correlation,
                    )
                    .await
                    .map(|_| ());
                (request_id, outcome)
            });
            task_ids.insert(handle.id(), id.clone());
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((task_id, (_request_id, Ok(())))) => {
                    task_ids.remove(&task_id);
                    result.record_success();
                }
                Ok((task_id, (request_id, Err(error)))) => {
                    task_ids.remove(&task_id);
                    result.record_failure(request_id, error);
                }
                Err(join_error) => {
                    if let Some(request_id) = task_ids.remove(&join_error.id()) {
                        result.record_failure(
                            request_id,
                            EngineError::Persistence(format!("batch task failed: {join_error}")),
                        );
                    }
                }
            }
        }

        result.failures.sort_by(|left, right| left.request_id.0.cmp(&right.request_id.0));
        self.emit_batch_completed(actor_id, &correlation, action, &result);
        Ok(result)
    }

    fn emit_batch_completed(
        &self,
        actor_id: &str,
        correlation: &str,
        action: WorkflowAction,
        result: &BatchResult,
    ) {
        tracing::info!(
            actor = actor_id,
            action = action.as_str(),
            requested = result.requested,
            succeeded = result.succeeded,
            failed = result.failures.len(),
            "batch completed"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                correlation,
                "batch.completed",
                AuditCategory::Workflow,
                actor_id,
                AuditOutcome::Success,
            )
            .with_metadata("action", action.as_str())
            .with_metadata("requested", result.requested.to_string())
            .with_metadata("succeeded", result.succeeded.to_string())
            .with_metadata("failed", result.failures.len().to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use payable_core::domain::request::{
        PaymentMethod, RequestId, RequestStatus, UrgencyLevel,
    };
    use payable_core::errors::EngineError;
    use payable_core::permissions::PermissionValidator;
    use payable_db::repositories::InMemoryAccountRepository;

    use crate::identity::InMemoryIdentityProvider;
    use crate::service::{ApprovalEngine, NewRequest};

    fn engine(repo: Arc<InMemoryAccountRepository>) -> ApprovalEngine {
        let identity = InMemoryIdentityProvider::default()
            .with_actor("u-gerente", "Gerente")
            .with_actor("u-diretor", "Diretor")
            .with_actor("u-misfit", "Visitante");
        ApprovalEngine::new(repo, Arc::new(identity), PermissionValidator::default_table())
    }

    fn payload(description: &str) -> NewRequest {
        NewRequest {
            description: description.to_string(),
            category_id: "cat-ops".to_string(),
            amount: Decimal::new(12_000, 2),
            due_date: NaiveDate::from_ymd_opt(2026, 10, 15).expect("valid date"),
            payment_method: PaymentMethod::Pix,
            payee_name: "Fornecedor Ltda".to_string(),
            bank_details: None,
            congregation_id: "cong-02".to_string(),
            urgency: UrgencyLevel::Normal,
            requested_by: "u-secretary".to_string(),
        }
    }

    async fn seed(engine: &ApprovalEngine, count: usize) -> Vec<RequestId> {
        let mut ids = Vec::with_capacity(count);
        for index in 0..count {
            let request =
                engine.create_request(payload(&format!("item {index}"))).await.expect("create");
            ids.push(request.id);
        }
        ids
    }

    #[tokio::test]
    async fn ineligible_items_are_excluded_without_counting_as_failures() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let ids = seed(&engine, 5).await;

        // Move two items past the management gate so Gerente cannot touch them.
        engine.approve(&ids[3], "u-gerente", None).await.expect("advance");
        engine.approve(&ids[3], "u-diretor", None).await.expect("advance");
        engine.approve(&ids[4], "u-gerente", None).await.expect("advance");

        let result = engine.batch_approve(&ids, "u-gerente", None).await.expect("batch");
        assert_eq!(result.requested, 5);
        assert_eq!(result.succeeded, 3);
        assert!(result.failures.is_empty());

        for id in &ids[..3] {
            let request = engine.get_request(id).await.expect("load");
            assert_eq!(request.status, RequestStatus::PendingDirector);
        }
        // The ineligible ones were left exactly where they were.
        assert_eq!(
            engine.get_request(&ids[3]).await.expect("load").status,
            RequestStatus::PendingPresident
        );
        assert_eq!(engine.get_request(&ids[4]).await.expect("load").status, RequestStatus::PendingDirector);
    }

    #[tokio::test]
    async fn one_failing_item_does_not_abort_its_siblings() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo.clone());
        let ids = seed(&engine, 4).await;

        repo.fail_next_transition_for(&ids[1]).await;

        let result = engine.batch_approve(&ids, "u-gerente", None).await.expect("batch");
        assert_eq!(result.requested, 4);
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].request_id, ids[1]);
        assert!(matches!(result.failures[0].error, EngineError::Persistence(_)));

        assert_eq!(engine.get_request(&ids[1]).await.expect("load").status, RequestStatus::PendingManagement);
        assert_eq!(engine.get_request(&ids[2]).await.expect("load").status, RequestStatus::PendingDirector);
    }

    #[tokio::test]
    async fn batch_reject_applies_one_reason_to_every_eligible_item() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let ids = seed(&engine, 3).await;

        let result =
            engine.batch_reject(&ids, "u-gerente", "orçamento excedido").await.expect("batch");
        assert_eq!(result.succeeded, 3);
        assert!(result.fully_succeeded());

        for id in &ids {
            let request = engine.get_request(id).await.expect("load");
            assert_eq!(request.status, RequestStatus::Rejected);
            assert_eq!(request.rejection_reason.as_deref(), Some("orçamento excedido"));
        }
    }

    #[tokio::test]
    async fn batch_reject_without_a_reason_fails_every_item() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let ids = seed(&engine, 2).await;

        let result = engine.batch_reject(&ids, "u-gerente", "  ").await.expect("batch");
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.failures.len(), 2);
        assert!(result
            .failures
            .iter()
            .all(|failure| matches!(failure.error, EngineError::Validation(_))));

        for id in &ids {
            assert_eq!(engine.get_request(id).await.expect("load").status, RequestStatus::PendingManagement);
        }
    }

    #[tokio::test]
    async fn unknown_actor_aborts_the_batch_without_touching_anything() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let ids = seed(&engine, 3).await;

        let error = engine.batch_approve(&ids, "u-ghost", None).await.expect_err("no actor");
        assert!(matches!(error, EngineError::Authentication(_)));

        for id in &ids {
            assert_eq!(engine.get_request(id).await.expect("load").status, RequestStatus::PendingManagement);
        }
    }

    #[tokio::test]
    async fn actor_with_unknown_profile_gets_an_empty_result_not_an_error() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let ids = seed(&engine, 2).await;

        let result = engine.batch_approve(&ids, "u-misfit", None).await.expect("batch");
        assert_eq!(result.succeeded, 0);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn missing_ids_fail_individually() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let mut ids = seed(&engine, 2).await;
        ids.push(RequestId("FR-missing".to_string()));

        let result = engine.batch_approve(&ids, "u-gerente", None).await.expect("batch");
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failures.len(), 1);
        assert!(matches!(result.failures[0].error, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_ids_are_processed_once() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let ids = seed(&engine, 1).await;
        let doubled = vec![ids[0].clone(), ids[0].clone()];

        let result = engine.batch_approve(&doubled, "u-gerente", None).await.expect("batch");
        assert_eq!(result.requested, 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failures.len(), 1, "second occurrence finds nothing left to load");
    }
}
