use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use payable_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use payable_core::config::BatchConfig;
use payable_core::domain::approval::{ApprovalAction, ApprovalRecord, ApprovalRecordId};
use payable_core::domain::request::{
    FinancialRequest, PaymentMethod, RequestId, RequestStatus, UrgencyLevel,
};
use payable_core::errors::EngineError;
use payable_core::permissions::{AccessProfile, PermissionDenyReason, PermissionValidator};
use payable_core::workflow::{next_status, TransitionError, WorkflowAction};
use payable_db::repositories::{AccountRepository, TransitionRecord};

use crate::identity::IdentityProvider;
use crate::notify::{NoopDispatcher, NotificationDispatcher, TransitionNotice};

/// Intake payload. Producers (manual entry, bulk import) all go through
/// this; every request starts at the bottom of the pending chain.
#[derive(Clone, Debug)]
pub struct NewRequest {
    pub description: String,
    pub category_id: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub payee_name: String,
    pub bank_details: Option<String>,
    pub congregation_id: String,
    pub urgency: UrgencyLevel,
    pub requested_by: String,
}

/// The in-process operation surface of the approval workflow.
///
/// Cheap to clone; batch processing clones it into worker tasks.
#[derive(Clone)]
pub struct ApprovalEngine {
    pub(crate) repo: Arc<dyn AccountRepository>,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) validator: PermissionValidator,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) notifier: Arc<dyn NotificationDispatcher>,
    pub(crate) batch: BatchConfig,
}

impl ApprovalEngine {
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        identity: Arc<dyn IdentityProvider>,
        validator: PermissionValidator,
    ) -> Self {
        Self {
            repo,
            identity,
            validator,
            audit: Arc::new(NoopAuditSink),
            notifier: Arc::new(NoopDispatcher),
            batch: BatchConfig { max_parallelism: 4 },
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_dispatcher(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub async fn create_request(&self, new: NewRequest) -> Result<FinancialRequest, EngineError> {
        if new.description.trim().is_empty() {
            return Err(EngineError::Validation("description must not be empty".to_owned()));
        }
        if new.payee_name.trim().is_empty() {
            return Err(EngineError::Validation("payee_name must not be empty".to_owned()));
        }
        if new.requested_by.trim().is_empty() {
            return Err(EngineError::Validation("requested_by must not be empty".to_owned()));
        }
        if new.amount <= Decimal::ZERO {
            return Err(EngineError::Validation("amount must be positive".to_owned()));
        }

        let now = Utc::now();
        let request = FinancialRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            description: new.description,
            category_id: new.category_id,
            amount: new.amount,
            due_date: new.due_date,
            payment_method: new.payment_method,
            payee_name: new.payee_name,
            bank_details: new.bank_details,
            congregation_id: new.congregation_id,
            status: RequestStatus::PendingManagement,
            urgency: new.urgency,
            requested_by: new.requested_by,
            requested_at: now,
            approved_at: None,
            paid_at: None,
            rejected_at: None,
            rejection_reason: None,
            payment_attachment: None,
            updated_at: now,
        };

        self.repo.insert(request.clone()).await.map_err(EngineError::from)?;
        tracing::info!(request_id = %request.id.0, amount = %request.amount, "request created");
        self.audit.emit(AuditEvent::new(
            Some(request.id.clone()),
            Uuid::new_v4().to_string(),
            "request.created",
            AuditCategory::Workflow,
            request.requested_by.clone(),
            AuditOutcome::Success,
        ));

        Ok(request)
    }

    pub async fn approve(
        &self,
        request_id: &RequestId,
        actor_id: &str,
        notes: Option<String>,
    ) -> Result<FinancialRequest, EngineError> {
        let correlation = Uuid::new_v4().to_string();
        let profile = self.resolve_profile(actor_id).await?;
        let request = self.get_request(request_id).await?;
        self.transition_loaded(
            request,
            &profile,
            actor_id,
            WorkflowAction::Approve,
            notes,
            None,
            None,
            &correlation,
        )
        .await
    }

    pub async fn reject(
        &self,
        request_id: &RequestId,
        actor_id: &str,
        reason: &str,
    ) -> Result<FinancialRequest, EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::Validation("rejection reason is required".to_owned()));
        }

        let correlation = Uuid::new_v4().to_string();
        let profile = self.resolve_profile(actor_id).await?;
        let request = self.get_request(request_id).await?;
        self.transition_loaded(
            request,
            &profile,
            actor_id,
            WorkflowAction::Reject,
            None,
            Some(reason.to_owned()),
            None,
            &correlation,
        )
        .await
    }

    pub async fn mark_paid(
        &self,
        request_id: &RequestId,
        actor_id: &str,
        attachment: Option<String>,
    ) -> Result<FinancialRequest, EngineError> {
        let correlation = Uuid::new_v4().to_string();
        let profile = self.resolve_profile(actor_id).await?;
        let request = self.get_request(request_id).await?;
        self.transition_loaded(
            request,
            &profile,
            actor_id,
            WorkflowAction::MarkPaid,
            None,
            None,
            attachment,
            &correlation,
        )
        .await
    }

    pub async fn approval_history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRecord>, EngineError> {
        self.repo.approval_history(request_id).await.map_err(EngineError::from)
    }

    /// Actor id -> access profile, failing closed at both seams: an
    /// unresolvable actor is an authentication failure, a resolvable actor
    /// with a profile the capability table does not know is denied.
    pub(crate) async fn resolve_profile(
        &self,
        actor_id: &str,
    ) -> Result<AccessProfile, EngineError> {
        let name = self
            .identity
            .profile_name(actor_id)
            .await
            .map_err(|error| EngineError::Authentication(format!("identity provider: {error}")))?
            .ok_or_else(|| {
                EngineError::Authentication(format!("actor `{actor_id}` is not resolvable"))
            })?;

        self.validator.profile(&name).cloned().ok_or_else(|| EngineError::PermissionDenied {
            profile: name,
            reason: PermissionDenyReason::UnknownProfile.describe(),
        })
    }

    /// Fetches a single request, or `NotFound`.
    pub async fn get_request(
        &self,
        request_id: &RequestId,
    ) -> Result<FinancialRequest, EngineError> {
        self.repo
            .find_by_id(request_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(request_id.clone()))
    }

    /// One guarded transition against an already-loaded request. The status
    /// read here becomes the expected-status precondition, so a concurrent
    /// actor advancing the same request surfaces as `ConcurrencyConflict`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn transition_loaded(
        &self,
        request: FinancialRequest,
        profile: &AccessProfile,
        actor_id: &str,
        action: WorkflowAction,
        notes: Option<String>,
        rejection_reason: Option<String>,
        payment_attachment: Option<String>,
        correlation: &str,
    ) -> Result<FinancialRequest, EngineError> {
        let decision = self.validator.can_act(Some(profile), request.status, action);
        if !decision.allowed {
            let error = deny_to_error(profile, request.status, action, decision.deny_reason);
            self.emit_rejected(&request.id, actor_id, correlation, &error);
            return Err(error);
        }

        let next = next_status(request.status, action)?;
        let approval_action = match action {
            WorkflowAction::Approve => Some(ApprovalAction::Approved),
            WorkflowAction::Reject => Some(ApprovalAction::Rejected),
            WorkflowAction::MarkPaid => None,
        };

        let record = TransitionRecord {
            record_id: ApprovalRecordId(Uuid::new_v4().to_string()),
            request_id: request.id.clone(),
            expected_status: request.status,
            next_status: next,
            actor_id: actor_id.to_owned(),
            level: decision.level,
            action: approval_action,
            notes,
            rejection_reason,
            payment_attachment,
            occurred_at: Utc::now(),
        };

        let updated = match self.repo.apply_transition(record).await {
            Ok(updated) => updated,
            Err(repo_error) => {
                let error = EngineError::from(repo_error);
                self.emit_rejected(&request.id, actor_id, correlation, &error);
                return Err(error);
            }
        };

        tracing::info!(
            request_id = %updated.id.0,
            from = request.status.as_str(),
            to = updated.status.as_str(),
            action = action.as_str(),
            actor = actor_id,
            "transition applied"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(updated.id.clone()),
                correlation,
                "workflow.transition_applied",
                AuditCategory::Workflow,
                actor_id,
                AuditOutcome::Success,
            )
            .with_metadata("from", request.status.as_str())
            .with_metadata("to", updated.status.as_str())
            .with_metadata("action", action.as_str()),
        );
        self.notifier.dispatch(TransitionNotice {
            request_id: updated.id.clone(),
            action,
            new_status: updated.status,
            actor_id: actor_id.to_owned(),
        });

        Ok(updated)
    }

    fn emit_rejected(
        &self,
        request_id: &RequestId,
        actor_id: &str,
        correlation: &str,
        error: &EngineError,
    ) {
        tracing::warn!(request_id = %request_id.0, actor = actor_id, error = %error, "transition rejected");
        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                correlation,
                "workflow.transition_rejected",
                AuditCategory::Workflow,
                actor_id,
                AuditOutcome::Rejected,
            )
            .with_metadata("error", error.to_string()),
        );
    }
}

fn deny_to_error(
    profile: &AccessProfile,
    status: RequestStatus,
    action: WorkflowAction,
    deny_reason: Option<PermissionDenyReason>,
) -> EngineError {
    match deny_reason {
        Some(PermissionDenyReason::NotActionable { status, action }) => {
            EngineError::InvalidTransition(TransitionError::InvalidTransition {
                from: status,
                action,
            })
        }
        Some(reason) => {
            EngineError::PermissionDenied { profile: profile.name.clone(), reason: reason.describe() }
        }
        // A denial always carries a reason; treat a missing one as the
        // status being non-actionable.
        None => EngineError::InvalidTransition(TransitionError::InvalidTransition {
            from: status,
            action,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use payable_core::audit::InMemoryAuditSink;
    use payable_core::domain::request::{PaymentMethod, RequestId, RequestStatus, UrgencyLevel};
    use payable_core::errors::EngineError;
    use payable_core::permissions::PermissionValidator;
    use payable_db::repositories::InMemoryAccountRepository;

    use crate::identity::InMemoryIdentityProvider;
    use crate::notify::RecordingDispatcher;

    use super::{ApprovalEngine, NewRequest};

    fn identity() -> InMemoryIdentityProvider {
        InMemoryIdentityProvider::default()
            .with_actor("u-gerente", "Gerente")
            .with_actor("u-diretor", "Diretor")
            .with_actor("u-presidente", "Presidente")
            .with_actor("u-tesoureiro", "Tesoureiro")
            .with_actor("u-misfit", "Visitante")
    }

    fn engine(repo: Arc<InMemoryAccountRepository>) -> ApprovalEngine {
        ApprovalEngine::new(repo, Arc::new(identity()), PermissionValidator::default_table())
    }

    fn new_request() -> NewRequest {
        NewRequest {
            description: "Compra de cadeiras".to_string(),
            category_id: "cat-furniture".to_string(),
            amount: Decimal::new(45_000, 2),
            due_date: NaiveDate::from_ymd_opt(2026, 9, 30).expect("valid date"),
            payment_method: PaymentMethod::Boleto,
            payee_name: "Móveis União".to_string(),
            bank_details: None,
            congregation_id: "cong-01".to_string(),
            urgency: UrgencyLevel::Normal,
            requested_by: "u-secretary".to_string(),
        }
    }

    #[tokio::test]
    async fn created_requests_start_at_pending_management() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);

        let request = engine.create_request(new_request()).await.expect("create");
        assert_eq!(request.status, RequestStatus::PendingManagement);
        assert!(request.approved_at.is_none());
    }

    #[tokio::test]
    async fn create_rejects_non_positive_amount() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);

        let mut payload = new_request();
        payload.amount = Decimal::ZERO;
        let error = engine.create_request(payload).await.expect_err("zero amount");
        assert!(matches!(error, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn approve_advances_and_emits_audit_and_notification() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let sink = InMemoryAuditSink::default();
        let dispatcher = RecordingDispatcher::default();
        let engine = engine(repo)
            .with_audit_sink(Arc::new(sink.clone()))
            .with_dispatcher(Arc::new(dispatcher.clone()));

        let request = engine.create_request(new_request()).await.expect("create");
        let updated =
            engine.approve(&request.id, "u-gerente", Some("ok".to_string())).await.expect("approve");

        assert_eq!(updated.status, RequestStatus::PendingDirector);

        let events = sink.events();
        assert!(events.iter().any(|event| event.event_type == "workflow.transition_applied"));
        assert_eq!(dispatcher.notices().len(), 1);
    }

    #[tokio::test]
    async fn reject_without_reason_is_a_validation_error() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let request = engine.create_request(new_request()).await.expect("create");

        let error = engine.reject(&request.id, "u-gerente", "   ").await.expect_err("no reason");
        assert!(matches!(error, EngineError::Validation(_)));

        let reloaded = engine.get_request(&request.id).await.expect("load");
        assert_eq!(reloaded.status, RequestStatus::PendingManagement, "no mutation on error");
    }

    #[tokio::test]
    async fn unresolvable_actor_is_an_authentication_error() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let request = engine.create_request(new_request()).await.expect("create");

        let error = engine.approve(&request.id, "u-ghost", None).await.expect_err("no actor");
        assert!(matches!(error, EngineError::Authentication(_)));
    }

    #[tokio::test]
    async fn profile_outside_the_capability_table_is_denied() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let request = engine.create_request(new_request()).await.expect("create");

        let error = engine.approve(&request.id, "u-misfit", None).await.expect_err("unknown profile");
        assert!(matches!(error, EngineError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn wrong_level_cannot_mutate_the_request() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let request = engine.create_request(new_request()).await.expect("create");

        let error = engine.approve(&request.id, "u-diretor", None).await.expect_err("wrong level");
        assert!(matches!(error, EngineError::PermissionDenied { .. }));

        let reloaded = engine.get_request(&request.id).await.expect("load");
        assert_eq!(reloaded.status, RequestStatus::PendingManagement);
        assert!(engine.approval_history(&request.id).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn full_chain_then_settlement() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let request = engine.create_request(new_request()).await.expect("create");

        engine.approve(&request.id, "u-gerente", None).await.expect("management");
        engine.approve(&request.id, "u-diretor", None).await.expect("director");
        let approved = engine.approve(&request.id, "u-presidente", None).await.expect("president");
        assert_eq!(approved.status, RequestStatus::Approved);
        assert!(approved.approved_at.is_some());

        let paid = engine
            .mark_paid(&request.id, "u-tesoureiro", Some("receipt.pdf".to_string()))
            .await
            .expect("settle");
        assert_eq!(paid.status, RequestStatus::Paid);
        assert!(paid.paid_at.is_some());
        assert_eq!(paid.payment_attachment.as_deref(), Some("receipt.pdf"));

        let late_approve =
            engine.approve(&request.id, "u-gerente", None).await.expect_err("paid is terminal");
        assert!(matches!(late_approve, EngineError::InvalidTransition(_)));

        let history = engine.approval_history(&request.id).await.expect("history");
        assert_eq!(history.len(), 3, "settlement writes no ledger row");
    }

    #[tokio::test]
    async fn concurrent_style_stale_read_surfaces_as_conflict() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let request = engine.create_request(new_request()).await.expect("create");

        // Load once, then let another actor win the race.
        let stale = engine.get_request(&request.id).await.expect("stale read");
        engine.approve(&request.id, "u-gerente", None).await.expect("winner");

        let profile = engine.resolve_profile("u-gerente").await.expect("profile");
        let error = engine
            .transition_loaded(
                stale,
                &profile,
                "u-gerente",
                payable_core::workflow::WorkflowAction::Approve,
                None,
                None,
                None,
                "corr-test",
            )
            .await
            .expect_err("loser must conflict");
        assert!(matches!(error, EngineError::ConcurrencyConflict { .. }));
    }

    #[tokio::test]
    async fn history_for_unknown_request_is_empty() {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let engine = engine(repo);
        let history =
            engine.approval_history(&RequestId("FR-404".to_string())).await.expect("history");
        assert!(history.is_empty());
    }
}
