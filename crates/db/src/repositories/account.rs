use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use payable_core::domain::approval::{
    ApprovalAction, ApprovalLevel, ApprovalRecord, ApprovalRecordId,
};
use payable_core::domain::request::{
    FinancialRequest, PaymentMethod, RequestId, RequestStatus, UrgencyLevel,
};

use super::{AccountRepository, RepositoryError, TransitionRecord};
use crate::DbPool;

pub struct SqlAccountRepository {
    pool: DbPool,
}

impl SqlAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const REQUEST_COLUMNS: &str = "id, description, category_id, amount, due_date, payment_method,
    payee_name, bank_details, congregation_id, status, urgency, requested_by,
    requested_at, approved_at, paid_at, rejected_at, rejection_reason,
    payment_attachment, updated_at";

#[async_trait::async_trait]
impl AccountRepository for SqlAccountRepository {
    async fn insert(&self, request: FinancialRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO financial_request (
                id, description, category_id, amount, due_date, payment_method,
                payee_name, bank_details, congregation_id, status, urgency,
                requested_by, requested_at, approved_at, paid_at, rejected_at,
                rejection_reason, payment_attachment, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.description)
        .bind(&request.category_id)
        .bind(request.amount.to_string())
        .bind(request.due_date.to_string())
        .bind(request.payment_method.as_str())
        .bind(&request.payee_name)
        .bind(request.bank_details.as_deref())
        .bind(&request.congregation_id)
        .bind(request.status.as_str())
        .bind(request.urgency.as_str())
        .bind(&request.requested_by)
        .bind(request.requested_at.to_rfc3339())
        .bind(request.approved_at.map(|value| value.to_rfc3339()))
        .bind(request.paid_at.map(|value| value.to_rfc3339()))
        .bind(request.rejected_at.map(|value| value.to_rfc3339()))
        .bind(request.rejection_reason.as_deref())
        .bind(request.payment_attachment.as_deref())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<FinancialRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM financial_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn find_many(
        &self,
        ids: &[RequestId],
    ) -> Result<Vec<FinancialRequest>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM financial_request
             WHERE id IN ({placeholders})
             ORDER BY id ASC"
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(&id.0);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn apply_transition(
        &self,
        record: TransitionRecord,
    ) -> Result<FinancialRequest, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let occurred_at = record.occurred_at.to_rfc3339();

        let approved_at =
            (record.next_status == RequestStatus::Approved).then(|| occurred_at.clone());
        let paid_at = (record.next_status == RequestStatus::Paid).then(|| occurred_at.clone());
        let rejected_at =
            (record.next_status == RequestStatus::Rejected).then(|| occurred_at.clone());

        let updated = sqlx::query(
            "UPDATE financial_request
             SET status = ?,
                 approved_at = COALESCE(?, approved_at),
                 paid_at = COALESCE(?, paid_at),
                 rejected_at = COALESCE(?, rejected_at),
                 rejection_reason = COALESCE(?, rejection_reason),
                 payment_attachment = COALESCE(?, payment_attachment),
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(record.next_status.as_str())
        .bind(approved_at)
        .bind(paid_at)
        .bind(rejected_at)
        .bind(record.rejection_reason.as_deref())
        .bind(record.payment_attachment.as_deref())
        .bind(&occurred_at)
        .bind(&record.request_id.0)
        .bind(record.expected_status.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Distinguish a vanished row from one another actor advanced.
            let exists = sqlx::query("SELECT status FROM financial_request WHERE id = ?")
                .bind(&record.request_id.0)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;

            return Err(match exists {
                None => RepositoryError::NotFound { request_id: record.request_id },
                Some(_) => RepositoryError::ConcurrencyConflict {
                    request_id: record.request_id,
                    expected: record.expected_status,
                },
            });
        }

        if let (Some(level), Some(action)) = (record.level, record.action) {
            sqlx::query(
                "INSERT INTO approval_record (id, request_id, actor_id, level, action, notes, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.record_id.0)
            .bind(&record.request_id.0)
            .bind(&record.actor_id)
            .bind(level.as_str())
            .bind(action.as_str())
            .bind(record.notes.as_deref())
            .bind(&occurred_at)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM financial_request WHERE id = ?"
        ))
        .bind(&record.request_id.0)
        .fetch_one(&mut *tx)
        .await?;
        let request = request_from_row(&row)?;

        tx.commit().await?;
        Ok(request)
    }

    async fn approval_history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, actor_id, level, action, notes, created_at
             FROM approval_record
             WHERE request_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn request_from_row(row: &SqliteRow) -> Result<FinancialRequest, RepositoryError> {
    let amount_raw: String = row.try_get("amount")?;
    let amount = amount_raw
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("invalid amount `{amount_raw}`")))?;

    let due_date_raw: String = row.try_get("due_date")?;
    let due_date = NaiveDate::parse_from_str(&due_date_raw, "%Y-%m-%d")
        .map_err(|_| RepositoryError::Decode(format!("invalid due_date `{due_date_raw}`")))?;

    Ok(FinancialRequest {
        id: RequestId(row.try_get("id")?),
        description: row.try_get("description")?,
        category_id: row.try_get("category_id")?,
        amount,
        due_date,
        payment_method: parse_payment_method(&row.try_get::<String, _>("payment_method")?)?,
        payee_name: row.try_get("payee_name")?,
        bank_details: row.try_get("bank_details")?,
        congregation_id: row.try_get("congregation_id")?,
        status: parse_status(&row.try_get::<String, _>("status")?)?,
        urgency: parse_urgency(&row.try_get::<String, _>("urgency")?)?,
        requested_by: row.try_get("requested_by")?,
        requested_at: parse_timestamp(&row.try_get::<String, _>("requested_at")?)?,
        approved_at: parse_optional_timestamp(row.try_get("approved_at")?)?,
        paid_at: parse_optional_timestamp(row.try_get("paid_at")?)?,
        rejected_at: parse_optional_timestamp(row.try_get("rejected_at")?)?,
        rejection_reason: row.try_get("rejection_reason")?,
        payment_attachment: row.try_get("payment_attachment")?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    let level_raw: String = row.try_get("level")?;
    let level = ApprovalLevel::parse(&level_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid approval level `{level_raw}`")))?;

    let action_raw: String = row.try_get("action")?;
    let action = ApprovalAction::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid approval action `{action_raw}`")))?;

    Ok(ApprovalRecord {
        id: ApprovalRecordId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        actor_id: row.try_get("actor_id")?,
        level,
        action,
        notes: row.try_get("notes")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn parse_status(raw: &str) -> Result<RequestStatus, RepositoryError> {
    RequestStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid request status `{raw}`")))
}

fn parse_urgency(raw: &str) -> Result<UrgencyLevel, RepositoryError> {
    UrgencyLevel::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid urgency `{raw}`")))
}

fn parse_payment_method(raw: &str) -> Result<PaymentMethod, RepositoryError> {
    PaymentMethod::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid payment method `{raw}`")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| RepositoryError::Decode(format!("invalid timestamp `{raw}`")))
}

fn parse_optional_timestamp(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.as_deref().map(parse_timestamp).transpose()
}
