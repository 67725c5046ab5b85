use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Lifecycle status of a financial request. The three pending statuses form
/// the approval chain; `Paid` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingManagement,
    PendingDirector,
    PendingPresident,
    Approved,
    Paid,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingManagement => "pending_management",
            Self::PendingDirector => "pending_director",
            Self::PendingPresident => "pending_president",
            Self::Approved => "approved",
            Self::Paid => "paid",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_management" => Some(Self::PendingManagement),
            "pending_director" => Some(Self::PendingDirector),
            "pending_president" => Some(Self::PendingPresident),
            "approved" => Some(Self::Approved),
            "paid" => Some(Self::Paid),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingManagement | Self::PendingDirector | Self::PendingPresident)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Normal,
    Urgent,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    BankTransfer,
    Boleto,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pix => "pix",
            Self::BankTransfer => "bank_transfer",
            Self::Boleto => "boleto",
            Self::Cash => "cash",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pix" => Some(Self::Pix),
            "bank_transfer" => Some(Self::BankTransfer),
            "boleto" => Some(Self::Boleto),
            "cash" => Some(Self::Cash),
            _ => None,
        }
    }
}

/// An account payable moving through the approval chain.
///
/// `rejection_reason` is set iff status is `Rejected`; `paid_at` and
/// `payment_attachment` are set iff status is `Paid`. The transition unit in
/// the repository is the only writer of these fields after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialRequest {
    pub id: RequestId,
    pub description: String,
    pub category_id: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub payee_name: String,
    pub bank_details: Option<String>,
    pub congregation_id: String,
    pub status: RequestStatus,
    pub urgency: UrgencyLevel,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub payment_attachment: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{PaymentMethod, RequestStatus, UrgencyLevel};

    #[test]
    fn status_round_trips_from_storage_encoding() {
        let cases = [
            RequestStatus::PendingManagement,
            RequestStatus::PendingDirector,
            RequestStatus::PendingPresident,
            RequestStatus::Approved,
            RequestStatus::Paid,
            RequestStatus::Rejected,
        ];

        for status in cases {
            let decoded = RequestStatus::parse(status.as_str());
            assert_eq!(decoded, Some(status));
        }
    }

    #[test]
    fn unknown_status_string_fails_parse() {
        assert_eq!(RequestStatus::parse("pending_intern"), None);
    }

    #[test]
    fn only_paid_and_rejected_are_terminal() {
        assert!(RequestStatus::Paid.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(!RequestStatus::Approved.is_terminal());
        assert!(!RequestStatus::PendingManagement.is_terminal());
    }

    #[test]
    fn pending_statuses_form_the_chain() {
        assert!(RequestStatus::PendingManagement.is_pending());
        assert!(RequestStatus::PendingDirector.is_pending());
        assert!(RequestStatus::PendingPresident.is_pending());
        assert!(!RequestStatus::Approved.is_pending());
        assert!(!RequestStatus::Paid.is_pending());
    }

    #[test]
    fn urgency_and_payment_method_round_trip() {
        for urgency in [UrgencyLevel::Normal, UrgencyLevel::Urgent] {
            assert_eq!(UrgencyLevel::parse(urgency.as_str()), Some(urgency));
        }
        for method in [
            PaymentMethod::Pix,
            PaymentMethod::BankTransfer,
            PaymentMethod::Boleto,
            PaymentMethod::Cash,
        ] {
            assert_eq!(PaymentMethod::parse(method.as_str()), Some(method));
        }
    }
}
