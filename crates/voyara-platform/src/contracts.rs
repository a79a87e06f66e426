use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voyara_core::{CommissionStatus, PayoutStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCompletedEvent {
    pub booking_id: Uuid,
    pub partner_id: Uuid,
    pub booking_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveCommissionRequest {
    pub approved_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectCommissionRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePayoutRequest {
    pub partner_id: Uuid,
    pub amount: Decimal,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelPayoutRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListCommissionsQuery {
    pub partner_id: Option<Uuid>,
    pub status: Option<CommissionStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPayoutsQuery {
    pub partner_id: Option<Uuid>,
    pub status: Option<PayoutStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payout_request_leaves_method_to_the_service_default() {
        let request: CreatePayoutRequest = serde_json::from_str(
            r#"{"partner_id":"7d4c1a52-8d7e-4b55-9a0c-2f1f6f3e9c11","amount":"250.00"}"#,
        )
        .unwrap();
        assert_eq!(request.amount, Decimal::new(25000, 2));
        assert!(request.payment_method.is_none());
        assert!(request.notes.is_none());
    }

    #[test]
    fn list_query_accepts_wire_status_names() {
        let query: ListPayoutsQuery = serde_json::from_str(r#"{"status":"PROCESSING"}"#).unwrap();
        assert_eq!(query.status, Some(PayoutStatus::Processing));
    }
}
