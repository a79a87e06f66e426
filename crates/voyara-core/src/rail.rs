use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PaymentRailError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisbursementRequest {
    pub payout_id: Uuid,
    pub partner_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisbursementReceipt {
    pub transaction_id: String,
}

/// External money movement. Called at most once per processed payout.
#[async_trait]
pub trait PaymentRail: Send + Sync {
    async fn disburse(
        &self,
        request: &DisbursementRequest,
    ) -> Result<DisbursementReceipt, PaymentRailError>;
}
