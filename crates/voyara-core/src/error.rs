use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CommissionStatus, PayoutStatus};

pub type SettlementResult<T> = Result<T, SettlementError>;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("partner {0} not found")]
    PartnerNotFound(Uuid),
    #[error("commission {0} not found")]
    CommissionNotFound(Uuid),
    #[error("payout {0} not found")]
    PayoutNotFound(Uuid),
    #[error("commission {id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        id: Uuid,
        from: CommissionStatus,
        to: CommissionStatus,
    },
    #[error("payout {id} is {current}; cannot {action}")]
    InvalidPayoutState {
        id: Uuid,
        current: PayoutStatus,
        action: &'static str,
    },
    #[error("insufficient approved commission: requested {requested}, available {available}")]
    InsufficientCommission {
        requested: Decimal,
        available: Decimal,
    },
    #[error(transparent)]
    PaymentRail(#[from] PaymentRailError),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl SettlementError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentRailError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment rail unavailable: {0}")]
    Unavailable(String),
    #[error("payment rail call timed out after {0} ms")]
    Timeout(u64),
}
