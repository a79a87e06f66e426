use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::SettlementResult;
use crate::events::DomainEvent;
use crate::models::{
    Commission, CommissionRule, CommissionStatus, Partner, PartnerBalance, PartnerTier, Payout,
    PayoutStatus,
};

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub sequence: i64,
    pub stream_id: Uuid,
    pub event: DomainEvent,
    pub stored_at: DateTime<Utc>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> anyhow::Result<EventEnvelope>;
    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Non-blocking hand-off of domain events. Implementations must never fail
/// the caller: a lost notification cannot undo a financial write.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

#[derive(Debug, Clone)]
pub struct NewCommission {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub booking_id: Uuid,
    pub booking_amount: Decimal,
    pub amount: Decimal,
    pub percentage: Decimal,
    pub rule_id: Option<Uuid>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Recorded<T> {
    Created(T),
    Existing(T),
}

impl<T> Recorded<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(value) | Self::Existing(value) => value,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CommissionDecision {
    Approve {
        approved_by: String,
        at: DateTime<Utc>,
    },
    Reject {
        reason: String,
        at: DateTime<Utc>,
    },
}

impl CommissionDecision {
    pub fn target(&self) -> CommissionStatus {
        match self {
            Self::Approve { .. } => CommissionStatus::Approved,
            Self::Reject { .. } => CommissionStatus::Rejected,
        }
    }
}

pub const DEFAULT_LIST_LIMIT: i64 = 200;
pub const MAX_LIST_LIMIT: i64 = 1_000;

pub fn list_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

#[derive(Debug, Clone, Default)]
pub struct CommissionFilter {
    pub partner_id: Option<Uuid>,
    pub status: Option<CommissionStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewPayout {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum PayoutChange {
    Processing {
        at: DateTime<Utc>,
    },
    Completed {
        transaction_id: String,
        at: DateTime<Utc>,
    },
    Failed {
        reason: String,
        at: DateTime<Utc>,
    },
    Cancelled {
        reason: String,
        at: DateTime<Utc>,
    },
}

impl PayoutChange {
    pub fn target(&self) -> PayoutStatus {
        match self {
            Self::Processing { .. } => PayoutStatus::Processing,
            Self::Completed { .. } => PayoutStatus::Completed,
            Self::Failed { .. } => PayoutStatus::Failed,
            Self::Cancelled { .. } => PayoutStatus::Cancelled,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Processing { at }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. }
            | Self::Cancelled { at, .. } => *at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PayoutFilter {
    pub partner_id: Option<Uuid>,
    pub status: Option<PayoutStatus>,
    pub limit: Option<i64>,
}

#[async_trait]
pub trait PartnerStore: Send + Sync {
    async fn partner(&self, partner_id: Uuid) -> SettlementResult<Option<Partner>>;

    async fn partner_ids(&self) -> SettlementResult<Vec<Uuid>>;

    async fn commission_rules(&self, partner_id: Uuid) -> SettlementResult<Vec<CommissionRule>>;

    /// Active partners holding at least one approved commission.
    async fn payout_candidates(&self) -> SettlementResult<Vec<Partner>>;

    /// Writes `to` only while the stored tier is still `from`. Returns whether
    /// a row changed.
    async fn update_tier(
        &self,
        partner_id: Uuid,
        from: PartnerTier,
        to: PartnerTier,
        at: DateTime<Utc>,
    ) -> SettlementResult<bool>;
}

#[async_trait]
pub trait CommissionStore: Send + Sync {
    /// Inserts the commission unless its booking already has one. A new row
    /// also bumps the partner's revenue and booking counters.
    async fn record_commission(
        &self,
        commission: NewCommission,
    ) -> SettlementResult<Recorded<Commission>>;

    async fn commission(&self, commission_id: Uuid) -> SettlementResult<Option<Commission>>;

    /// Applies the decision only while the commission is still pending, under
    /// the owning partner's lock. `None` means the guard did not match.
    async fn decide_commission(
        &self,
        commission_id: Uuid,
        decision: CommissionDecision,
    ) -> SettlementResult<Option<Commission>>;

    async fn list_commissions(&self, filter: CommissionFilter) -> SettlementResult<Vec<Commission>>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn partner_balance(&self, partner_id: Uuid) -> SettlementResult<PartnerBalance>;

    /// Re-checks the claimable balance and inserts a pending payout as one
    /// atomic unit. Fails with `InsufficientCommission` without inserting.
    async fn create_payout(&self, payout: NewPayout) -> SettlementResult<Payout>;

    async fn payout(&self, payout_id: Uuid) -> SettlementResult<Option<Payout>>;

    /// Applies `change` only while the payout is in one of `from`. Completion
    /// also stamps the partner's last payout date and paid total. `None`
    /// means the guard did not match.
    async fn transition_payout(
        &self,
        payout_id: Uuid,
        from: &[PayoutStatus],
        change: PayoutChange,
    ) -> SettlementResult<Option<Payout>>;

    async fn list_payouts(&self, filter: PayoutFilter) -> SettlementResult<Vec<Payout>>;
}

pub trait SettlementStore: PartnerStore + CommissionStore + PayoutStore {}

impl<T> SettlementStore for T where T: PartnerStore + CommissionStore + PayoutStore {}
