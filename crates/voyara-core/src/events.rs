use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainEventKind {
    CommissionRecorded,
    CommissionApproved,
    CommissionRejected,
    PayoutRequested,
    PayoutProcessing,
    PayoutCompleted,
    PayoutFailed,
    PayoutCancelled,
    PartnerTierChanged,
}

impl DomainEventKind {
    pub fn topic(self) -> &'static str {
        match self {
            Self::CommissionRecorded => "commission.recorded",
            Self::CommissionApproved => "commission.approved",
            Self::CommissionRejected => "commission.rejected",
            Self::PayoutRequested => "payout.requested",
            Self::PayoutProcessing => "payout.processing",
            Self::PayoutCompleted => "payout.completed",
            Self::PayoutFailed => "payout.failed",
            Self::PayoutCancelled => "payout.cancelled",
            Self::PartnerTierChanged => "partner.tier_changed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub partner_id: Uuid,
    pub kind: DomainEventKind,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl DomainEvent {
    pub fn new(
        kind: DomainEventKind,
        aggregate_id: Uuid,
        partner_id: Uuid,
        occurred_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            partner_id,
            kind,
            occurred_at,
            payload,
        }
    }
}
