use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;
use voyara_core::{
    Commission, CommissionDecision, CommissionFilter, CommissionRule, CommissionStatus,
    CommissionStore, CommissionTotals, NewCommission, NewPayout, Partner, PartnerBalance,
    PartnerStatus, PartnerStore, PartnerTier, Payout, PayoutChange, PayoutFilter, PayoutStatus,
    PayoutStore, PayoutTotals, Recorded, SettlementError, SettlementResult, list_limit,
};

#[derive(Default)]
struct SettlementState {
    partners: HashMap<Uuid, Partner>,
    rules: Vec<CommissionRule>,
    commissions: HashMap<Uuid, Commission>,
    booking_index: HashMap<Uuid, Uuid>,
    payouts: HashMap<Uuid, Payout>,
}

impl SettlementState {
    fn balance(&self, partner_id: Uuid) -> PartnerBalance {
        let mut commissions = CommissionTotals::default();
        for commission in self
            .commissions
            .values()
            .filter(|commission| commission.partner_id == partner_id)
        {
            match commission.status {
                CommissionStatus::Pending => commissions.pending += commission.amount,
                CommissionStatus::Approved => commissions.approved += commission.amount,
                CommissionStatus::Rejected => commissions.rejected += commission.amount,
            }
        }

        let mut payouts = PayoutTotals::default();
        for payout in self
            .payouts
            .values()
            .filter(|payout| payout.partner_id == partner_id)
        {
            match payout.status {
                PayoutStatus::Pending => payouts.pending += payout.amount,
                PayoutStatus::Processing => payouts.processing += payout.amount,
                PayoutStatus::Completed => payouts.completed += payout.amount,
                PayoutStatus::Failed | PayoutStatus::Cancelled => {}
            }
        }

        PartnerBalance::from_totals(partner_id, commissions, payouts)
    }
}

#[derive(Default)]
pub struct InMemorySettlementStore {
    state: Mutex<SettlementState>,
}

impl InMemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_partner(&self, partner: Partner) {
        let mut state = self.state.lock().await;
        state.partners.insert(partner.id, partner);
    }

    pub async fn insert_rule(&self, rule: CommissionRule) {
        let mut state = self.state.lock().await;
        state.rules.push(rule);
    }

    pub async fn set_partner_totals(
        &self,
        partner_id: Uuid,
        total_revenue: Decimal,
        total_bookings: i64,
    ) -> SettlementResult<()> {
        let mut state = self.state.lock().await;
        let partner = state
            .partners
            .get_mut(&partner_id)
            .ok_or(SettlementError::PartnerNotFound(partner_id))?;
        partner.total_revenue = total_revenue;
        partner.total_bookings = total_bookings;
        Ok(())
    }

    pub async fn payout_count(&self) -> usize {
        self.state.lock().await.payouts.len()
    }
}

#[async_trait]
impl PartnerStore for InMemorySettlementStore {
    async fn partner(&self, partner_id: Uuid) -> SettlementResult<Option<Partner>> {
        let state = self.state.lock().await;
        Ok(state.partners.get(&partner_id).cloned())
    }

    async fn partner_ids(&self) -> SettlementResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut ids: Vec<Uuid> = state.partners.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn commission_rules(&self, partner_id: Uuid) -> SettlementResult<Vec<CommissionRule>> {
        let state = self.state.lock().await;
        Ok(state
            .rules
            .iter()
            .filter(|rule| rule.partner_id == partner_id)
            .cloned()
            .collect())
    }

    async fn payout_candidates(&self) -> SettlementResult<Vec<Partner>> {
        let state = self.state.lock().await;
        let mut candidates: Vec<Partner> = state
            .partners
            .values()
            .filter(|partner| partner.status == PartnerStatus::Active)
            .filter(|partner| {
                state.commissions.values().any(|commission| {
                    commission.partner_id == partner.id
                        && commission.status == CommissionStatus::Approved
                })
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|partner| partner.id);
        Ok(candidates)
    }

    async fn update_tier(
        &self,
        partner_id: Uuid,
        from: PartnerTier,
        to: PartnerTier,
        at: DateTime<Utc>,
    ) -> SettlementResult<bool> {
        let mut state = self.state.lock().await;
        let Some(partner) = state.partners.get_mut(&partner_id) else {
            return Err(SettlementError::PartnerNotFound(partner_id));
        };
        if partner.tier != from {
            return Ok(false);
        }
        partner.tier = to;
        partner.updated_at = at;
        Ok(true)
    }
}

#[async_trait]
impl CommissionStore for InMemorySettlementStore {
    async fn record_commission(
        &self,
        commission: NewCommission,
    ) -> SettlementResult<Recorded<Commission>> {
        let mut state = self.state.lock().await;

        if let Some(existing_id) = state.booking_index.get(&commission.booking_id) {
            let existing = state.commissions.get(existing_id).cloned().ok_or_else(|| {
                SettlementError::Storage(anyhow::anyhow!(
                    "booking index points at missing commission {existing_id}"
                ))
            })?;
            return Ok(Recorded::Existing(existing));
        }

        let partner = state
            .partners
            .get_mut(&commission.partner_id)
            .ok_or(SettlementError::PartnerNotFound(commission.partner_id))?;
        partner.total_revenue = partner
            .total_revenue
            .checked_add(commission.booking_amount)
            .ok_or_else(|| {
                SettlementError::Storage(anyhow::anyhow!(
                    "total revenue overflow for partner {}",
                    commission.partner_id
                ))
            })?;
        partner.total_bookings += 1;
        partner.updated_at = commission.created_at;

        let record = Commission {
            id: commission.id,
            partner_id: commission.partner_id,
            booking_id: commission.booking_id,
            booking_amount: commission.booking_amount,
            amount: commission.amount,
            percentage: commission.percentage,
            rule_id: commission.rule_id,
            currency: commission.currency,
            status: CommissionStatus::Pending,
            approved_by: None,
            approval_date: None,
            reason: None,
            created_at: commission.created_at,
            updated_at: commission.created_at,
        };
        state.booking_index.insert(record.booking_id, record.id);
        state.commissions.insert(record.id, record.clone());

        Ok(Recorded::Created(record))
    }

    async fn commission(&self, commission_id: Uuid) -> SettlementResult<Option<Commission>> {
        let state = self.state.lock().await;
        Ok(state.commissions.get(&commission_id).cloned())
    }

    async fn decide_commission(
        &self,
        commission_id: Uuid,
        decision: CommissionDecision,
    ) -> SettlementResult<Option<Commission>> {
        let mut state = self.state.lock().await;

        let Some(commission) = state.commissions.get_mut(&commission_id) else {
            return Ok(None);
        };
        if commission.status != CommissionStatus::Pending {
            return Ok(None);
        }

        match decision {
            CommissionDecision::Approve { approved_by, at } => {
                commission.status = CommissionStatus::Approved;
                commission.approved_by = Some(approved_by);
                commission.approval_date = Some(at);
                commission.updated_at = at;
            }
            CommissionDecision::Reject { reason, at } => {
                commission.status = CommissionStatus::Rejected;
                commission.reason = Some(reason);
                commission.updated_at = at;
            }
        }
        let decided = commission.clone();

        if decided.status == CommissionStatus::Approved {
            if let Some(partner) = state.partners.get_mut(&decided.partner_id) {
                partner.total_commission_earned += decided.amount;
                partner.updated_at = decided.updated_at;
            }
        }

        Ok(Some(decided))
    }

    async fn list_commissions(&self, filter: CommissionFilter) -> SettlementResult<Vec<Commission>> {
        let state = self.state.lock().await;
        let mut commissions: Vec<Commission> = state
            .commissions
            .values()
            .filter(|commission| filter.partner_id.is_none_or(|id| commission.partner_id == id))
            .filter(|commission| filter.status.is_none_or(|status| commission.status == status))
            .cloned()
            .collect();
        commissions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        commissions.truncate(usize::try_from(list_limit(filter.limit)).unwrap_or(usize::MAX));
        Ok(commissions)
    }
}

#[async_trait]
impl PayoutStore for InMemorySettlementStore {
    async fn partner_balance(&self, partner_id: Uuid) -> SettlementResult<PartnerBalance> {
        let state = self.state.lock().await;
        if !state.partners.contains_key(&partner_id) {
            return Err(SettlementError::PartnerNotFound(partner_id));
        }
        Ok(state.balance(partner_id))
    }

    async fn create_payout(&self, payout: NewPayout) -> SettlementResult<Payout> {
        let mut state = self.state.lock().await;
        if !state.partners.contains_key(&payout.partner_id) {
            return Err(SettlementError::PartnerNotFound(payout.partner_id));
        }

        let available = state.balance(payout.partner_id).approved_unpaid_total;
        if payout.amount > available {
            return Err(SettlementError::InsufficientCommission {
                requested: payout.amount,
                available,
            });
        }

        let record = Payout {
            id: payout.id,
            partner_id: payout.partner_id,
            amount: payout.amount,
            currency: payout.currency,
            status: PayoutStatus::Pending,
            payment_method: payout.payment_method,
            transaction_id: None,
            processed_at: None,
            completed_at: None,
            failure_reason: None,
            notes: payout.notes,
            created_at: payout.created_at,
            updated_at: payout.created_at,
        };
        state.payouts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn payout(&self, payout_id: Uuid) -> SettlementResult<Option<Payout>> {
        let state = self.state.lock().await;
        Ok(state.payouts.get(&payout_id).cloned())
    }

    async fn transition_payout(
        &self,
        payout_id: Uuid,
        from: &[PayoutStatus],
        change: PayoutChange,
    ) -> SettlementResult<Option<Payout>> {
        let mut state = self.state.lock().await;

        let Some(payout) = state.payouts.get_mut(&payout_id) else {
            return Ok(None);
        };
        if !from.contains(&payout.status) {
            return Ok(None);
        }

        let at = change.at();
        payout.status = change.target();
        payout.updated_at = at;
        match change {
            PayoutChange::Processing { at } => payout.processed_at = Some(at),
            PayoutChange::Completed { transaction_id, at } => {
                payout.transaction_id = Some(transaction_id);
                payout.completed_at = Some(at);
            }
            PayoutChange::Failed { reason, .. } | PayoutChange::Cancelled { reason, .. } => {
                payout.failure_reason = Some(reason);
            }
        }
        let updated = payout.clone();

        if updated.status == PayoutStatus::Completed {
            if let Some(partner) = state.partners.get_mut(&updated.partner_id) {
                partner.last_payout_date = Some(at);
                partner.total_commission_paid += updated.amount;
                partner.updated_at = at;
            }
        }

        Ok(Some(updated))
    }

    async fn list_payouts(&self, filter: PayoutFilter) -> SettlementResult<Vec<Payout>> {
        let state = self.state.lock().await;
        let mut payouts: Vec<Payout> = state
            .payouts
            .values()
            .filter(|payout| filter.partner_id.is_none_or(|id| payout.partner_id == id))
            .filter(|payout| filter.status.is_none_or(|status| payout.status == status))
            .cloned()
            .collect();
        payouts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        payouts.truncate(usize::try_from(list_limit(filter.limit)).unwrap_or(usize::MAX));
        Ok(payouts)
    }
}
