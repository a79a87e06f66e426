use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use voyara_core::money::{max_amount, percentage_of};
use voyara_core::{
    Clock, Commission, CommissionDecision, CommissionFilter, CommissionStatus, CommissionStore,
    DomainEvent, DomainEventKind, EventPublisher, NewCommission, PartnerBalance, PartnerStore,
    PayoutStore, Recorded, SettlementError, SettlementResult,
};

use crate::policy::SettlementPolicy;
use crate::rates::CommissionRuleResolver;

pub struct CommissionLedger<S> {
    store: Arc<S>,
    resolver: CommissionRuleResolver<S>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    policy: SettlementPolicy,
}

impl<S> CommissionLedger<S>
where
    S: PartnerStore + CommissionStore + PayoutStore,
{
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            resolver: CommissionRuleResolver::new(Arc::clone(&store)),
            store,
            clock,
            events,
            policy,
        }
    }

    /// Records the pending commission for a completed booking. Repeated calls
    /// for the same booking return the commission recorded first.
    pub async fn calculate_commission(
        &self,
        booking_id: Uuid,
        partner_id: Uuid,
        booking_amount: Decimal,
    ) -> SettlementResult<Commission> {
        if booking_amount <= Decimal::ZERO {
            return Err(SettlementError::validation(format!(
                "booking amount must be positive, got {booking_amount}"
            )));
        }

        if booking_amount > max_amount() {
            return Err(SettlementError::validation(format!(
                "booking amount {booking_amount} exceeds the supported maximum {}",
                max_amount()
            )));
        }

        let now = self.clock.now();
        let rate = self
            .resolver
            .resolve_rate(partner_id, booking_amount, now)
            .await?;
        let amount = percentage_of(booking_amount, rate.percentage, &self.policy.currency)
            .ok_or_else(|| {
                SettlementError::validation(format!(
                    "commission on booking amount {booking_amount} overflows"
                ))
            })?;

        let recorded = self
            .store
            .record_commission(NewCommission {
                id: Uuid::new_v4(),
                partner_id,
                booking_id,
                booking_amount,
                amount,
                percentage: rate.percentage,
                rule_id: rate.rule_id(),
                currency: self.policy.currency.clone(),
                created_at: now,
            })
            .await?;

        let commission = match recorded {
            Recorded::Created(commission) => commission,
            Recorded::Existing(commission) => {
                if commission.partner_id != partner_id {
                    warn!(
                        booking_id = %booking_id,
                        recorded_partner = %commission.partner_id,
                        requested_partner = %partner_id,
                        "booking already carries a commission for another partner"
                    );
                }
                return Ok(commission);
            }
        };

        info!(
            commission_id = %commission.id,
            booking_id = %booking_id,
            partner_id = %partner_id,
            amount = %commission.amount,
            percentage = %commission.percentage,
            "commission recorded"
        );
        self.events.publish(DomainEvent::new(
            DomainEventKind::CommissionRecorded,
            commission.id,
            partner_id,
            now,
            json!({
                "booking_id": booking_id,
                "amount": commission.amount,
                "percentage": commission.percentage,
                "rule_id": commission.rule_id,
                "currency": commission.currency,
            }),
        ));

        Ok(commission)
    }

    pub async fn approve_commission(
        &self,
        commission_id: Uuid,
        approved_by: &str,
    ) -> SettlementResult<Commission> {
        let approved_by = approved_by.trim();
        if approved_by.is_empty() {
            return Err(SettlementError::validation("approved_by is required"));
        }

        self.decide(
            commission_id,
            CommissionDecision::Approve {
                approved_by: approved_by.to_string(),
                at: self.clock.now(),
            },
        )
        .await
    }

    pub async fn reject_commission(
        &self,
        commission_id: Uuid,
        reason: &str,
    ) -> SettlementResult<Commission> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SettlementError::validation(
                "a reason is required to reject a commission",
            ));
        }

        self.decide(
            commission_id,
            CommissionDecision::Reject {
                reason: reason.to_string(),
                at: self.clock.now(),
            },
        )
        .await
    }

    async fn decide(
        &self,
        commission_id: Uuid,
        decision: CommissionDecision,
    ) -> SettlementResult<Commission> {
        let target = decision.target();

        let Some(commission) = self.store.decide_commission(commission_id, decision).await? else {
            let current = self
                .store
                .commission(commission_id)
                .await?
                .ok_or(SettlementError::CommissionNotFound(commission_id))?;
            warn!(
                commission_id = %commission_id,
                status = %current.status,
                target = %target,
                "commission review rejected: not pending"
            );
            return Err(SettlementError::InvalidStateTransition {
                id: commission_id,
                from: current.status,
                to: target,
            });
        };

        let kind = match target {
            CommissionStatus::Rejected => DomainEventKind::CommissionRejected,
            _ => DomainEventKind::CommissionApproved,
        };
        info!(
            commission_id = %commission.id,
            partner_id = %commission.partner_id,
            status = %commission.status,
            "commission reviewed"
        );
        self.events.publish(DomainEvent::new(
            kind,
            commission.id,
            commission.partner_id,
            commission.updated_at,
            json!({
                "amount": commission.amount,
                "approved_by": commission.approved_by,
                "reason": commission.reason,
            }),
        ));

        Ok(commission)
    }

    pub async fn get_partner_balance(&self, partner_id: Uuid) -> SettlementResult<PartnerBalance> {
        self.store.partner_balance(partner_id).await
    }

    pub async fn commission(&self, commission_id: Uuid) -> SettlementResult<Commission> {
        self.store
            .commission(commission_id)
            .await?
            .ok_or(SettlementError::CommissionNotFound(commission_id))
    }

    pub async fn list_commissions(
        &self,
        filter: CommissionFilter,
    ) -> SettlementResult<Vec<Commission>> {
        self.store.list_commissions(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Harness, ScriptedRail, partner, rule};

    #[tokio::test]
    async fn rule_and_base_rate_scenario() {
        let harness = Harness::new(ScriptedRail::default());
        let partner = partner(10);
        harness.store.upsert_partner(partner.clone()).await;
        harness.store.insert_rule(rule(partner.id, 1000, 15)).await;
        let ledger = &harness.engine.ledger;

        let large = ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::from(1500))
            .await
            .unwrap();
        assert_eq!(large.amount, Decimal::from(225));
        assert_eq!(large.percentage, Decimal::from(15));
        assert!(large.rule_id.is_some());

        let small = ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::from(500))
            .await
            .unwrap();
        assert_eq!(small.amount, Decimal::from(50));
        assert_eq!(small.percentage, Decimal::from(10));
        assert_eq!(small.rule_id, None);
        assert_eq!(small.status, CommissionStatus::Pending);
    }

    #[tokio::test]
    async fn repeated_booking_returns_first_commission() {
        let mut harness = Harness::new(ScriptedRail::default());
        let partner = partner(10);
        harness.store.upsert_partner(partner.clone()).await;
        let booking_id = Uuid::new_v4();
        let ledger = &harness.engine.ledger;

        let first = ledger
            .calculate_commission(booking_id, partner.id, Decimal::from(800))
            .await
            .unwrap();
        let second = ledger
            .calculate_commission(booking_id, partner.id, Decimal::from(800))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let all = ledger
            .list_commissions(CommissionFilter {
                partner_id: Some(partner.id),
                ..CommissionFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 1);

        let stored = harness.store.partner(partner.id).await.unwrap().unwrap();
        assert_eq!(stored.total_bookings, 1);
        assert_eq!(stored.total_revenue, Decimal::from(800));

        let recorded: Vec<_> = harness
            .drain_events()
            .into_iter()
            .filter(|event| event.kind == DomainEventKind::CommissionRecorded)
            .collect();
        assert_eq!(recorded.len(), 1);
    }

    #[tokio::test]
    async fn listing_applies_the_shared_row_cap() {
        let harness = Harness::new(ScriptedRail::default());
        let partner = partner(10);
        harness.store.upsert_partner(partner.clone()).await;
        let ledger = &harness.engine.ledger;
        for _ in 0..3 {
            ledger
                .calculate_commission(Uuid::new_v4(), partner.id, Decimal::from(400))
                .await
                .unwrap();
        }

        let partner_id = partner.id;
        let listed = move |limit| {
            ledger.list_commissions(CommissionFilter {
                partner_id: Some(partner_id),
                limit,
                ..CommissionFilter::default()
            })
        };
        assert_eq!(listed(Some(0)).await.unwrap().len(), 1);
        assert_eq!(listed(Some(-4)).await.unwrap().len(), 1);
        assert_eq!(listed(Some(2)).await.unwrap().len(), 2);
        assert_eq!(listed(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn amounts_round_half_up_to_cents() {
        let harness = Harness::new(ScriptedRail::default());
        let partner = voyara_core::Partner {
            base_commission_percentage: Decimal::new(125, 1),
            ..partner(0)
        };
        harness.store.upsert_partner(partner.clone()).await;

        let commission = harness
            .engine
            .ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::new(3333, 2))
            .await
            .unwrap();
        // 33.33 * 12.5% = 4.16625
        assert_eq!(commission.amount, Decimal::new(417, 2));
    }

    #[tokio::test]
    async fn non_positive_booking_amount_is_rejected() {
        let harness = Harness::new(ScriptedRail::default());
        let partner = partner(10);
        harness.store.upsert_partner(partner.clone()).await;

        let err = harness
            .engine
            .ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));
    }

    #[tokio::test]
    async fn oversized_booking_amount_is_rejected_without_recording() {
        let harness = Harness::new(ScriptedRail::default());
        let partner = partner(10);
        harness.store.upsert_partner(partner.clone()).await;
        let ledger = &harness.engine.ledger;

        for amount in [Decimal::MAX, max_amount() + Decimal::ONE] {
            let err = ledger
                .calculate_commission(Uuid::new_v4(), partner.id, amount)
                .await
                .unwrap_err();
            assert!(matches!(err, SettlementError::Validation(_)), "{err}");
        }

        let stored = harness.store.partner(partner.id).await.unwrap().unwrap();
        assert_eq!(stored.total_bookings, 0);
        assert_eq!(stored.total_revenue, Decimal::ZERO);

        let largest = ledger
            .calculate_commission(Uuid::new_v4(), partner.id, max_amount())
            .await
            .unwrap();
        assert_eq!(largest.booking_amount, max_amount());
    }

    #[tokio::test]
    async fn reviewed_commissions_are_terminal() {
        let harness = Harness::new(ScriptedRail::default());
        let partner = partner(10);
        harness.store.upsert_partner(partner.clone()).await;
        let ledger = &harness.engine.ledger;

        let approved = ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::from(1000))
            .await
            .unwrap();
        let rejected = ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::from(2000))
            .await
            .unwrap();

        let approved = ledger.approve_commission(approved.id, "ops@voyara").await.unwrap();
        assert_eq!(approved.status, CommissionStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("ops@voyara"));
        assert!(approved.approval_date.is_some());

        let rejected = ledger
            .reject_commission(rejected.id, "booking refunded")
            .await
            .unwrap();
        assert_eq!(rejected.status, CommissionStatus::Rejected);
        assert_eq!(rejected.reason.as_deref(), Some("booking refunded"));

        for id in [approved.id, rejected.id] {
            let again = ledger.approve_commission(id, "ops@voyara").await.unwrap_err();
            assert!(matches!(
                again,
                SettlementError::InvalidStateTransition {
                    to: CommissionStatus::Approved,
                    ..
                }
            ));
            let again = ledger.reject_commission(id, "duplicate").await.unwrap_err();
            assert!(matches!(
                again,
                SettlementError::InvalidStateTransition {
                    to: CommissionStatus::Rejected,
                    ..
                }
            ));
        }

        let stored = harness.store.partner(partner.id).await.unwrap().unwrap();
        assert_eq!(stored.total_commission_earned, Decimal::from(100));
    }

    #[tokio::test]
    async fn rejection_requires_reason() {
        let harness = Harness::new(ScriptedRail::default());
        let partner = partner(10);
        harness.store.upsert_partner(partner.clone()).await;
        let commission = harness
            .engine
            .ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::from(1000))
            .await
            .unwrap();

        let err = harness
            .engine
            .ledger
            .reject_commission(commission.id, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));
        assert_eq!(
            harness.engine.ledger.commission(commission.id).await.unwrap().status,
            CommissionStatus::Pending
        );
    }

    #[tokio::test]
    async fn concurrent_approvals_succeed_once() {
        let harness = Harness::new(ScriptedRail::default());
        let partner = partner(10);
        harness.store.upsert_partner(partner.clone()).await;
        let ledger = &harness.engine.ledger;
        let commission = ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::from(1000))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            ledger.approve_commission(commission.id, "alice"),
            ledger.approve_commission(commission.id, "bob"),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

        let balance = ledger.get_partner_balance(partner.id).await.unwrap();
        assert_eq!(balance.approved_unpaid_total, Decimal::from(100));
    }

    #[tokio::test]
    async fn unknown_commission_is_not_found() {
        let harness = Harness::new(ScriptedRail::default());
        let missing = Uuid::new_v4();

        let err = harness
            .engine
            .ledger
            .approve_commission(missing, "ops")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::CommissionNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn balance_tracks_pending_and_approved() {
        let harness = Harness::new(ScriptedRail::default());
        let partner = partner(10);
        harness.store.upsert_partner(partner.clone()).await;
        let ledger = &harness.engine.ledger;

        let a = ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::from(3000))
            .await
            .unwrap();
        ledger
            .calculate_commission(Uuid::new_v4(), partner.id, Decimal::from(1200))
            .await
            .unwrap();
        ledger.approve_commission(a.id, "ops").await.unwrap();

        let balance = ledger.get_partner_balance(partner.id).await.unwrap();
        assert_eq!(balance.pending_total, Decimal::from(120));
        assert_eq!(balance.approved_unpaid_total, Decimal::from(300));
        assert_eq!(balance.lifetime_total, Decimal::from(300));

        let missing = ledger.get_partner_balance(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(missing, SettlementError::PartnerNotFound(_)));
    }
}
