use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;
use voyara_core::{
    Commission, CommissionDecision, CommissionFilter, CommissionRule, CommissionStore,
    DisbursementReceipt, DisbursementRequest, DomainEvent, ManualClock, NewCommission, NewPayout,
    Partner, PartnerBalance, PartnerStatus, PartnerStore, PartnerTier, PaymentRail,
    PaymentRailError, Payout, PayoutChange, PayoutFilter, PayoutFrequency, PayoutStatus,
    PayoutStore, Recorded, SettlementError, SettlementResult, SettlementStore,
};
use voyara_eventstore::{InMemorySettlementStore, Outbox};

use crate::{SettlementEngine, SettlementPolicy};

pub fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap()
}

pub fn partner(base_rate: i64) -> Partner {
    let created = ts(2025, 12, 1);
    Partner {
        id: Uuid::new_v4(),
        name: "Harbour Walks".to_string(),
        tier: PartnerTier::Bronze,
        base_commission_percentage: Decimal::from(base_rate),
        min_payout_amount: Decimal::from(50),
        payout_frequency: PayoutFrequency::Weekly,
        last_payout_date: None,
        total_revenue: Decimal::ZERO,
        total_bookings: 0,
        total_commission_earned: Decimal::ZERO,
        total_commission_paid: Decimal::ZERO,
        status: PartnerStatus::Active,
        created_at: created,
        updated_at: created,
    }
}

pub fn rule(partner_id: Uuid, min_booking_amount: i64, rate: i64) -> CommissionRule {
    CommissionRule {
        id: Uuid::new_v4(),
        partner_id,
        rate: Decimal::from(rate),
        min_booking_amount: Decimal::from(min_booking_amount),
        effective_from: ts(2026, 1, 1),
        effective_until: None,
        active: true,
    }
}

#[derive(Debug, Clone)]
pub enum RailStep {
    Settle,
    Fail(PaymentRailError),
    Hang,
    /// Signals `entered`, then settles once `release` is notified.
    Gated(Arc<Gate>),
}

#[derive(Debug, Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Payment rail that replays scripted outcomes and records every call.
#[derive(Default)]
pub struct ScriptedRail {
    script: Mutex<VecDeque<RailStep>>,
    calls: Mutex<Vec<DisbursementRequest>>,
}

impl ScriptedRail {
    pub fn with_steps(steps: impl IntoIterator<Item = RailStep>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<DisbursementRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentRail for ScriptedRail {
    async fn disburse(
        &self,
        request: &DisbursementRequest,
    ) -> Result<DisbursementReceipt, PaymentRailError> {
        self.calls.lock().unwrap().push(request.clone());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RailStep::Settle);

        match step {
            RailStep::Settle => Ok(DisbursementReceipt {
                transaction_id: format!("txn-{}", request.payout_id.simple()),
            }),
            RailStep::Fail(err) => Err(err),
            RailStep::Gated(gate) => {
                gate.entered.notify_one();
                gate.release.notified().await;
                Ok(DisbursementReceipt {
                    transaction_id: format!("txn-{}", request.payout_id.simple()),
                })
            }
            RailStep::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(DisbursementReceipt {
                    transaction_id: "late".to_string(),
                })
            }
        }
    }
}

pub struct Harness {
    pub store: Arc<InMemorySettlementStore>,
    pub rail: Arc<ScriptedRail>,
    pub clock: Arc<ManualClock>,
    pub engine: SettlementEngine<InMemorySettlementStore>,
    events: mpsc::UnboundedReceiver<DomainEvent>,
}

impl Harness {
    pub fn new(rail: ScriptedRail) -> Self {
        let policy = SettlementPolicy {
            payment_timeout: Duration::from_millis(50),
            ..SettlementPolicy::default()
        };
        Self::with_policy(rail, policy)
    }

    pub fn with_policy(rail: ScriptedRail, policy: SettlementPolicy) -> Self {
        let store = Arc::new(InMemorySettlementStore::new());
        let rail = Arc::new(rail);
        let clock = Arc::new(ManualClock::new(ts(2026, 6, 1)));
        let (outbox, events) = Outbox::channel();
        let engine = SettlementEngine::new(
            store.clone(),
            rail.clone(),
            Arc::new(outbox),
            clock.clone(),
            policy,
        );

        Self {
            store,
            rail,
            clock,
            engine,
            events,
        }
    }

    /// Engine over another store, sharing this harness's rail and clock.
    /// Its events are discarded.
    pub fn engine_over<S: SettlementStore>(&self, store: Arc<S>) -> SettlementEngine<S> {
        let (outbox, _events) = Outbox::channel();
        let policy = SettlementPolicy {
            payment_timeout: Duration::from_millis(50),
            ..SettlementPolicy::default()
        };
        SettlementEngine::new(
            store,
            self.rail.clone(),
            Arc::new(outbox),
            self.clock.clone(),
            policy,
        )
    }

    /// Events published so far, oldest first.
    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// In-memory store whose balance reads fail for one partner.
pub struct FailingBalances {
    inner: Arc<InMemorySettlementStore>,
    broken: Uuid,
}

impl FailingBalances {
    pub fn new(inner: Arc<InMemorySettlementStore>, broken: Uuid) -> Self {
        Self { inner, broken }
    }
}

#[async_trait]
impl PartnerStore for FailingBalances {
    async fn partner(&self, partner_id: Uuid) -> SettlementResult<Option<Partner>> {
        self.inner.partner(partner_id).await
    }

    async fn partner_ids(&self) -> SettlementResult<Vec<Uuid>> {
        self.inner.partner_ids().await
    }

    async fn commission_rules(&self, partner_id: Uuid) -> SettlementResult<Vec<CommissionRule>> {
        self.inner.commission_rules(partner_id).await
    }

    async fn payout_candidates(&self) -> SettlementResult<Vec<Partner>> {
        self.inner.payout_candidates().await
    }

    async fn update_tier(
        &self,
        partner_id: Uuid,
        from: PartnerTier,
        to: PartnerTier,
        at: DateTime<Utc>,
    ) -> SettlementResult<bool> {
        self.inner.update_tier(partner_id, from, to, at).await
    }
}

#[async_trait]
impl CommissionStore for FailingBalances {
    async fn record_commission(
        &self,
        commission: NewCommission,
    ) -> SettlementResult<Recorded<Commission>> {
        self.inner.record_commission(commission).await
    }

    async fn commission(&self, commission_id: Uuid) -> SettlementResult<Option<Commission>> {
        self.inner.commission(commission_id).await
    }

    async fn decide_commission(
        &self,
        commission_id: Uuid,
        decision: CommissionDecision,
    ) -> SettlementResult<Option<Commission>> {
        self.inner.decide_commission(commission_id, decision).await
    }

    async fn list_commissions(&self, filter: CommissionFilter) -> SettlementResult<Vec<Commission>> {
        self.inner.list_commissions(filter).await
    }
}

#[async_trait]
impl PayoutStore for FailingBalances {
    async fn partner_balance(&self, partner_id: Uuid) -> SettlementResult<PartnerBalance> {
        if partner_id == self.broken {
            return Err(SettlementError::Storage(anyhow::anyhow!(
                "balance read timed out"
            )));
        }
        self.inner.partner_balance(partner_id).await
    }

    async fn create_payout(&self, payout: NewPayout) -> SettlementResult<Payout> {
        self.inner.create_payout(payout).await
    }

    async fn payout(&self, payout_id: Uuid) -> SettlementResult<Option<Payout>> {
        self.inner.payout(payout_id).await
    }

    async fn transition_payout(
        &self,
        payout_id: Uuid,
        from: &[PayoutStatus],
        change: PayoutChange,
    ) -> SettlementResult<Option<Payout>> {
        self.inner.transition_payout(payout_id, from, change).await
    }

    async fn list_payouts(&self, filter: PayoutFilter) -> SettlementResult<Vec<Payout>> {
        self.inner.list_payouts(filter).await
    }
}
