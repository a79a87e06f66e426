pub mod eligibility;
pub mod ledger;
pub mod payouts;
pub mod policy;
pub mod rates;
pub mod tiers;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use voyara_core::{Clock, EventPublisher, PaymentRail, SettlementStore};

pub use eligibility::{EligiblePartner, PartnerFailure, PayoutEligibilityScanner, ScanReport};
pub use ledger::CommissionLedger;
pub use payouts::{BatchReport, PayoutProcessor};
pub use policy::SettlementPolicy;
pub use rates::{CommissionRuleResolver, RateSource, ResolvedRate, select_rule};
pub use tiers::{TierChange, TierRecalculator, TierSweepReport, tier_for};

pub struct SettlementEngine<S> {
    pub resolver: CommissionRuleResolver<S>,
    pub ledger: CommissionLedger<S>,
    pub scanner: PayoutEligibilityScanner<S>,
    pub payouts: PayoutProcessor<S>,
    pub tiers: TierRecalculator<S>,
}

impl<S> SettlementEngine<S>
where
    S: SettlementStore,
{
    pub fn new(
        store: Arc<S>,
        rail: Arc<dyn PaymentRail>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            resolver: CommissionRuleResolver::new(Arc::clone(&store)),
            ledger: CommissionLedger::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                Arc::clone(&events),
                policy.clone(),
            ),
            scanner: PayoutEligibilityScanner::new(Arc::clone(&store), Arc::clone(&clock)),
            payouts: PayoutProcessor::new(
                Arc::clone(&store),
                rail,
                Arc::clone(&clock),
                Arc::clone(&events),
                policy,
            ),
            tiers: TierRecalculator::new(store, clock, events),
        }
    }
}
