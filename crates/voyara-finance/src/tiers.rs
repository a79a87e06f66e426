use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use voyara_core::{
    Clock, DomainEvent, DomainEventKind, EventPublisher, PartnerStore, PartnerTier,
    SettlementError, SettlementResult,
};

use crate::eligibility::PartnerFailure;

const TIER_WRITE_ATTEMPTS: usize = 3;

/// (tier, minimum revenue, minimum bookings), highest first.
const TIER_THRESHOLDS: [(PartnerTier, i64, i64); 3] = [
    (PartnerTier::Platinum, 100_000, 500),
    (PartnerTier::Gold, 50_000, 250),
    (PartnerTier::Silver, 20_000, 100),
];

pub fn tier_for(total_revenue: Decimal, total_bookings: i64) -> PartnerTier {
    TIER_THRESHOLDS
        .iter()
        .find(|(_, revenue, bookings)| {
            total_revenue >= Decimal::from(*revenue) && total_bookings >= *bookings
        })
        .map(|(tier, _, _)| *tier)
        .unwrap_or(PartnerTier::Bronze)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierChange {
    pub partner_id: Uuid,
    pub previous: PartnerTier,
    pub current: PartnerTier,
}

impl TierChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierSweepReport {
    pub recalculated: usize,
    pub changes: Vec<TierChange>,
    pub failures: Vec<PartnerFailure>,
}

pub struct TierRecalculator<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
}

impl<S> TierRecalculator<S>
where
    S: PartnerStore,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            clock,
            events,
        }
    }

    pub async fn recalculate_tier(&self, partner_id: Uuid) -> SettlementResult<TierChange> {
        for _ in 0..TIER_WRITE_ATTEMPTS {
            let partner = self
                .store
                .partner(partner_id)
                .await?
                .ok_or(SettlementError::PartnerNotFound(partner_id))?;
            let target = tier_for(partner.total_revenue, partner.total_bookings);
            let change = TierChange {
                partner_id,
                previous: partner.tier,
                current: target,
            };
            if !change.changed() {
                return Ok(change);
            }

            let now = self.clock.now();
            if self
                .store
                .update_tier(partner_id, partner.tier, target, now)
                .await?
            {
                info!(
                    partner_id = %partner_id,
                    previous = %change.previous,
                    current = %change.current,
                    "partner tier changed"
                );
                self.events.publish(DomainEvent::new(
                    DomainEventKind::PartnerTierChanged,
                    partner_id,
                    partner_id,
                    now,
                    json!({
                        "previous": change.previous,
                        "current": change.current,
                        "total_revenue": partner.total_revenue,
                        "total_bookings": partner.total_bookings,
                    }),
                ));
                return Ok(change);
            }

            warn!(partner_id = %partner_id, "tier changed concurrently; recomputing");
        }

        Err(SettlementError::Storage(anyhow::anyhow!(
            "tier for partner {partner_id} kept changing concurrently"
        )))
    }

    pub async fn recalculate_all(&self) -> SettlementResult<TierSweepReport> {
        let mut report = TierSweepReport::default();

        for partner_id in self.store.partner_ids().await? {
            report.recalculated += 1;
            match self.recalculate_tier(partner_id).await {
                Ok(change) if change.changed() => report.changes.push(change),
                Ok(_) => {}
                Err(err) => {
                    warn!(partner_id = %partner_id, "tier recalculation failed: {err}");
                    report.failures.push(PartnerFailure {
                        partner_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}
