use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use voyara_core::{Clock, PartnerStore, PayoutStore, SettlementResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EligiblePartner {
    pub partner_id: Uuid,
    pub claimable: Decimal,
    pub min_payout_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartnerFailure {
    pub partner_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scanned_at: DateTime<Utc>,
    pub candidates: usize,
    pub eligible: Vec<EligiblePartner>,
    pub errors: Vec<PartnerFailure>,
}

impl ScanReport {
    pub fn partner_ids(&self) -> Vec<Uuid> {
        self.eligible.iter().map(|entry| entry.partner_id).collect()
    }
}

pub struct PayoutEligibilityScanner<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for PayoutEligibilityScanner<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S> PayoutEligibilityScanner<S>
where
    S: PartnerStore + PayoutStore,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn scan(&self) -> SettlementResult<ScanReport> {
        self.scan_at(self.clock.now()).await
    }

    /// Fails only when the candidate list itself cannot be read; per-partner
    /// balance errors land in [`ScanReport::errors`].
    pub async fn scan_at(&self, now: DateTime<Utc>) -> SettlementResult<ScanReport> {
        let candidates = self.store.payout_candidates().await?;
        let mut report = ScanReport {
            scanned_at: now,
            candidates: candidates.len(),
            eligible: Vec::new(),
            errors: Vec::new(),
        };

        for partner in candidates {
            if !partner.payout_window_open(now) {
                debug!(partner_id = %partner.id, "payout window still closed");
                continue;
            }

            match self.store.partner_balance(partner.id).await {
                Ok(balance) => {
                    let claimable = balance.approved_unpaid_total;
                    if claimable > Decimal::ZERO && claimable >= partner.min_payout_amount {
                        report.eligible.push(EligiblePartner {
                            partner_id: partner.id,
                            claimable,
                            min_payout_amount: partner.min_payout_amount,
                        });
                    } else {
                        debug!(
                            partner_id = %partner.id,
                            claimable = %claimable,
                            minimum = %partner.min_payout_amount,
                            "claimable balance below payout minimum"
                        );
                    }
                }
                Err(err) => {
                    warn!(partner_id = %partner.id, "balance lookup failed during scan: {err}");
                    report.errors.push(PartnerFailure {
                        partner_id: partner.id,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}
