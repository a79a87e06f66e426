use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;
use voyara_core::{
    Clock, DisbursementRequest, DomainEvent, DomainEventKind, EventPublisher, NewPayout,
    PartnerStore, PaymentRail, PaymentRailError, Payout, PayoutChange, PayoutFilter, PayoutStatus,
    PayoutStore, SettlementError, SettlementResult,
};

use crate::eligibility::{EligiblePartner, PartnerFailure, PayoutEligibilityScanner};
use crate::policy::SettlementPolicy;

const AUTOMATIC_PAYOUT_NOTE: &str = "automatic payout";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub eligible: usize,
    pub succeeded: usize,
    pub failures: Vec<PartnerFailure>,
}

/// PENDING -> PROCESSING -> COMPLETED | FAILED; CANCELLED from the first two.
pub struct PayoutProcessor<S> {
    store: Arc<S>,
    rail: Arc<dyn PaymentRail>,
    scanner: PayoutEligibilityScanner<S>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    policy: SettlementPolicy,
}

impl<S> PayoutProcessor<S>
where
    S: PartnerStore + PayoutStore,
{
    pub fn new(
        store: Arc<S>,
        rail: Arc<dyn PaymentRail>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            scanner: PayoutEligibilityScanner::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            rail,
            clock,
            events,
            policy,
        }
    }

    pub async fn create_payout(
        &self,
        partner_id: Uuid,
        amount: Decimal,
        payment_method: &str,
        notes: Option<String>,
    ) -> SettlementResult<Payout> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::validation(format!(
                "payout amount must be positive, got {amount}"
            )));
        }

        let payment_method = match payment_method.trim() {
            "" => self.policy.default_payment_method.clone(),
            method => method.to_string(),
        };
        let notes = notes
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty());

        let payout = self
            .store
            .create_payout(NewPayout {
                id: Uuid::new_v4(),
                partner_id,
                amount,
                currency: self.policy.currency.clone(),
                payment_method,
                notes,
                created_at: self.clock.now(),
            })
            .await
            .inspect_err(|err| {
                if let SettlementError::InsufficientCommission { .. } = err {
                    warn!(partner_id = %partner_id, "payout refused: {err}");
                }
            })?;

        info!(
            payout_id = %payout.id,
            partner_id = %partner_id,
            amount = %payout.amount,
            "payout requested"
        );
        self.publish(DomainEventKind::PayoutRequested, &payout);

        Ok(payout)
    }

    /// Moves a pending payout through the payment rail. A rail failure or
    /// timeout is recorded on the payout and returned as `Ok`.
    pub async fn process_payout(&self, payout_id: Uuid) -> SettlementResult<Payout> {
        let processing = self
            .store
            .transition_payout(
                payout_id,
                &[PayoutStatus::Pending],
                PayoutChange::Processing {
                    at: self.clock.now(),
                },
            )
            .await?;
        let Some(processing) = processing else {
            return Err(self.state_error(payout_id, "process").await);
        };
        self.publish(DomainEventKind::PayoutProcessing, &processing);

        let request = DisbursementRequest {
            payout_id: processing.id,
            partner_id: processing.partner_id,
            amount: processing.amount,
            currency: processing.currency.clone(),
            payment_method: processing.payment_method.clone(),
        };
        let outcome = match tokio::time::timeout(
            self.policy.payment_timeout,
            self.rail.disburse(&request),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(PaymentRailError::Timeout(
                u64::try_from(self.policy.payment_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };

        match outcome {
            Ok(receipt) => {
                let change = PayoutChange::Completed {
                    transaction_id: receipt.transaction_id.clone(),
                    at: self.clock.now(),
                };
                let completed = self
                    .store
                    .transition_payout(payout_id, &[PayoutStatus::Processing], change)
                    .await?;
                let Some(completed) = completed else {
                    error!(
                        payout_id = %payout_id,
                        transaction_id = %receipt.transaction_id,
                        "payment rail settled a payout that is no longer processing; reconcile manually"
                    );
                    return Err(self.state_error(payout_id, "complete").await);
                };

                info!(
                    payout_id = %payout_id,
                    partner_id = %completed.partner_id,
                    amount = %completed.amount,
                    transaction_id = %receipt.transaction_id,
                    "payout completed"
                );
                self.publish(DomainEventKind::PayoutCompleted, &completed);
                Ok(completed)
            }
            Err(rail_error) => {
                warn!(payout_id = %payout_id, "payout disbursement failed: {rail_error}");
                let change = PayoutChange::Failed {
                    reason: rail_error.to_string(),
                    at: self.clock.now(),
                };
                let failed = self
                    .store
                    .transition_payout(payout_id, &[PayoutStatus::Processing], change)
                    .await?;
                let Some(failed) = failed else {
                    return Err(self.state_error(payout_id, "fail").await);
                };

                self.publish(DomainEventKind::PayoutFailed, &failed);
                Ok(failed)
            }
        }
    }

    pub async fn cancel_payout(&self, payout_id: Uuid, reason: &str) -> SettlementResult<Payout> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SettlementError::validation(
                "a reason is required to cancel a payout",
            ));
        }

        let cancelled = self
            .store
            .transition_payout(
                payout_id,
                &[PayoutStatus::Pending, PayoutStatus::Processing],
                PayoutChange::Cancelled {
                    reason: reason.to_string(),
                    at: self.clock.now(),
                },
            )
            .await?;
        let Some(cancelled) = cancelled else {
            return Err(self.state_error(payout_id, "cancel").await);
        };

        info!(payout_id = %payout_id, reason, "payout cancelled");
        self.publish(DomainEventKind::PayoutCancelled, &cancelled);
        Ok(cancelled)
    }

    /// Scans for eligible partners and settles each one independently. Only
    /// a failure to read the candidate list aborts the batch.
    pub async fn process_automatic_payouts(&self) -> SettlementResult<BatchReport> {
        let scan = self.scanner.scan().await?;
        let mut report = BatchReport {
            eligible: scan.eligible.len(),
            succeeded: 0,
            failures: scan.errors,
        };

        for candidate in &scan.eligible {
            match self.settle(candidate).await {
                Ok(payout) if payout.status == PayoutStatus::Completed => report.succeeded += 1,
                Ok(payout) => report.failures.push(PartnerFailure {
                    partner_id: candidate.partner_id,
                    error: payout
                        .failure_reason
                        .unwrap_or_else(|| format!("payout ended {}", payout.status)),
                }),
                Err(err) => {
                    error!(partner_id = %candidate.partner_id, "automatic payout failed: {err}");
                    report.failures.push(PartnerFailure {
                        partner_id: candidate.partner_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            eligible = report.eligible,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "automatic payout batch finished"
        );
        Ok(report)
    }

    async fn settle(&self, candidate: &EligiblePartner) -> SettlementResult<Payout> {
        let payout = self
            .create_payout(
                candidate.partner_id,
                candidate.claimable,
                &self.policy.default_payment_method,
                Some(AUTOMATIC_PAYOUT_NOTE.to_string()),
            )
            .await?;
        self.process_payout(payout.id).await
    }

    pub async fn payout(&self, payout_id: Uuid) -> SettlementResult<Payout> {
        self.store
            .payout(payout_id)
            .await?
            .ok_or(SettlementError::PayoutNotFound(payout_id))
    }

    pub async fn list_payouts(&self, filter: PayoutFilter) -> SettlementResult<Vec<Payout>> {
        self.store.list_payouts(filter).await
    }

    async fn state_error(&self, payout_id: Uuid, action: &'static str) -> SettlementError {
        match self.store.payout(payout_id).await {
            Ok(Some(payout)) => SettlementError::InvalidPayoutState {
                id: payout_id,
                current: payout.status,
                action,
            },
            Ok(None) => SettlementError::PayoutNotFound(payout_id),
            Err(err) => err,
        }
    }

    fn publish(&self, kind: DomainEventKind, payout: &Payout) {
        self.events.publish(DomainEvent::new(
            kind,
            payout.id,
            payout.partner_id,
            payout.updated_at,
            json!({
                "amount": payout.amount,
                "currency": payout.currency,
                "status": payout.status,
                "payment_method": payout.payment_method,
                "transaction_id": payout.transaction_id,
                "failure_reason": payout.failure_reason,
            }),
        ));
    }
}
