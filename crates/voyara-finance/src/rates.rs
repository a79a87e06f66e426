use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voyara_core::{CommissionRule, PartnerStore, PartnerTier, SettlementError, SettlementResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateSource {
    Rule { rule_id: Uuid },
    Base { tier: PartnerTier },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedRate {
    pub percentage: Decimal,
    pub source: RateSource,
}

impl ResolvedRate {
    pub fn rule_id(&self) -> Option<Uuid> {
        match self.source {
            RateSource::Rule { rule_id } => Some(rule_id),
            RateSource::Base { .. } => None,
        }
    }
}

/// Picks the override rule for a booking: in effect at `as_of`, threshold
/// met, highest threshold first, then the most recent `effective_from`.
pub fn select_rule(
    rules: &[CommissionRule],
    booking_amount: Decimal,
    as_of: DateTime<Utc>,
) -> Option<&CommissionRule> {
    rules
        .iter()
        .filter(|rule| rule.in_effect(as_of))
        .filter(|rule| rule.min_booking_amount <= booking_amount)
        .max_by(|a, b| rule_precedence(a, b))
}

fn rule_precedence(a: &CommissionRule, b: &CommissionRule) -> Ordering {
    a.min_booking_amount
        .cmp(&b.min_booking_amount)
        .then(a.effective_from.cmp(&b.effective_from))
        .then(b.id.cmp(&a.id))
}

pub struct CommissionRuleResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for CommissionRuleResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> CommissionRuleResolver<S>
where
    S: PartnerStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn resolve_rate(
        &self,
        partner_id: Uuid,
        booking_amount: Decimal,
        as_of: DateTime<Utc>,
    ) -> SettlementResult<ResolvedRate> {
        let partner = self
            .store
            .partner(partner_id)
            .await?
            .ok_or(SettlementError::PartnerNotFound(partner_id))?;
        let rules = self.store.commission_rules(partner_id).await?;

        let resolved = match select_rule(&rules, booking_amount, as_of) {
            Some(rule) => ResolvedRate {
                percentage: rule.rate,
                source: RateSource::Rule { rule_id: rule.id },
            },
            None => ResolvedRate {
                percentage: partner.base_commission_percentage,
                source: RateSource::Base { tier: partner.tier },
            },
        };

        Ok(resolved)
    }
}
