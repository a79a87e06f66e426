use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SettlementError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl PartnerTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bronze => "BRONZE",
            Self::Silver => "SILVER",
            Self::Gold => "GOLD",
            Self::Platinum => "PLATINUM",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerStatus {
    Pending,
    Active,
    Suspended,
}

impl PartnerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutFrequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl PayoutFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "WEEKLY",
            Self::Biweekly => "BIWEEKLY",
            Self::Monthly => "MONTHLY",
        }
    }

    pub fn interval(self) -> Duration {
        match self {
            Self::Weekly => Duration::days(7),
            Self::Biweekly => Duration::days(14),
            Self::Monthly => Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl CommissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Payouts in these states hold a claim on the partner's approved balance.
    pub fn claims_balance(self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Completed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

macro_rules! impl_status_text {
    ($ty:ident, $label:literal, [$($variant:ident),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = SettlementError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let normalized = value.trim().to_ascii_uppercase();
                $(
                    if normalized == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(SettlementError::Validation(format!(
                    "unsupported {}: {value}",
                    $label
                )))
            }
        }
    };
}

impl_status_text!(PartnerTier, "partner tier", [Bronze, Silver, Gold, Platinum]);
impl_status_text!(PartnerStatus, "partner status", [Pending, Active, Suspended]);
impl_status_text!(PayoutFrequency, "payout frequency", [Weekly, Biweekly, Monthly]);
impl_status_text!(CommissionStatus, "commission status", [Pending, Approved, Rejected]);
impl_status_text!(
    PayoutStatus,
    "payout status",
    [Pending, Processing, Completed, Failed, Cancelled]
);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,
    pub tier: PartnerTier,
    pub base_commission_percentage: Decimal,
    pub min_payout_amount: Decimal,
    pub payout_frequency: PayoutFrequency,
    pub last_payout_date: Option<DateTime<Utc>>,
    pub total_revenue: Decimal,
    pub total_bookings: i64,
    pub total_commission_earned: Decimal,
    pub total_commission_paid: Decimal,
    pub status: PartnerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Partner {
    pub fn payout_window_open(&self, now: DateTime<Utc>) -> bool {
        match self.last_payout_date {
            None => true,
            Some(last) => now - last >= self.payout_frequency.interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommissionRule {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub rate: Decimal,
    pub min_booking_amount: Decimal,
    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
    pub active: bool,
}

impl CommissionRule {
    pub fn in_effect(&self, as_of: DateTime<Utc>) -> bool {
        self.active
            && self.effective_from <= as_of
            && self.effective_until.is_none_or(|until| as_of < until)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Commission {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub booking_id: Uuid,
    pub booking_amount: Decimal,
    pub amount: Decimal,
    pub percentage: Decimal,
    pub rule_id: Option<Uuid>,
    pub currency: String,
    pub status: CommissionStatus,
    pub approved_by: Option<String>,
    pub approval_date: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payout {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PayoutStatus,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `approved_unpaid_total` is approved commission minus every payout still
/// holding a claim (pending, processing or completed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartnerBalance {
    pub partner_id: Uuid,
    pub pending_total: Decimal,
    pub approved_total: Decimal,
    pub in_flight_total: Decimal,
    pub paid_total: Decimal,
    pub approved_unpaid_total: Decimal,
    pub lifetime_total: Decimal,
}

impl PartnerBalance {
    pub fn from_totals(
        partner_id: Uuid,
        commissions: CommissionTotals,
        payouts: PayoutTotals,
    ) -> Self {
        let claimed = payouts.pending + payouts.processing + payouts.completed;
        let approved_unpaid_total = (commissions.approved - claimed).max(Decimal::ZERO);

        Self {
            partner_id,
            pending_total: commissions.pending,
            approved_total: commissions.approved,
            in_flight_total: payouts.pending + payouts.processing,
            paid_total: payouts.completed,
            approved_unpaid_total,
            lifetime_total: commissions.approved,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommissionTotals {
    pub pending: Decimal,
    pub approved: Decimal,
    pub rejected: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayoutTotals {
    pub pending: Decimal,
    pub processing: Decimal,
    pub completed: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn partner(last_payout_date: Option<DateTime<Utc>>, frequency: PayoutFrequency) -> Partner {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Partner {
            id: Uuid::new_v4(),
            name: "Coastal Tours".to_string(),
            tier: PartnerTier::Bronze,
            base_commission_percentage: Decimal::from(10),
            min_payout_amount: Decimal::from(50),
            payout_frequency: frequency,
            last_payout_date,
            total_revenue: Decimal::ZERO,
            total_bookings: 0,
            total_commission_earned: Decimal::ZERO,
            total_commission_paid: Decimal::ZERO,
            status: PartnerStatus::Active,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn status_text_round_trips_case_insensitively() {
        assert_eq!("processing".parse::<PayoutStatus>().unwrap(), PayoutStatus::Processing);
        assert_eq!(" Gold ".parse::<PartnerTier>().unwrap(), PartnerTier::Gold);
        assert!("SETTLED".parse::<PayoutStatus>().is_err());
        assert_eq!(PayoutFrequency::Biweekly.to_string(), "BIWEEKLY");
    }

    #[test]
    fn payout_window_respects_frequency() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        assert!(partner(None, PayoutFrequency::Monthly).payout_window_open(now));
        assert!(
            partner(Some(now - Duration::days(7)), PayoutFrequency::Weekly).payout_window_open(now)
        );
        assert!(
            !partner(Some(now - Duration::days(13)), PayoutFrequency::Biweekly)
                .payout_window_open(now)
        );
        assert!(
            !partner(Some(now - Duration::days(29)), PayoutFrequency::Monthly)
                .payout_window_open(now)
        );
    }

    #[test]
    fn rule_effective_window_is_half_open() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let rule = CommissionRule {
            id: Uuid::new_v4(),
            partner_id: Uuid::new_v4(),
            rate: Decimal::from(15),
            min_booking_amount: Decimal::from(1000),
            effective_from: from,
            effective_until: Some(until),
            active: true,
        };

        assert!(rule.in_effect(from));
        assert!(!rule.in_effect(until));
        assert!(!CommissionRule { active: false, ..rule.clone() }.in_effect(from));
    }

    #[test]
    fn balance_subtracts_every_claiming_payout() {
        let balance = PartnerBalance::from_totals(
            Uuid::new_v4(),
            CommissionTotals {
                pending: Decimal::from(80),
                approved: Decimal::from(700),
                rejected: Decimal::from(25),
            },
            PayoutTotals {
                pending: Decimal::from(100),
                processing: Decimal::from(150),
                completed: Decimal::from(200),
            },
        );

        assert_eq!(balance.approved_unpaid_total, Decimal::from(250));
        assert_eq!(balance.in_flight_total, Decimal::from(250));
        assert_eq!(balance.paid_total, Decimal::from(200));
        assert_eq!(balance.pending_total, Decimal::from(80));
        assert_eq!(balance.lifetime_total, Decimal::from(700));
    }
}
