use std::str::FromStr;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;
use voyara_core::{
    Commission, CommissionDecision, CommissionFilter, CommissionRule, CommissionStore,
    CommissionTotals, NewCommission, NewPayout, Partner, PartnerBalance, PartnerStore,
    PartnerTier, Payout, PayoutChange, PayoutFilter, PayoutStatus, PayoutStore, PayoutTotals,
    Recorded, SettlementError, SettlementResult, list_limit,
};

const PARTNER_COLUMNS: &str = "id, name, tier, base_commission_percentage, min_payout_amount, \
     payout_frequency, last_payout_date, total_revenue, total_bookings, \
     total_commission_earned, total_commission_paid, status, created_at, updated_at";

const COMMISSION_COLUMNS: &str = "id, partner_id, booking_id, booking_amount, amount, percentage, \
     rule_id, currency, status, approved_by, approval_date, reason, created_at, updated_at";

const PAYOUT_COLUMNS: &str = "id, partner_id, amount, currency, status, payment_method, \
     transaction_id, processed_at, completed_at, failure_reason, notes, created_at, updated_at";

/// Balance-affecting writes take the partner row lock (`FOR UPDATE`) first.
#[derive(Clone)]
pub struct PgSettlementStore {
    pool: PgPool,
}

impl PgSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn storage_error(err: sqlx::Error) -> SettlementError {
    SettlementError::Storage(err.into())
}

fn text_column<T>(row: &PgRow, column: &str) -> SettlementResult<T>
where
    T: FromStr<Err = SettlementError>,
{
    let raw: String = row.try_get(column).map_err(storage_error)?;
    raw.parse()
        .map_err(|err| SettlementError::Storage(anyhow!("column {column}: {err}")))
}

fn partner_from_row(row: &PgRow) -> SettlementResult<Partner> {
    Ok(Partner {
        id: row.try_get("id").map_err(storage_error)?,
        name: row.try_get("name").map_err(storage_error)?,
        tier: text_column(row, "tier")?,
        base_commission_percentage: row
            .try_get("base_commission_percentage")
            .map_err(storage_error)?,
        min_payout_amount: row.try_get("min_payout_amount").map_err(storage_error)?,
        payout_frequency: text_column(row, "payout_frequency")?,
        last_payout_date: row.try_get("last_payout_date").map_err(storage_error)?,
        total_revenue: row.try_get("total_revenue").map_err(storage_error)?,
        total_bookings: row.try_get("total_bookings").map_err(storage_error)?,
        total_commission_earned: row
            .try_get("total_commission_earned")
            .map_err(storage_error)?,
        total_commission_paid: row.try_get("total_commission_paid").map_err(storage_error)?,
        status: text_column(row, "status")?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
        updated_at: row.try_get("updated_at").map_err(storage_error)?,
    })
}

fn rule_from_row(row: &PgRow) -> SettlementResult<CommissionRule> {
    Ok(CommissionRule {
        id: row.try_get("id").map_err(storage_error)?,
        partner_id: row.try_get("partner_id").map_err(storage_error)?,
        rate: row.try_get("rate").map_err(storage_error)?,
        min_booking_amount: row.try_get("min_booking_amount").map_err(storage_error)?,
        effective_from: row.try_get("effective_from").map_err(storage_error)?,
        effective_until: row.try_get("effective_until").map_err(storage_error)?,
        active: row.try_get("active").map_err(storage_error)?,
    })
}

fn commission_from_row(row: &PgRow) -> SettlementResult<Commission> {
    Ok(Commission {
        id: row.try_get("id").map_err(storage_error)?,
        partner_id: row.try_get("partner_id").map_err(storage_error)?,
        booking_id: row.try_get("booking_id").map_err(storage_error)?,
        booking_amount: row.try_get("booking_amount").map_err(storage_error)?,
        amount: row.try_get("amount").map_err(storage_error)?,
        percentage: row.try_get("percentage").map_err(storage_error)?,
        rule_id: row.try_get("rule_id").map_err(storage_error)?,
        currency: row.try_get("currency").map_err(storage_error)?,
        status: text_column(row, "status")?,
        approved_by: row.try_get("approved_by").map_err(storage_error)?,
        approval_date: row.try_get("approval_date").map_err(storage_error)?,
        reason: row.try_get("reason").map_err(storage_error)?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
        updated_at: row.try_get("updated_at").map_err(storage_error)?,
    })
}

fn payout_from_row(row: &PgRow) -> SettlementResult<Payout> {
    Ok(Payout {
        id: row.try_get("id").map_err(storage_error)?,
        partner_id: row.try_get("partner_id").map_err(storage_error)?,
        amount: row.try_get("amount").map_err(storage_error)?,
        currency: row.try_get("currency").map_err(storage_error)?,
        status: text_column(row, "status")?,
        payment_method: row.try_get("payment_method").map_err(storage_error)?,
        transaction_id: row.try_get("transaction_id").map_err(storage_error)?,
        processed_at: row.try_get("processed_at").map_err(storage_error)?,
        completed_at: row.try_get("completed_at").map_err(storage_error)?,
        failure_reason: row.try_get("failure_reason").map_err(storage_error)?,
        notes: row.try_get("notes").map_err(storage_error)?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
        updated_at: row.try_get("updated_at").map_err(storage_error)?,
    })
}

async fn lock_partner(conn: &mut PgConnection, partner_id: Uuid) -> SettlementResult<()> {
    sqlx::query("SELECT id FROM partners WHERE id = $1 FOR UPDATE")
        .bind(partner_id)
        .fetch_optional(conn)
        .await
        .map_err(storage_error)?
        .map(|_| ())
        .ok_or(SettlementError::PartnerNotFound(partner_id))
}

async fn load_balance(
    conn: &mut PgConnection,
    partner_id: Uuid,
) -> SettlementResult<PartnerBalance> {
    let row = sqlx::query(
        "SELECT
            COALESCE(SUM(amount) FILTER (WHERE status = 'PENDING'), 0) AS pending,
            COALESCE(SUM(amount) FILTER (WHERE status = 'APPROVED'), 0) AS approved,
            COALESCE(SUM(amount) FILTER (WHERE status = 'REJECTED'), 0) AS rejected
         FROM commissions
         WHERE partner_id = $1",
    )
    .bind(partner_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(storage_error)?;
    let commissions = CommissionTotals {
        pending: row.try_get::<Decimal, _>("pending").map_err(storage_error)?,
        approved: row.try_get::<Decimal, _>("approved").map_err(storage_error)?,
        rejected: row.try_get::<Decimal, _>("rejected").map_err(storage_error)?,
    };

    let row = sqlx::query(
        "SELECT
            COALESCE(SUM(amount) FILTER (WHERE status = 'PENDING'), 0) AS pending,
            COALESCE(SUM(amount) FILTER (WHERE status = 'PROCESSING'), 0) AS processing,
            COALESCE(SUM(amount) FILTER (WHERE status = 'COMPLETED'), 0) AS completed
         FROM payouts
         WHERE partner_id = $1",
    )
    .bind(partner_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(storage_error)?;
    let payouts = PayoutTotals {
        pending: row.try_get::<Decimal, _>("pending").map_err(storage_error)?,
        processing: row.try_get::<Decimal, _>("processing").map_err(storage_error)?,
        completed: row.try_get::<Decimal, _>("completed").map_err(storage_error)?,
    };

    Ok(PartnerBalance::from_totals(partner_id, commissions, payouts))
}

#[async_trait]
impl PartnerStore for PgSettlementStore {
    async fn partner(&self, partner_id: Uuid) -> SettlementResult<Option<Partner>> {
        let sql = format!("SELECT {PARTNER_COLUMNS} FROM partners WHERE id = $1");
        sqlx::query(&sql)
            .bind(partner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .as_ref()
            .map(partner_from_row)
            .transpose()
    }

    async fn partner_ids(&self) -> SettlementResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM partners ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(storage_error))
            .collect()
    }

    async fn commission_rules(&self, partner_id: Uuid) -> SettlementResult<Vec<CommissionRule>> {
        let rows = sqlx::query(
            "SELECT id, partner_id, rate, min_booking_amount, effective_from, effective_until, active
             FROM commission_rules
             WHERE partner_id = $1",
        )
        .bind(partner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.iter().map(rule_from_row).collect()
    }

    async fn payout_candidates(&self) -> SettlementResult<Vec<Partner>> {
        let sql = format!(
            "SELECT {PARTNER_COLUMNS}
             FROM partners p
             WHERE p.status = 'ACTIVE'
               AND EXISTS (
                   SELECT 1 FROM commissions c
                   WHERE c.partner_id = p.id AND c.status = 'APPROVED'
               )
             ORDER BY p.id"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(partner_from_row).collect()
    }

    async fn update_tier(
        &self,
        partner_id: Uuid,
        from: PartnerTier,
        to: PartnerTier,
        at: DateTime<Utc>,
    ) -> SettlementResult<bool> {
        let result = sqlx::query(
            "UPDATE partners SET tier = $3, updated_at = $4 WHERE id = $1 AND tier = $2",
        )
        .bind(partner_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM partners WHERE id = $1)")
            .bind(partner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?
            .try_get(0)
            .map_err(storage_error)?;
        if exists {
            Ok(false)
        } else {
            Err(SettlementError::PartnerNotFound(partner_id))
        }
    }
}

#[async_trait]
impl CommissionStore for PgSettlementStore {
    async fn record_commission(
        &self,
        commission: NewCommission,
    ) -> SettlementResult<Recorded<Commission>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let select_existing =
            format!("SELECT {COMMISSION_COLUMNS} FROM commissions WHERE booking_id = $1");
        if let Some(row) = sqlx::query(&select_existing)
            .bind(commission.booking_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?
        {
            return Ok(Recorded::Existing(commission_from_row(&row)?));
        }

        lock_partner(&mut tx, commission.partner_id).await?;

        let insert = format!(
            "INSERT INTO commissions (
                id, partner_id, booking_id, booking_amount, amount, percentage, rule_id,
                currency, status, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', $9, $9)
             ON CONFLICT (booking_id) DO NOTHING
             RETURNING {COMMISSION_COLUMNS}"
        );
        let inserted = sqlx::query(&insert)
            .bind(commission.id)
            .bind(commission.partner_id)
            .bind(commission.booking_id)
            .bind(commission.booking_amount)
            .bind(commission.amount)
            .bind(commission.percentage)
            .bind(commission.rule_id)
            .bind(&commission.currency)
            .bind(commission.created_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?;

        let Some(row) = inserted else {
            // Another writer recorded the booking between the lookup and the insert.
            let row = sqlx::query(&select_existing)
                .bind(commission.booking_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_error)?;
            tx.commit().await.map_err(storage_error)?;
            return Ok(Recorded::Existing(commission_from_row(&row)?));
        };
        let recorded = commission_from_row(&row)?;

        sqlx::query(
            "UPDATE partners
             SET total_revenue = total_revenue + $2,
                 total_bookings = total_bookings + 1,
                 updated_at = $3
             WHERE id = $1",
        )
        .bind(commission.partner_id)
        .bind(commission.booking_amount)
        .bind(commission.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(Recorded::Created(recorded))
    }

    async fn commission(&self, commission_id: Uuid) -> SettlementResult<Option<Commission>> {
        let sql = format!("SELECT {COMMISSION_COLUMNS} FROM commissions WHERE id = $1");
        sqlx::query(&sql)
            .bind(commission_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .as_ref()
            .map(commission_from_row)
            .transpose()
    }

    async fn decide_commission(
        &self,
        commission_id: Uuid,
        decision: CommissionDecision,
    ) -> SettlementResult<Option<Commission>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let Some(owner) = sqlx::query("SELECT partner_id FROM commissions WHERE id = $1")
            .bind(commission_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?
        else {
            return Ok(None);
        };
        let partner_id: Uuid = owner.try_get("partner_id").map_err(storage_error)?;
        lock_partner(&mut tx, partner_id).await?;

        let (approved_by, approval_date, reason, at) = match &decision {
            CommissionDecision::Approve { approved_by, at } => {
                (Some(approved_by.as_str()), Some(*at), None, *at)
            }
            CommissionDecision::Reject { reason, at } => (None, None, Some(reason.as_str()), *at),
        };

        let update = format!(
            "UPDATE commissions
             SET status = $2, approved_by = $3, approval_date = $4, reason = $5, updated_at = $6
             WHERE id = $1 AND status = 'PENDING'
             RETURNING {COMMISSION_COLUMNS}"
        );
        let Some(row) = sqlx::query(&update)
            .bind(commission_id)
            .bind(decision.target().as_str())
            .bind(approved_by)
            .bind(approval_date)
            .bind(reason)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?
        else {
            return Ok(None);
        };
        let decided = commission_from_row(&row)?;

        if matches!(decision, CommissionDecision::Approve { .. }) {
            sqlx::query(
                "UPDATE partners
                 SET total_commission_earned = total_commission_earned + $2, updated_at = $3
                 WHERE id = $1",
            )
            .bind(partner_id)
            .bind(decided.amount)
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(Some(decided))
    }

    async fn list_commissions(&self, filter: CommissionFilter) -> SettlementResult<Vec<Commission>> {
        let sql = format!(
            "SELECT {COMMISSION_COLUMNS}
             FROM commissions
             WHERE ($1::uuid IS NULL OR partner_id = $1)
               AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC, id
             LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.partner_id)
            .bind(filter.status.map(|status| status.as_str()))
            .bind(list_limit(filter.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(commission_from_row).collect()
    }
}

#[async_trait]
impl PayoutStore for PgSettlementStore {
    async fn partner_balance(&self, partner_id: Uuid) -> SettlementResult<PartnerBalance> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;

        let exists: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM partners WHERE id = $1)")
            .bind(partner_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(storage_error)?
            .try_get(0)
            .map_err(storage_error)?;
        if !exists {
            return Err(SettlementError::PartnerNotFound(partner_id));
        }

        load_balance(&mut conn, partner_id).await
    }

    async fn create_payout(&self, payout: NewPayout) -> SettlementResult<Payout> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        lock_partner(&mut tx, payout.partner_id).await?;

        let available = load_balance(&mut tx, payout.partner_id)
            .await?
            .approved_unpaid_total;
        if payout.amount > available {
            return Err(SettlementError::InsufficientCommission {
                requested: payout.amount,
                available,
            });
        }

        let insert = format!(
            "INSERT INTO payouts (
                id, partner_id, amount, currency, status, payment_method, notes,
                created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, $7, $7)
             RETURNING {PAYOUT_COLUMNS}"
        );
        let row = sqlx::query(&insert)
            .bind(payout.id)
            .bind(payout.partner_id)
            .bind(payout.amount)
            .bind(&payout.currency)
            .bind(&payout.payment_method)
            .bind(&payout.notes)
            .bind(payout.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_error)?;
        let created = payout_from_row(&row)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(created)
    }

    async fn payout(&self, payout_id: Uuid) -> SettlementResult<Option<Payout>> {
        let sql = format!("SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = $1");
        sqlx::query(&sql)
            .bind(payout_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .as_ref()
            .map(payout_from_row)
            .transpose()
    }

    async fn transition_payout(
        &self,
        payout_id: Uuid,
        from: &[PayoutStatus],
        change: PayoutChange,
    ) -> SettlementResult<Option<Payout>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let Some(owner) = sqlx::query("SELECT partner_id FROM payouts WHERE id = $1")
            .bind(payout_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?
        else {
            return Ok(None);
        };
        let partner_id: Uuid = owner.try_get("partner_id").map_err(storage_error)?;
        lock_partner(&mut tx, partner_id).await?;

        let expected: Vec<String> = from.iter().map(|status| status.as_str().to_string()).collect();
        let at = change.at();
        let (transaction_id, reason) = match &change {
            PayoutChange::Processing { .. } => (None, None),
            PayoutChange::Completed { transaction_id, .. } => (Some(transaction_id.as_str()), None),
            PayoutChange::Failed { reason, .. } | PayoutChange::Cancelled { reason, .. } => {
                (None, Some(reason.as_str()))
            }
        };

        let update = format!(
            "UPDATE payouts
             SET status = $3,
                 processed_at = CASE WHEN $3 = 'PROCESSING' THEN $6 ELSE processed_at END,
                 completed_at = CASE WHEN $3 = 'COMPLETED' THEN $6 ELSE completed_at END,
                 transaction_id = COALESCE($4, transaction_id),
                 failure_reason = COALESCE($5, failure_reason),
                 updated_at = $6
             WHERE id = $1 AND status = ANY($2)
             RETURNING {PAYOUT_COLUMNS}"
        );
        let Some(row) = sqlx::query(&update)
            .bind(payout_id)
            .bind(&expected)
            .bind(change.target().as_str())
            .bind(transaction_id)
            .bind(reason)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?
        else {
            return Ok(None);
        };
        let updated = payout_from_row(&row)?;

        if updated.status == PayoutStatus::Completed {
            sqlx::query(
                "UPDATE partners
                 SET last_payout_date = $2,
                     total_commission_paid = total_commission_paid + $3,
                     updated_at = $2
                 WHERE id = $1",
            )
            .bind(partner_id)
            .bind(at)
            .bind(updated.amount)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(Some(updated))
    }

    async fn list_payouts(&self, filter: PayoutFilter) -> SettlementResult<Vec<Payout>> {
        let sql = format!(
            "SELECT {PAYOUT_COLUMNS}
             FROM payouts
             WHERE ($1::uuid IS NULL OR partner_id = $1)
               AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC, id
             LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.partner_id)
            .bind(filter.status.map(|status| status.as_str()))
            .bind(list_limit(filter.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(payout_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_lists_match_the_row_mappers() {
        for column in ["tier", "payout_frequency", "status", "total_bookings"] {
            assert!(PARTNER_COLUMNS.contains(column));
        }
        for column in ["booking_id", "rule_id", "approval_date", "reason"] {
            assert!(COMMISSION_COLUMNS.contains(column));
        }
        for column in ["transaction_id", "processed_at", "failure_reason", "notes"] {
            assert!(PAYOUT_COLUMNS.contains(column));
        }
    }
}
