use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use redis::Msg;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use voyara_core::{Commission, SettlementStore, SystemClock};
use voyara_eventstore::Outbox;
use voyara_finance::SettlementEngine;
use voyara_platform::{
    BOOKINGS_COMPLETED_CHANNEL, BookingCompletedEvent, HttpPaymentRail, PgSettlementStore,
    RedisBus, ServiceConfig, apply_schema, connect_database,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "voyara_ops=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let pool = connect_database(&config.database_url, config.db_timeouts).await?;
    apply_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let (outbox, _forwarder) = Outbox::spawn(Arc::new(redis.clone()));
    let rail = HttpPaymentRail::new(&config.payment_rail_url, config.payment_timeout)?;

    let engine = Arc::new(SettlementEngine::new(
        Arc::new(PgSettlementStore::new(pool)),
        Arc::new(rail),
        Arc::new(outbox),
        Arc::new(SystemClock),
        config.settlement_policy(),
    ));

    tokio::spawn(run_payout_sweeps(
        Arc::clone(&engine),
        config.payout_sweep_interval,
    ));

    let mut pubsub = redis.client().get_async_pubsub().await?;
    pubsub.subscribe(BOOKINGS_COMPLETED_CHANNEL).await?;
    let mut messages = pubsub.on_message();

    info!("ops worker subscribed to {BOOKINGS_COMPLETED_CHANNEL}");

    loop {
        let msg = messages
            .next()
            .await
            .with_context(|| format!("{BOOKINGS_COMPLETED_CHANNEL} stream ended unexpectedly"))?;
        if let Err(err) = handle_message(&engine, msg).await {
            error!("failed to process booking message: {err:#}");
        }
    }
}

async fn handle_message<S: SettlementStore>(
    engine: &SettlementEngine<S>,
    msg: Msg,
) -> Result<()> {
    let payload: String = msg.get_payload()?;
    let event = decode_booking(&payload)?;
    record_booking(engine, event).await?;
    Ok(())
}

fn decode_booking(payload: &str) -> Result<BookingCompletedEvent> {
    serde_json::from_str(payload).context("malformed bookings.completed payload")
}

async fn record_booking<S: SettlementStore>(
    engine: &SettlementEngine<S>,
    event: BookingCompletedEvent,
) -> Result<Commission> {
    let commission = engine
        .ledger
        .calculate_commission(event.booking_id, event.partner_id, event.booking_amount)
        .await
        .with_context(|| format!("booking {} was not recorded", event.booking_id))?;

    if let Err(err) = engine.tiers.recalculate_tier(event.partner_id).await {
        warn!(partner_id = %event.partner_id, "tier refresh after booking failed: {err}");
    }

    Ok(commission)
}

/// Runs the automatic payout batch, then a tier sweep, once per interval.
/// The first run happens one full interval after startup.
async fn run_payout_sweeps<S: SettlementStore>(
    engine: Arc<SettlementEngine<S>>,
    every: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match engine.payouts.process_automatic_payouts().await {
            Ok(report) => info!(
                eligible = report.eligible,
                succeeded = report.succeeded,
                failed = report.failures.len(),
                "automatic payout sweep finished"
            ),
            Err(err) => error!("automatic payout sweep aborted: {err}"),
        }

        match engine.tiers.recalculate_all().await {
            Ok(report) => info!(
                recalculated = report.recalculated,
                changed = report.changes.len(),
                failed = report.failures.len(),
                "tier sweep finished"
            ),
            Err(err) => error!("tier sweep aborted: {err}"),
        }
    }
}
