use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use voyara_finance::SettlementPolicy;

use crate::db::SessionTimeouts;

const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 86_400;
const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub payment_rail_url: String,
    pub payment_timeout: Duration,
    pub settlement_currency: String,
    pub default_payment_method: String,
    pub payout_sweep_interval: Duration,
    pub db_timeouts: SessionTimeouts,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let mut config = Self::worker_from_env()?;
        config.http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        Ok(config)
    }

    pub fn worker_from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let payment_rail_url =
            std::env::var("PAYMENT_RAIL_URL").context("PAYMENT_RAIL_URL is required")?;
        let payment_timeout = Duration::from_secs(env_or(
            "PAYMENT_TIMEOUT_SECS",
            DEFAULT_PAYMENT_TIMEOUT_SECS,
        )?);
        let payout_sweep_interval = Duration::from_secs(env_or(
            "PAYOUT_SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?);
        let db_timeouts = SessionTimeouts {
            statement: Duration::from_millis(env_or(
                "DB_STATEMENT_TIMEOUT_MS",
                DEFAULT_STATEMENT_TIMEOUT_MS,
            )?),
            lock: Duration::from_millis(env_or("DB_LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT_MS)?),
        };
        let settlement_currency = std::env::var("SETTLEMENT_CURRENCY")
            .map(|value| value.trim().to_ascii_uppercase())
            .unwrap_or_else(|_| "USD".to_string());
        let default_payment_method = std::env::var("DEFAULT_PAYMENT_METHOD")
            .unwrap_or_else(|_| "bank_transfer".to_string());

        if payment_timeout.is_zero() {
            anyhow::bail!("PAYMENT_TIMEOUT_SECS must be greater than zero");
        }
        if payout_sweep_interval.is_zero() {
            anyhow::bail!("PAYOUT_SWEEP_INTERVAL_SECS must be greater than zero");
        }
        // Postgres reads zero as "no limit".
        if db_timeouts.statement.is_zero() || db_timeouts.lock.is_zero() {
            anyhow::bail!(
                "DB_STATEMENT_TIMEOUT_MS and DB_LOCK_TIMEOUT_MS must be greater than zero"
            );
        }

        Ok(Self {
            database_url,
            redis_url,
            http_addr: String::new(),
            payment_rail_url,
            payment_timeout,
            settlement_currency,
            default_payment_method,
            payout_sweep_interval,
            db_timeouts,
        })
    }

    pub fn settlement_policy(&self) -> SettlementPolicy {
        SettlementPolicy {
            currency: self.settlement_currency.clone(),
            default_payment_method: self.default_payment_method.clone(),
            payment_timeout: self.payment_timeout,
        }
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
