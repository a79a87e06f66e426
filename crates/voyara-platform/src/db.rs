use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};

const SCHEMA: &str = include_str!("../schema.sql");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub statement: Duration,
    pub lock: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            statement: Duration::from_secs(10),
            lock: Duration::from_secs(5),
        }
    }
}

fn session_settings(timeouts: SessionTimeouts) -> [(&'static str, String); 2] {
    [
        (
            "statement_timeout",
            timeouts.statement.as_millis().to_string(),
        ),
        ("lock_timeout", timeouts.lock.as_millis().to_string()),
    ]
}

pub async fn connect_database(database_url: &str, timeouts: SessionTimeouts) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(database_url)
        .context("DATABASE_URL is not a valid postgres url")?
        .options(session_settings(timeouts));

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply settlement schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_carry_statement_and_lock_timeouts() {
        let settings = session_settings(SessionTimeouts {
            statement: Duration::from_millis(2_500),
            lock: Duration::from_secs(1),
        });
        assert_eq!(
            settings,
            [
                ("statement_timeout", "2500".to_string()),
                ("lock_timeout", "1000".to_string()),
            ]
        );

        let defaults = session_settings(SessionTimeouts::default());
        assert_eq!(defaults[0].1, "10000");
        assert_eq!(defaults[1].1, "5000");
    }
}
