#![allow(async_fn_in_trait)]

use std::sync::OnceLock;
use std::time::Instant;

use deadpool_postgres::ClientWrapper;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error as PgError, Row};
use tracing::warn;

pub const SLOW_QUERY_ENV: &str = "DI_DB_LOG_MIN_DURATION_MS";

fn parse_threshold(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|v| v.max(0) as u64)
        .filter(|v| *v > 0)
}

fn slow_query_threshold_ms() -> Option<u64> {
    static CACHE: OnceLock<Option<u64>> = OnceLock::new();

    *CACHE.get_or_init(|| parse_threshold(std::env::var(SLOW_QUERY_ENV).ok().as_deref()))
}

fn maybe_log_slow_query(label: &str, started_at: Instant) {
    if let Some(threshold_ms) = slow_query_threshold_ms() {
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if elapsed_ms >= threshold_ms {
            warn!(query = label, elapsed_ms, "slow_query_detected");
        }
    }
}

/// Prepared-statement helpers that log statements slower than
/// `DI_DB_LOG_MIN_DURATION_MS`.
pub trait TimedClientExt {
    async fn timed_query(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Vec<Row>, PgError>;

    async fn timed_query_opt(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Option<Row>, PgError>;

    async fn timed_query_one(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Row, PgError>;

    async fn timed_execute(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<u64, PgError>;
}

impl TimedClientExt for ClientWrapper {
    async fn timed_query(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Vec<Row>, PgError> {
        let started = Instant::now();
        let prepared = self.prepare_cached(statement).await?;
        let result = self.query(&prepared, params).await;
        maybe_log_slow_query(label, started);
        result
    }

    async fn timed_query_opt(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Option<Row>, PgError> {
        let started = Instant::now();
        let prepared = self.prepare_cached(statement).await?;
        let result = self.query_opt(&prepared, params).await;
        maybe_log_slow_query(label, started);
        result
    }

    async fn timed_query_one(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Row, PgError> {
        let started = Instant::now();
        let prepared = self.prepare_cached(statement).await?;
        let result = self.query_one(&prepared, params).await;
        maybe_log_slow_query(label, started);
        result
    }

    async fn timed_execute(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<u64, PgError> {
        let started = Instant::now();
        let prepared = self.prepare_cached(statement).await?;
        let result = self.execute(&prepared, params).await;
        maybe_log_slow_query(label, started);
        result
    }
}
