//! PostgreSQL connection pool management

use std::future::Future;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DatabaseConfig;
use crate::error::{sanitize_url, DatabaseError, Error, Result};
use crate::translate::ColumnSet;

/// Create a PostgreSQL connection pool, retrying with exponential backoff
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = with_backoff(
        "Database",
        config.max_retries,
        Duration::from_secs(config.retry_delay_secs),
        || try_create_pool(config),
    )
    .await?;
    tracing::info!(
        "Database connection pool created: max={}, min={}",
        config.max_connections,
        config.min_connections
    );
    Ok(pool)
}

/// Column names of `table` in the current schema, for the filter allow-list
pub async fn load_columns(pool: &PgPool, table: &str) -> Result<ColumnSet> {
    let columns: Vec<String> = sqlx::query_scalar(
        "SELECT column_name::text FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 \
         ORDER BY ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    if columns.is_empty() {
        tracing::warn!(table, "table has no visible columns, every filter will be dropped");
    } else {
        tracing::debug!(table, columns = columns.len(), "loaded column allow-list");
    }
    Ok(columns.into_iter().collect())
}

/// Run `attempt` until it succeeds, fails with a non-retriable error, or
/// `max_retries` retries are spent
///
/// The delay doubles after each failure, starting at `base_delay`.
pub(crate) async fn with_backoff<T, F, Fut>(
    label: &str,
    max_retries: u32,
    base_delay: Duration,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match attempt_fn().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(
                        "{} connection established after {} attempt(s)",
                        label,
                        attempt + 1
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;

                if !e.is_retriable() {
                    tracing::error!("Failed to connect to {}, not retrying: {}", label, e);
                    return Err(e);
                }
                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to {} after {} attempts: {}",
                        label,
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay_multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
                let delay = base_delay.saturating_mul(delay_multiplier);

                tracing::warn!(
                    "{} connection attempt {} failed: {}. Retrying in {:?}...",
                    label,
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Single connection attempt
async fn try_create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| {
            Error::Database(
                DatabaseError::from(e)
                    .add_context(format!("connecting to {}", sanitize_url(&config.url))),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseErrorKind, DatabaseOperation};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            max_connections: 4,
            min_connections: 0,
            connection_timeout_secs: 1,
            max_retries: 0,
            retry_delay_secs: 0,
            optional: true,
        }
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_retry() {
        let err = create_pool(&config("not a url")).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn test_backoff_retries_until_success() {
        let calls = AtomicU32::new(0);
        let value = with_backoff("Test", 3, Duration::ZERO, || {
            let calls = &calls;
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Internal("not yet".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backoff_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("Test", 1, Duration::ZERO, || {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Internal("down".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_backoff_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("Test", 5, Duration::ZERO, || {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Database(DatabaseError::new(
                    DatabaseOperation::Connect,
                    DatabaseErrorKind::Configuration,
                    "invalid port number",
                )))
            }
        })
        .await;
        assert!(matches!(result, Err(Error::Database(ref e)) if e.kind == DatabaseErrorKind::Configuration));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_retries_connection_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("Test", 2, Duration::ZERO, || {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Document(DatabaseError::connection_failed("connection refused")))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
