//! Transaction execution strategies.
//!
//! Every mutating unit of work (guard checks, the row change and its cascade) is expressed as a
//! closure over a connection that runs inside one transaction. PostgreSQL runs it once. Distributed
//! SQL engines speaking the PostgreSQL protocol (CockroachDB) can abort a transaction under
//! contention at any statement including `COMMIT`, so for them the executor re-runs the whole
//! closure in a fresh transaction until it commits or the attempt budget is spent.
//!
//! ```ignore
//! let written = executor
//!     .execute(&db, |conn| {
//!         let request = request.clone();
//!         let tenant = tenant.clone();
//!         Box::pin(async move { Ok::<_, Error>(Pools::new(conn, tenant).create(&request).await?) })
//!     })
//!     .await?;
//! ```
//!
//! The closure may run more than once, so it must own (clone) whatever it captures and must not
//! have side effects outside the connection.

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::db::errors::DbError;
use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that can tell whether the failed unit of work is safe to run again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for DbError {
    fn is_retryable(&self) -> bool {
        DbError::is_retryable(self)
    }
}

/// Runs units of work in a transaction, retrying them when the backend requires it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionExecutor {
    /// One attempt; errors surface as they are.
    Plain,
    /// Re-run on serialization failures with a linear backoff.
    Retrying { max_attempts: u32, backoff: Duration },
}

impl TransactionExecutor {
    pub fn for_database(config: &DatabaseConfig) -> Self {
        match config.backend {
            DatabaseBackend::Postgres => TransactionExecutor::Plain,
            DatabaseBackend::Cockroachdb => TransactionExecutor::Retrying {
                max_attempts: config.max_transaction_retries.max(1),
                backoff: config.retry_backoff,
            },
        }
    }

    /// Run `work` inside a transaction and commit it.
    ///
    /// The transaction is rolled back if `work` fails, so partial effects are never visible.
    pub async fn execute<T, E, F>(&self, pool: &PgPool, mut work: F) -> Result<T, E>
    where
        F: for<'c> FnMut(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>> + Send,
        E: From<DbError> + Retryable + Send,
        T: Send,
    {
        match self {
            TransactionExecutor::Plain => run_once(pool, &mut work).await,
            TransactionExecutor::Retrying { max_attempts, backoff } => {
                let mut attempt: u32 = 1;
                loop {
                    match run_once(pool, &mut work).await {
                        Err(e) if e.is_retryable() && attempt < *max_attempts => {
                            warn!(attempt, max_attempts, "Transaction aborted by the database, retrying");
                            tokio::time::sleep(*backoff * attempt).await;
                            attempt += 1;
                        }
                        result => return result,
                    }
                }
            }
        }
    }
}

async fn run_once<T, E, F>(pool: &PgPool, work: &mut F) -> Result<T, E>
where
    F: for<'c> FnMut(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>> + Send,
    E: From<DbError> + Send,
    T: Send,
{
    let mut tx = pool.begin().await.map_err(|e| E::from(DbError::from(e)))?;

    match work(&mut *tx).await {
        Ok(value) => {
            tx.commit().await.map_err(|e| E::from(DbError::from(e)))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                debug!("Rollback after failed unit of work also failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_executor_follows_backend() {
        let mut config = DatabaseConfig::default();
        assert_eq!(TransactionExecutor::for_database(&config), TransactionExecutor::Plain);

        config.backend = DatabaseBackend::Cockroachdb;
        config.max_transaction_retries = 4;
        match TransactionExecutor::for_database(&config) {
            TransactionExecutor::Retrying { max_attempts, .. } => assert_eq!(max_attempts, 4),
            other => panic!("unexpected executor {other:?}"),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failed_work_is_rolled_back(pool: PgPool) {
        let result: Result<(), DbError> = TransactionExecutor::Plain
            .execute(&pool, |conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO pool (project_id, name) VALUES ('p1', 'rolled-back')")
                        .execute(&mut *conn)
                        .await?;
                    Err(DbError::NotFound)
                })
            })
            .await;
        assert!(matches!(result, Err(DbError::NotFound)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pool").fetch_one(&pool).await.unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_retrying_executor_reruns_the_whole_unit(pool: PgPool) {
        let attempts = Arc::new(AtomicU32::new(0));
        let executor = TransactionExecutor::Retrying {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        };

        let result: Result<i64, DbError> = executor
            .execute(&pool, |conn| {
                let attempts = attempts.clone();
                Box::pin(async move {
                    sqlx::query("INSERT INTO pool (project_id, name) VALUES ('p1', 'retried')")
                        .execute(&mut *conn)
                        .await?;
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(DbError::Retryable {
                            message: "restart transaction".to_string(),
                        });
                    }
                    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pool").fetch_one(&mut *conn).await?;
                    Ok(count)
                })
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_retrying_executor_gives_up_after_budget(pool: PgPool) {
        let attempts = Arc::new(AtomicU32::new(0));
        let executor = TransactionExecutor::Retrying {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        };

        let result: Result<(), DbError> = executor
            .execute(&pool, |_conn| {
                let attempts = attempts.clone();
                Box::pin(async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(DbError::Retryable {
                        message: "restart transaction".to_string(),
                    })
                })
            })
            .await;

        assert!(matches!(result, Err(DbError::Retryable { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
