//! Background reconciliation.
//!
//! Two loops run next to the request path:
//!
//! - **Unbound-pool advancement**: a pool attached to no domain is never picked up by an agent, so
//!   its pending changes would wait forever. The housekeeper settles such pools directly: pending
//!   members and monitors become `ACTIVE` (or disappear when they were being deleted), then the
//!   pool itself becomes `ACTIVE`.
//! - **Soft-delete collection**: domains confirmed deleted stay as `DELETED` markers for a
//!   retention window so agents can observe the removal, then they are dropped.
//!
//! Every step is one short transaction and all progress lives in the database, so several
//! replicas can run the loops side by side (`SKIP LOCKED` keeps them off each other's rows) and a
//! restart simply picks up where the last one stopped.

use crate::config::HousekeepingConfig;
use crate::db::errors::Result;
use crate::db::transaction::TransactionExecutor;
use crate::types::{PoolId, abbrev_uuid};
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Settle one pending pool that no domain references. Returns the pool, or `None` when nothing is
/// left to claim.
#[instrument(skip(conn), err)]
pub async fn activate_next_unbound_pool(conn: &mut PgConnection) -> Result<Option<PoolId>> {
    let claimed: Option<PoolId> = sqlx::query_scalar(
        r#"
        SELECT pool.id FROM pool
        WHERE pool.provisioning_status LIKE 'PENDING\_%'
          AND NOT EXISTS (SELECT 1 FROM domain_pool_relation r WHERE r.pool_id = pool.id)
        ORDER BY pool.updated_at
        LIMIT 1
        FOR UPDATE OF pool SKIP LOCKED
        "#,
    )
    .fetch_optional(&mut *conn)
    .await?;

    let Some(pool_id) = claimed else {
        return Ok(None);
    };

    // No agent will ever confirm these
    for table in ["member", "monitor"] {
        sqlx::query(&format!(
            "DELETE FROM {table} WHERE pool_id = $1 AND provisioning_status = 'PENDING_DELETE'"
        ))
        .bind(pool_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query(&format!(
            "UPDATE {table} SET provisioning_status = 'ACTIVE', updated_at = NOW() \
             WHERE pool_id = $1 AND provisioning_status LIKE 'PENDING\\_%'"
        ))
        .bind(pool_id)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("UPDATE pool SET provisioning_status = 'ACTIVE', updated_at = NOW() WHERE id = $1")
        .bind(pool_id)
        .execute(&mut *conn)
        .await?;

    debug!(pool_id = %abbrev_uuid(&pool_id), "Activated unbound pool");
    Ok(Some(pool_id))
}

/// Drop `DELETED` domain markers older than `delete_after`.
#[instrument(skip(conn), err)]
pub async fn cleanup_deleted_domains(conn: &mut PgConnection, delete_after: Duration) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM domain WHERE provisioning_status = 'DELETED' AND updated_at < NOW() - make_interval(secs => $1)",
    )
    .bind(delete_after.as_secs_f64())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Runs the reconciliation loops until cancelled.
#[derive(Clone)]
pub struct Housekeeper {
    db: PgPool,
    executor: TransactionExecutor,
    config: HousekeepingConfig,
}

impl Housekeeper {
    pub fn new(db: PgPool, executor: TransactionExecutor, config: HousekeepingConfig) -> Self {
        Self { db, executor, config }
    }

    /// Activate unbound pools until none is claimable. Returns how many were settled.
    pub async fn advance_unbound_pools(&self) -> Result<u64> {
        let mut settled = 0;
        while let Some(_pool_id) = self
            .executor
            .execute(&self.db, |conn| Box::pin(activate_next_unbound_pool(conn)))
            .await?
        {
            settled += 1;
        }
        if settled > 0 {
            metrics::counter!("gslbctl_housekeeping_pools_activated_total").increment(settled);
        }
        Ok(settled)
    }

    pub async fn collect_deleted_domains(&self) -> Result<u64> {
        let delete_after = self.config.delete_after;
        let removed = self
            .executor
            .execute(&self.db, |conn| Box::pin(cleanup_deleted_domains(conn, delete_after)))
            .await?;
        if removed > 0 {
            metrics::counter!("gslbctl_housekeeping_domains_removed_total").increment(removed);
            info!(removed, "Removed deleted domains past retention");
        }
        Ok(removed)
    }

    pub async fn run_unbound_pools(&self, shutdown: CancellationToken) {
        info!(
            "Starting unbound pool advancement with {:?} interval",
            self.config.unbound_pool_interval
        );
        loop {
            if let Err(e) = self.advance_unbound_pools().await {
                metrics::counter!("gslbctl_housekeeping_errors_total", "task" => "unbound_pools").increment(1);
                warn!("Unbound pool advancement failed: {}", e);
            }
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Unbound pool advancement shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.unbound_pool_interval) => {}
            }
        }
    }

    pub async fn run_cleanup(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.cleanup_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            "Starting deleted domain cleanup every {:?}, retention {:?}",
            self.config.cleanup_interval(),
            self.config.delete_after
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Deleted domain cleanup shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.collect_deleted_domains().await {
                        metrics::counter!("gslbctl_housekeeping_errors_total", "task" => "cleanup").increment(1);
                        warn!("Deleted domain cleanup failed: {}", e);
                    }
                }
            }
        }
    }

    /// Spawn both loops onto the runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        let pools = self.clone();
        let pools_shutdown = shutdown.clone();
        vec![
            tokio::spawn(async move { pools.run_unbound_pools(pools_shutdown).await }),
            tokio::spawn(async move { self.run_cleanup(shutdown).await }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::domains::DomainEnvelope;
    use crate::api::models::members::MemberEnvelope;
    use crate::api::models::pools::PoolEnvelope;
    use crate::test_utils::{
        PROJECT_HEADER, attach, create_domain, create_member, create_pool, create_test_app, set_status, status_of,
    };
    use axum::http::StatusCode;
    use serde_json::json;

    fn housekeeper(pool: &PgPool) -> Housekeeper {
        Housekeeper::new(
            pool.clone(),
            TransactionExecutor::Plain,
            HousekeepingConfig {
                enabled: true,
                unbound_pool_interval: Duration::from_millis(10),
                ..Default::default()
            },
        )
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unbound_pool_and_children_are_settled(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let kept = create_member(&mut conn, "project-a", pool_id, 80).await;
        let leaving = create_member(&mut conn, "project-a", pool_id, 81).await;
        set_status(&mut conn, "member", leaving, "PENDING_DELETE").await;

        assert_eq!(housekeeper(&pool).advance_unbound_pools().await.unwrap(), 1);

        assert_eq!(status_of(&mut conn, "pool", pool_id).await, "ACTIVE");
        assert_eq!(status_of(&mut conn, "member", kept).await, "ACTIVE");
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM member WHERE id = $1")
            .bind(leaving)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(remaining, 0);

        // Nothing left to do
        assert_eq!(housekeeper(&pool).advance_unbound_pools().await.unwrap(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_bound_pool_is_left_to_the_agents(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let domain_id = create_domain(&mut conn, "project-a", "www.example.com").await;
        attach(&mut conn, domain_id, pool_id).await;

        assert_eq!(housekeeper(&pool).advance_unbound_pools().await.unwrap(), 0);
        assert_eq!(status_of(&mut conn, "pool", pool_id).await, "PENDING_CREATE");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_cleanup_respects_retention(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let old = create_domain(&mut conn, "project-a", "old.example.com").await;
        let recent = create_domain(&mut conn, "project-a", "new.example.com").await;
        for id in [old, recent] {
            set_status(&mut conn, "domain", id, "DELETED").await;
        }
        sqlx::query("UPDATE domain SET updated_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
            .bind(old)
            .execute(&mut *conn)
            .await
            .unwrap();

        let removed = cleanup_deleted_domains(&mut conn, Duration::from_secs(600)).await.unwrap();
        assert_eq!(removed, 1);

        let left: Vec<uuid::Uuid> = sqlx::query_scalar("SELECT id FROM domain").fetch_all(&mut *conn).await.unwrap();
        assert_eq!(left, vec![recent]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_loops_make_progress_and_stop(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;

        let shutdown = CancellationToken::new();
        let handles = housekeeper(&pool).spawn(shutdown.clone());

        let mut settled = false;
        for _ in 0..100 {
            if status_of(&mut conn, "pool", pool_id).await == "ACTIVE" {
                settled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(settled, "housekeeper never activated the unbound pool");

        shutdown.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("housekeeping loop did not stop")
                .unwrap();
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_pool_lifecycle_scenario(pool: PgPool) {
        let (app, _bg) = create_test_app(pool.clone()).await;
        let mut conn = pool.acquire().await.unwrap();

        // A new pool waits for provisioning
        let created: PoolEnvelope = app
            .post("/pools")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"pool": {"name": "p"}}))
            .await
            .json();
        let pool_id = created.pool.id;
        assert_eq!(created.pool.provisioning_status.as_str(), "PENDING_CREATE");

        // Adding a member marks the pool for re-sync
        let member: MemberEnvelope = app
            .post(&format!("/pools/{pool_id}/members"))
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"member": {"address": "192.0.2.1", "port": 80}}))
            .await
            .json();
        assert_eq!(member.member.provisioning_status.as_str(), "PENDING_CREATE");
        assert_eq!(status_of(&mut conn, "pool", pool_id).await, "PENDING_UPDATE");

        // Nothing references the pool, so housekeeping settles it
        housekeeper(&pool).advance_unbound_pools().await.unwrap();
        assert_eq!(status_of(&mut conn, "pool", pool_id).await, "ACTIVE");
        assert_eq!(status_of(&mut conn, "member", member.member.id).await, "ACTIVE");

        // Attached to a domain that is not ACTIVE yet, the pool cannot be deleted
        let domain: DomainEnvelope = app
            .post("/domains")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"domain": {"fqdn": "www.example.com", "provider": "f5", "pools": [pool_id]}}))
            .await
            .json();
        app.delete(&format!("/pools/{pool_id}"))
            .add_header(PROJECT_HEADER, "project-a")
            .await
            .assert_status(StatusCode::CONFLICT);

        // Once detached it can
        app.put(&format!("/domains/{}", domain.domain.id))
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"domain": {"pools": []}}))
            .await
            .assert_status_ok();
        app.delete(&format!("/pools/{pool_id}"))
            .add_header(PROJECT_HEADER, "project-a")
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }
}
