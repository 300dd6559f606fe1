//! Database repository for per-project quotas.

use crate::db::errors::{DbError, Result};
use crate::db::models::quotas::{QuotaDBResponse, QuotaLimits, QuotaUsage};
use crate::pagination::{KeysetQuery, Keyed, Page};
use crate::types::ProjectId;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Quota {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub domain_akamai: i64,
    pub domain_f5: i64,
    pub pool: i64,
    pub member: i64,
    pub monitor: i64,
    pub datacenter: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for Quota {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl From<Quota> for QuotaDBResponse {
    fn from(src: Quota) -> Self {
        Self {
            id: src.id,
            project_id: src.project_id,
            limits: QuotaLimits {
                domain_akamai: src.domain_akamai,
                domain_f5: src.domain_f5,
                pool: src.pool,
                member: src.member,
                monitor: src.monitor,
                datacenter: src.datacenter,
            },
            created_at: src.created_at,
            updated_at: src.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct Usage {
    domain_akamai: i64,
    domain_f5: i64,
    pool: i64,
    member: i64,
    monitor: i64,
    datacenter: i64,
}

/// Repository for quotas. Quota rows are keyed by project rather than by ID and are not
/// provisioned by agents, so they do not go through the lifecycle [`crate::db::handlers::Repository`].
pub struct Quotas<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Quotas<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get(&mut self, project_id: &str) -> Result<Option<QuotaDBResponse>> {
        let quota = sqlx::query_as::<_, Quota>("SELECT * FROM quota WHERE project_id = $1")
            .bind(project_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(quota.map(Into::into))
    }

    /// Seed the project's row with `defaults` unless one exists already.
    ///
    /// Concurrent callers may race here; the loser's insert is silently ignored.
    #[instrument(skip(self, defaults), err)]
    pub async fn ensure_exists(&mut self, project_id: &str, defaults: QuotaLimits) -> Result<QuotaDBResponse> {
        sqlx::query(
            r#"
            INSERT INTO quota (project_id, domain_akamai, domain_f5, pool, member, monitor, datacenter)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (project_id) DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(defaults.domain_akamai)
        .bind(defaults.domain_f5)
        .bind(defaults.pool)
        .bind(defaults.member)
        .bind(defaults.monitor)
        .bind(defaults.datacenter)
        .execute(&mut *self.db)
        .await?;

        self.get(project_id).await?.ok_or(DbError::NotFound)
    }

    /// Create or replace the project's limits.
    #[instrument(skip(self, limits), err)]
    pub async fn set(&mut self, project_id: &str, limits: QuotaLimits) -> Result<QuotaDBResponse> {
        let quota = sqlx::query_as::<_, Quota>(
            r#"
            INSERT INTO quota (project_id, domain_akamai, domain_f5, pool, member, monitor, datacenter)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (project_id) DO UPDATE SET
                domain_akamai = EXCLUDED.domain_akamai,
                domain_f5 = EXCLUDED.domain_f5,
                pool = EXCLUDED.pool,
                member = EXCLUDED.member,
                monitor = EXCLUDED.monitor,
                datacenter = EXCLUDED.datacenter,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(limits.domain_akamai)
        .bind(limits.domain_f5)
        .bind(limits.pool)
        .bind(limits.member)
        .bind(limits.monitor)
        .bind(limits.datacenter)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(quota.into())
    }

    /// Remove the project's row; later checks fall back to the configured defaults.
    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, project_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM quota WHERE project_id = $1")
            .bind(project_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, query), err(level = "debug"))]
    pub async fn list(&mut self, query: &KeysetQuery) -> Result<Page<QuotaDBResponse>> {
        let page = query.fetch::<Quota>(&mut *self.db).await?;
        Ok(page.map(Into::into))
    }

    /// Count the project's live resources. Rows being deleted no longer count against the quota.
    #[instrument(skip(self), err)]
    pub async fn usage(&mut self, project_id: &str) -> Result<QuotaUsage> {
        let usage = sqlx::query_as::<_, Usage>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM domain WHERE project_id = $1 AND provider = 'akamai'
                    AND provisioning_status NOT IN ('PENDING_DELETE', 'DELETED')) AS domain_akamai,
                (SELECT COUNT(*) FROM domain WHERE project_id = $1 AND provider = 'f5'
                    AND provisioning_status NOT IN ('PENDING_DELETE', 'DELETED')) AS domain_f5,
                (SELECT COUNT(*) FROM pool WHERE project_id = $1
                    AND provisioning_status NOT IN ('PENDING_DELETE', 'DELETED')) AS pool,
                (SELECT COUNT(*) FROM member WHERE project_id = $1
                    AND provisioning_status NOT IN ('PENDING_DELETE', 'DELETED')) AS member,
                (SELECT COUNT(*) FROM monitor WHERE project_id = $1
                    AND provisioning_status NOT IN ('PENDING_DELETE', 'DELETED')) AS monitor,
                (SELECT COUNT(*) FROM datacenter WHERE project_id = $1
                    AND provisioning_status NOT IN ('PENDING_DELETE', 'DELETED')) AS datacenter
            "#,
        )
        .bind(project_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(QuotaUsage {
            domain_akamai: usage.domain_akamai,
            domain_f5: usage.domain_f5,
            pool: usage.pool,
            member: usage.member,
            monitor: usage.monitor,
            datacenter: usage.datacenter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_domain, create_pool, set_status};
    use sqlx::PgPool;

    fn limits(pool: i64) -> QuotaLimits {
        QuotaLimits {
            domain_akamai: 1,
            domain_f5: 1,
            pool,
            member: 1,
            monitor: 1,
            datacenter: 1,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_ensure_exists_keeps_existing_row(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Quotas::new(&mut conn);

        let seeded = repo.ensure_exists("project-a", limits(3)).await.unwrap();
        assert_eq!(seeded.limits.pool, 3);

        let again = repo.ensure_exists("project-a", limits(9)).await.unwrap();
        assert_eq!(again.limits.pool, 3);
        assert_eq!(again.id, seeded.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_set_overwrites_and_delete_removes(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Quotas::new(&mut conn);

        repo.ensure_exists("project-a", limits(3)).await.unwrap();
        let updated = repo.set("project-a", limits(-1)).await.unwrap();
        assert_eq!(updated.limits.pool, -1);

        assert!(repo.delete("project-a").await.unwrap());
        assert!(repo.get("project-a").await.unwrap().is_none());
        assert!(!repo.delete("project-a").await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_usage_ignores_deleting_rows(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        create_pool(&mut conn, "project-a").await;
        create_pool(&mut conn, "project-b").await;
        let live = create_domain(&mut conn, "project-a", "a.example.com").await;
        let gone = create_domain(&mut conn, "project-a", "b.example.com").await;
        set_status(&mut conn, "domain", gone, "PENDING_DELETE").await;
        assert_ne!(live, gone);

        let usage = Quotas::new(&mut conn).usage("project-a").await.unwrap();
        assert_eq!(usage.pool, 1);
        assert_eq!(usage.domain_akamai, 1);
        assert_eq!(usage.domain_f5, 0);
    }
}
