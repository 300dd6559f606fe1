//! Database repository for pools.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::owned_by;
use crate::db::handlers::repository::{Repository, Written};
use crate::db::models::pools::{PoolCreateDBRequest, PoolDBResponse, PoolUpdateDBRequest};
use crate::lifecycle::cascade::{self, CascadeUpdater, Change};
use crate::lifecycle::state::{self, EntityKind, ProvisioningStatus};
use crate::pagination::{KeysetQuery, Keyed, Page};
use crate::types::{PoolId, ProjectId, Tenant, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Filter for listing pools
#[derive(Debug, Clone)]
pub struct PoolFilter {
    pub query: KeysetQuery,
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Pool {
    pub id: PoolId,
    pub project_id: ProjectId,
    pub name: String,
    pub admin_state_up: bool,
    pub status: String,
    pub provisioning_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for Pool {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

impl TryFrom<Pool> for PoolDBResponse {
    type Error = anyhow::Error;

    fn try_from(src: Pool) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: src.id,
            project_id: src.project_id,
            name: src.name,
            admin_state_up: src.admin_state_up,
            status: src.status,
            provisioning_status: src.provisioning_status.parse()?,
            created_at: src.created_at,
            updated_at: src.updated_at,
        })
    }
}

pub struct Pools<'c> {
    db: &'c mut PgConnection,
    tenant: Tenant,
}

impl<'c> Pools<'c> {
    pub fn new(db: &'c mut PgConnection, tenant: Tenant) -> Self {
        Self { db, tenant }
    }

    /// Lock a pool row for the rest of the transaction.
    async fn lock(&mut self, id: PoolId) -> Result<Pool> {
        sqlx::query_as::<_, Pool>("SELECT * FROM pool WHERE id = $1 AND ($2::text IS NULL OR project_id = $2) FOR UPDATE")
            .bind(id)
            .bind(self.tenant.project())
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Pools<'c> {
    type CreateRequest = PoolCreateDBRequest;
    type UpdateRequest = PoolUpdateDBRequest;
    type Response = PoolDBResponse;
    type Id = PoolId;
    type Filter = PoolFilter;

    #[instrument(skip(self, request), fields(project_id = %request.project_id, name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Written<Self::Response>> {
        let pool = sqlx::query_as::<_, Pool>(
            r#"
            INSERT INTO pool (project_id, name, admin_state_up, provisioning_status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&request.project_id)
        .bind(&request.name)
        .bind(request.admin_state_up)
        .bind(EntityKind::Pool.initial_status().as_str())
        .fetch_one(&mut *self.db)
        .await?;

        // An unattached pool concerns no domain yet
        Ok(Written::new(pool.try_into()?, Vec::new()))
    }

    #[instrument(skip(self), fields(pool_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let pool = sqlx::query_as::<_, Pool>("SELECT * FROM pool WHERE id = $1 AND ($2::text IS NULL OR project_id = $2)")
            .bind(id)
            .bind(self.tenant.project())
            .fetch_optional(&mut *self.db)
            .await?;

        match pool {
            Some(p) => Ok(Some(p.try_into()?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), err(level = "debug"))]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Page<Self::Response>> {
        let mut query = filter.query.clone();
        if let Some(scope) = owned_by(&self.tenant) {
            query = query.with_filter(scope);
        }
        let page = query.fetch::<Pool>(&mut *self.db).await?;
        Ok(page.try_map(PoolDBResponse::try_from)?)
    }

    #[instrument(skip(self, request), fields(pool_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Written<Self::Response>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let next = state::on_user_update(EntityKind::Pool, status).map_err(|e| DbError::illegal_transition(id, e))?;

        CascadeUpdater::new(&mut *self.db).ensure_pool_mutable(id).await?;

        let pool = sqlx::query_as::<_, Pool>(
            r#"
            UPDATE pool SET
                name = COALESCE($2, name),
                admin_state_up = COALESCE($3, admin_state_up),
                provisioning_status = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.name.as_deref())
        .bind(request.admin_state_up)
        .bind(next.as_str())
        .fetch_one(&mut *self.db)
        .await?;

        let outcome = CascadeUpdater::new(&mut *self.db)
            .apply(&cascade::plan(&Change::Pool { pool_id: id }))
            .await?;

        Ok(Written::new(pool.try_into()?, outcome.domains))
    }

    #[instrument(skip(self), fields(pool_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<Written<Option<Self::Response>>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        // Pools are removed outright once detached
        state::on_user_delete(EntityKind::Pool, status).map_err(|e| DbError::illegal_transition(id, e))?;

        CascadeUpdater::new(&mut *self.db).ensure_pool_detached(id).await?;

        // Members and the monitor go with the pool
        sqlx::query("DELETE FROM pool WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(Written::new(None, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{PageRequest, PaginationSettings};
    use crate::test_utils::{attach, create_domain, create_member, create_pool, set_status, status_of};
    use sqlx::PgPool;

    fn tenant() -> Tenant {
        Tenant::Project("project-a".to_string())
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_starts_pending(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Pools::new(&mut conn, tenant());
        let written = repo
            .create(&PoolCreateDBRequest {
                project_id: "project-a".to_string(),
                name: "web".to_string(),
                admin_state_up: true,
            })
            .await
            .unwrap();

        assert_eq!(written.entity.provisioning_status, ProvisioningStatus::PendingCreate);
        assert!(written.domains.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_other_projects_cannot_see_pool(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;

        let mut repo = Pools::new(&mut conn, Tenant::Project("project-b".to_string()));
        assert!(repo.get_by_id(pool_id).await.unwrap().is_none());
        assert!(matches!(
            repo.update(pool_id, &PoolUpdateDBRequest::default()).await,
            Err(DbError::NotFound)
        ));

        let mut repo = Pools::new(&mut conn, Tenant::Any);
        assert!(repo.get_by_id(pool_id).await.unwrap().is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_cascades_to_attached_domains(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let domain_id = create_domain(&mut conn, "project-a", "www.example.com").await;
        attach(&mut conn, domain_id, pool_id).await;
        set_status(&mut conn, "domain", domain_id, "ACTIVE").await;

        let mut tx = pool.begin().await.unwrap();
        let written = Pools::new(&mut tx, tenant())
            .update(
                pool_id,
                &PoolUpdateDBRequest {
                    name: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(written.entity.name, "renamed");
        assert_eq!(written.entity.provisioning_status, ProvisioningStatus::PendingUpdate);
        assert_eq!(written.domains, vec![domain_id]);
        assert_eq!(status_of(&mut conn, "domain", domain_id).await, "PENDING_UPDATE");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_pool_immutable_while_domain_syncing(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let domain_id = create_domain(&mut conn, "project-a", "www.example.com").await;
        attach(&mut conn, domain_id, pool_id).await;

        let mut tx = pool.begin().await.unwrap();
        let result = Pools::new(&mut tx, tenant())
            .update(
                pool_id,
                &PoolUpdateDBRequest {
                    name: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(DbError::Conflict { .. })));
        tx.rollback().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let result = Pools::new(&mut tx, tenant()).delete(pool_id).await;
        assert!(matches!(result, Err(DbError::Conflict { .. })));
        tx.rollback().await.unwrap();

        let unchanged = Pools::new(&mut conn, tenant()).get_by_id(pool_id).await.unwrap().unwrap();
        assert_eq!(unchanged.name, "pool");
        assert_eq!(unchanged.provisioning_status, ProvisioningStatus::PendingCreate);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_attached_pool_cannot_be_deleted_even_when_active(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let domain_id = create_domain(&mut conn, "project-a", "www.example.com").await;
        attach(&mut conn, domain_id, pool_id).await;
        set_status(&mut conn, "domain", domain_id, "ACTIVE").await;

        let result = Pools::new(&mut conn, tenant()).delete(pool_id).await;
        assert!(matches!(result, Err(DbError::Conflict { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_detached_pool_is_removed(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        create_member(&mut conn, "project-a", pool_id, 80).await;
        set_status(&mut conn, "pool", pool_id, "ERROR").await;

        let written = Pools::new(&mut conn, tenant()).delete(pool_id).await.unwrap();
        assert!(written.entity.is_none());
        assert!(written.domains.is_empty());
        assert!(Pools::new(&mut conn, tenant()).get_by_id(pool_id).await.unwrap().is_none());

        let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM member WHERE pool_id = $1")
            .bind(pool_id)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(members, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_is_scoped_to_project(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mine = create_pool(&mut conn, "project-a").await;
        create_pool(&mut conn, "project-b").await;

        let query =
            KeysetQuery::new::<PoolDBResponse>(&PageRequest::default(), &PaginationSettings::default(), vec![]).unwrap();
        let page = Pools::new(&mut conn, tenant()).list(&PoolFilter { query }).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, mine);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[sqlx::test]
    async fn test_stale_marker_is_not_logged_as_error(pool: PgPool) {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut conn = pool.acquire().await.unwrap();
        create_pool(&mut conn, "project-a").await;

        let request = PageRequest {
            marker: Some(uuid::Uuid::new_v4().to_string()),
            ..Default::default()
        };
        let query = KeysetQuery::new::<PoolDBResponse>(&request, &PaginationSettings::default(), vec![]).unwrap();
        let result = Pools::new(&mut conn, tenant()).list(&PoolFilter { query }).await;
        assert!(matches!(result, Err(DbError::InvalidMarker)));

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains(" DEBUG "), "expected the failure at debug level: {logs}");
        assert!(!logs.contains(" ERROR "), "client error logged at error level: {logs}");
    }
}
