//! Database repository for pool members.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::datacenters::missing_datacenters;
use crate::db::handlers::owned_by;
use crate::db::handlers::repository::{Repository, Written};
use crate::db::models::members::{MemberCreateDBRequest, MemberDBResponse, MemberUpdateDBRequest};
use crate::lifecycle::cascade::{self, CascadeUpdater, Change};
use crate::lifecycle::state::{self, EntityKind, ProvisioningStatus, Transition};
use crate::pagination::{Filter, KeysetQuery, Keyed, Page};
use crate::types::{DatacenterId, MemberId, PoolId, ProjectId, Tenant, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Filter for listing the members of one pool
#[derive(Debug, Clone)]
pub struct MemberFilter {
    pub pool_id: PoolId,
    pub query: KeysetQuery,
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Member {
    pub id: MemberId,
    pub project_id: ProjectId,
    pub pool_id: PoolId,
    pub datacenter_id: Option<DatacenterId>,
    pub name: String,
    pub address: String,
    pub port: i32,
    pub admin_state_up: bool,
    pub status: String,
    pub provisioning_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for Member {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

impl TryFrom<Member> for MemberDBResponse {
    type Error = anyhow::Error;

    fn try_from(src: Member) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: src.id,
            project_id: src.project_id,
            pool_id: src.pool_id,
            name: src.name,
            address: src.address.parse()?,
            port: u16::try_from(src.port)?,
            datacenter_id: src.datacenter_id,
            admin_state_up: src.admin_state_up,
            status: src.status,
            provisioning_status: src.provisioning_status.parse()?,
            created_at: src.created_at,
            updated_at: src.updated_at,
        })
    }
}

/// Repository for members. Members are addressed through their pool, so IDs are
/// `(pool_id, member_id)` pairs.
pub struct Members<'c> {
    db: &'c mut PgConnection,
    tenant: Tenant,
}

impl<'c> Members<'c> {
    pub fn new(db: &'c mut PgConnection, tenant: Tenant) -> Self {
        Self { db, tenant }
    }

    /// Check the pool exists for this tenant and hold it against concurrent deletion.
    async fn lock_pool(&mut self, pool_id: PoolId) -> Result<()> {
        let found: Option<PoolId> =
            sqlx::query_scalar("SELECT id FROM pool WHERE id = $1 AND ($2::text IS NULL OR project_id = $2) FOR SHARE")
                .bind(pool_id)
                .bind(self.tenant.project())
                .fetch_optional(&mut *self.db)
                .await?;
        found.map(|_| ()).ok_or(DbError::NotFound)
    }

    async fn ensure_pool_visible(&mut self, pool_id: PoolId) -> Result<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM pool WHERE id = $1 AND ($2::text IS NULL OR project_id = $2))",
        )
        .bind(pool_id)
        .bind(self.tenant.project())
        .fetch_one(&mut *self.db)
        .await?;
        if !exists {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn lock(&mut self, pool_id: PoolId, id: MemberId) -> Result<Member> {
        sqlx::query_as::<_, Member>(
            "SELECT * FROM member WHERE id = $1 AND pool_id = $2 AND ($3::text IS NULL OR project_id = $3) FOR UPDATE",
        )
        .bind(id)
        .bind(pool_id)
        .bind(self.tenant.project())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }

    async fn ensure_datacenter_visible(&mut self, datacenter_id: Option<DatacenterId>) -> Result<()> {
        let Some(datacenter_id) = datacenter_id else {
            return Ok(());
        };
        let missing = missing_datacenters(&mut *self.db, &self.tenant, &[datacenter_id]).await?;
        if !missing.is_empty() {
            return Err(DbError::MissingReferences {
                entity_type: "Datacenter".to_string(),
                ids: missing,
            });
        }
        Ok(())
    }

    async fn cascade(&mut self, pool_id: PoolId) -> Result<Vec<uuid::Uuid>> {
        let outcome = CascadeUpdater::new(&mut *self.db)
            .apply(&cascade::plan(&Change::Member { pool_id }))
            .await?;
        Ok(outcome.domains)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Members<'c> {
    type CreateRequest = MemberCreateDBRequest;
    type UpdateRequest = MemberUpdateDBRequest;
    type Response = MemberDBResponse;
    type Id = (PoolId, MemberId);
    type Filter = MemberFilter;

    #[instrument(skip(self, request), fields(pool_id = %abbrev_uuid(&request.pool_id), address = %request.address, port = request.port), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Written<Self::Response>> {
        self.lock_pool(request.pool_id).await?;
        CascadeUpdater::new(&mut *self.db)
            .ensure_pool_mutable(request.pool_id)
            .await?;
        self.ensure_datacenter_visible(request.datacenter_id).await?;

        let member = sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO member (project_id, pool_id, datacenter_id, name, address, port, admin_state_up, provisioning_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&request.project_id)
        .bind(request.pool_id)
        .bind(request.datacenter_id)
        .bind(&request.name)
        .bind(request.address.to_string())
        .bind(i32::from(request.port))
        .bind(request.admin_state_up)
        .bind(EntityKind::Member.initial_status().as_str())
        .fetch_one(&mut *self.db)
        .await?;

        let domains = self.cascade(request.pool_id).await?;
        Ok(Written::new(member.try_into()?, domains))
    }

    #[instrument(skip(self), fields(pool_id = %abbrev_uuid(&id.0), member_id = %abbrev_uuid(&id.1)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let (pool_id, member_id) = id;
        let member = sqlx::query_as::<_, Member>(
            "SELECT * FROM member WHERE id = $1 AND pool_id = $2 AND ($3::text IS NULL OR project_id = $3)",
        )
        .bind(member_id)
        .bind(pool_id)
        .bind(self.tenant.project())
        .fetch_optional(&mut *self.db)
        .await?;

        match member {
            Some(m) => Ok(Some(m.try_into()?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(pool_id = %abbrev_uuid(&filter.pool_id)), err(level = "debug"))]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Page<Self::Response>> {
        self.ensure_pool_visible(filter.pool_id).await?;

        let mut query = filter.query.clone().with_filter(Filter::eq_uuid("pool_id", filter.pool_id));
        if let Some(scope) = owned_by(&self.tenant) {
            query = query.with_filter(scope);
        }
        let page = query.fetch::<Member>(&mut *self.db).await?;
        Ok(page.try_map(MemberDBResponse::try_from)?)
    }

    #[instrument(skip(self, request), fields(pool_id = %abbrev_uuid(&id.0), member_id = %abbrev_uuid(&id.1)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Written<Self::Response>> {
        let (pool_id, member_id) = id;
        let current = self.lock(pool_id, member_id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let next =
            state::on_user_update(EntityKind::Member, status).map_err(|e| DbError::illegal_transition(member_id, e))?;

        CascadeUpdater::new(&mut *self.db).ensure_pool_mutable(pool_id).await?;
        self.ensure_datacenter_visible(request.datacenter_id.flatten()).await?;

        let member = sqlx::query_as::<_, Member>(
            r#"
            UPDATE member SET
                name = COALESCE($2, name),
                address = COALESCE($3, address),
                port = COALESCE($4, port),
                datacenter_id = CASE WHEN $5 THEN $6 ELSE datacenter_id END,
                admin_state_up = COALESCE($7, admin_state_up),
                provisioning_status = $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(member_id)
        .bind(request.name.as_deref())
        .bind(request.address.map(|a| a.to_string()))
        .bind(request.port.map(i32::from))
        .bind(request.datacenter_id.is_some())
        .bind(request.datacenter_id.flatten())
        .bind(request.admin_state_up)
        .bind(next.as_str())
        .fetch_one(&mut *self.db)
        .await?;

        let domains = self.cascade(pool_id).await?;
        Ok(Written::new(member.try_into()?, domains))
    }

    #[instrument(skip(self), fields(pool_id = %abbrev_uuid(&id.0), member_id = %abbrev_uuid(&id.1)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<Written<Option<Self::Response>>> {
        let (pool_id, member_id) = id;
        let current = self.lock(pool_id, member_id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let transition =
            state::on_user_delete(EntityKind::Member, status).map_err(|e| DbError::illegal_transition(member_id, e))?;

        CascadeUpdater::new(&mut *self.db).ensure_pool_mutable(pool_id).await?;

        let member = match transition {
            Transition::Set(next) => {
                let member = sqlx::query_as::<_, Member>(
                    "UPDATE member SET provisioning_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
                )
                .bind(member_id)
                .bind(next.as_str())
                .fetch_one(&mut *self.db)
                .await?;
                Some(member.try_into()?)
            }
            Transition::Remove => {
                sqlx::query("DELETE FROM member WHERE id = $1")
                    .bind(member_id)
                    .execute(&mut *self.db)
                    .await?;
                None
            }
        };

        let domains = self.cascade(pool_id).await?;
        Ok(Written::new(member, domains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{PageRequest, PaginationSettings};
    use crate::test_utils::{
        attach, create_datacenter, create_domain, create_member, create_pool, set_status, status_of,
    };
    use crate::types::Scope;
    use sqlx::PgPool;

    fn tenant() -> Tenant {
        Tenant::Project("project-a".to_string())
    }

    fn member_request(pool_id: PoolId, port: u16) -> MemberCreateDBRequest {
        MemberCreateDBRequest {
            project_id: "project-a".to_string(),
            pool_id,
            name: format!("member-{port}"),
            address: "192.0.2.10".parse().unwrap(),
            port,
            datacenter_id: None,
            admin_state_up: true,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_marks_pool_pending_update(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;

        let written = Members::new(&mut conn, tenant())
            .create(&member_request(pool_id, 80))
            .await
            .unwrap();

        assert_eq!(written.entity.provisioning_status, ProvisioningStatus::PendingCreate);
        assert_eq!(written.entity.address.to_string(), "192.0.2.10");
        assert_eq!(status_of(&mut conn, "pool", pool_id).await, "PENDING_UPDATE");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_cascades_update_not_delete(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let domain_id = create_domain(&mut conn, "project-a", "www.example.com").await;
        attach(&mut conn, domain_id, pool_id).await;
        set_status(&mut conn, "domain", domain_id, "ACTIVE").await;
        let member = Members::new(&mut conn, tenant())
            .create(&member_request(pool_id, 80))
            .await
            .unwrap()
            .entity;
        set_status(&mut conn, "domain", domain_id, "ACTIVE").await;
        set_status(&mut conn, "pool", pool_id, "ACTIVE").await;
        set_status(&mut conn, "member", member.id, "ACTIVE").await;

        let mut tx = pool.begin().await.unwrap();
        let written = Members::new(&mut tx, tenant()).delete((pool_id, member.id)).await.unwrap();
        tx.commit().await.unwrap();

        let deleted = written.entity.unwrap();
        assert_eq!(deleted.provisioning_status, ProvisioningStatus::PendingDelete);
        assert_eq!(written.domains, vec![domain_id]);
        assert_eq!(status_of(&mut conn, "pool", pool_id).await, "PENDING_UPDATE");
        assert_eq!(status_of(&mut conn, "domain", domain_id).await, "PENDING_UPDATE");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_cascade_skips_deleting_domain(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let domain_id = create_domain(&mut conn, "project-a", "www.example.com").await;
        attach(&mut conn, domain_id, pool_id).await;
        set_status(&mut conn, "domain", domain_id, "ACTIVE").await;

        let mut tx = pool.begin().await.unwrap();
        Members::new(&mut tx, tenant()).create(&member_request(pool_id, 80)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(status_of(&mut conn, "domain", domain_id).await, "PENDING_UPDATE");

        // A deleting domain blocks pool mutations, but must never be resurrected by a cascade
        set_status(&mut conn, "domain", domain_id, "PENDING_DELETE").await;
        let outcome = CascadeUpdater::new(&mut conn)
            .apply(&cascade::plan(&Change::Member { pool_id }))
            .await
            .unwrap();
        assert!(outcome.domains.is_empty());
        assert_eq!(status_of(&mut conn, "domain", domain_id).await, "PENDING_DELETE");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failed_cascade_rolls_back_member(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let domain_id = create_domain(&mut conn, "project-a", "www.example.com").await;
        attach(&mut conn, domain_id, pool_id).await;

        // Domain still PENDING_CREATE: the pool guard rejects the whole unit
        let mut tx = pool.begin().await.unwrap();
        let result = Members::new(&mut tx, tenant()).create(&member_request(pool_id, 80)).await;
        assert!(matches!(result, Err(DbError::Conflict { .. })));
        tx.rollback().await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM member")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(status_of(&mut conn, "pool", pool_id).await, "PENDING_CREATE");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_endpoint_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let mut repo = Members::new(&mut conn, tenant());
        repo.create(&member_request(pool_id, 443)).await.unwrap();

        match repo.create(&member_request(pool_id, 443)).await {
            Err(DbError::UniqueViolation { table, .. }) => assert_eq!(table.as_deref(), Some("member")),
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_private_datacenter_of_other_project_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let foreign = create_datacenter(&mut conn, "project-b", Scope::Private).await;
        let public = create_datacenter(&mut conn, "project-b", Scope::Public).await;

        let mut repo = Members::new(&mut conn, tenant());
        let mut request = member_request(pool_id, 80);
        request.datacenter_id = Some(foreign);
        assert!(matches!(
            repo.create(&request).await,
            Err(DbError::MissingReferences { .. })
        ));

        request.datacenter_id = Some(public);
        let member = repo.create(&request).await.unwrap().entity;
        assert_eq!(member.datacenter_id, Some(public));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_can_clear_datacenter(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let datacenter = create_datacenter(&mut conn, "project-a", Scope::Private).await;
        let mut repo = Members::new(&mut conn, tenant());
        let mut request = member_request(pool_id, 80);
        request.datacenter_id = Some(datacenter);
        let member = repo.create(&request).await.unwrap().entity;

        let updated = repo
            .update(
                (pool_id, member.id),
                &MemberUpdateDBRequest {
                    port: Some(8080),
                    datacenter_id: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .entity;
        assert_eq!(updated.port, 8080);
        assert_eq!(updated.datacenter_id, None);
        assert_eq!(updated.provisioning_status, ProvisioningStatus::PendingUpdate);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_member_is_addressed_through_its_pool(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let other_pool = create_pool(&mut conn, "project-a").await;
        let mut repo = Members::new(&mut conn, tenant());
        let member = repo.create(&member_request(pool_id, 80)).await.unwrap().entity;

        assert!(repo.get_by_id((other_pool, member.id)).await.unwrap().is_none());
        assert!(matches!(repo.delete((other_pool, member.id)).await, Err(DbError::NotFound)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_requires_visible_pool(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mine = create_pool(&mut conn, "project-a").await;
        let theirs = create_pool(&mut conn, "project-b").await;
        create_member(&mut conn, "project-a", mine, 80).await;
        create_member(&mut conn, "project-b", theirs, 80).await;

        let filter = |pool_id| MemberFilter {
            pool_id,
            query: KeysetQuery::new::<MemberDBResponse>(&PageRequest::default(), &PaginationSettings::default(), vec![])
                .unwrap(),
        };

        let page = Members::new(&mut conn, tenant()).list(&filter(mine)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].pool_id, mine);

        let hidden = Members::new(&mut conn, tenant()).list(&filter(theirs)).await;
        assert!(matches!(hidden, Err(DbError::NotFound)));

        let unknown = Members::new(&mut conn, tenant()).list(&filter(uuid::Uuid::new_v4())).await;
        assert!(matches!(unknown, Err(DbError::NotFound)));
    }
}
