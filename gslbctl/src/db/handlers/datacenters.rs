//! Database repository for datacenters.
//!
//! Public datacenters are readable (and referenceable from members and geographic maps) by every
//! project, but only the owning project may change or delete them.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::{Repository, Written};
use crate::db::handlers::visible_to;
use crate::db::models::datacenters::{DatacenterCreateDBRequest, DatacenterDBResponse, DatacenterUpdateDBRequest};
use crate::lifecycle::state::{self, EntityKind, ProvisioningStatus, Transition};
use crate::pagination::{KeysetQuery, Keyed, Page};
use crate::types::{DatacenterId, ProjectId, Tenant, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Filter for listing datacenters
#[derive(Debug, Clone)]
pub struct DatacenterFilter {
    pub query: KeysetQuery,
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Datacenter {
    pub id: DatacenterId,
    pub project_id: ProjectId,
    pub name: String,
    pub admin_state_up: bool,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub state_or_province: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub scope: String,
    pub provider: String,
    pub provisioning_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for Datacenter {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

impl TryFrom<Datacenter> for DatacenterDBResponse {
    type Error = anyhow::Error;

    fn try_from(src: Datacenter) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: src.id,
            project_id: src.project_id,
            name: src.name,
            admin_state_up: src.admin_state_up,
            continent: src.continent,
            country: src.country,
            state_or_province: src.state_or_province,
            city: src.city,
            latitude: src.latitude,
            longitude: src.longitude,
            scope: src.scope.parse()?,
            provider: src.provider.parse()?,
            provisioning_status: src.provisioning_status.parse()?,
            created_at: src.created_at,
            updated_at: src.updated_at,
        })
    }
}

/// Datacenters among `ids` that the tenant cannot reference: absent, private to another project,
/// or already being deleted.
pub(crate) async fn missing_datacenters(
    db: &mut PgConnection,
    tenant: &Tenant,
    ids: &[DatacenterId],
) -> Result<Vec<DatacenterId>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let found: Vec<DatacenterId> = sqlx::query_scalar(
        r#"
        SELECT id FROM datacenter
        WHERE id = ANY($1)
          AND provisioning_status <> 'PENDING_DELETE'
          AND ($2::text IS NULL OR project_id = $2 OR scope = 'public')
        FOR SHARE
        "#,
    )
    .bind(ids)
    .bind(tenant.project())
    .fetch_all(&mut *db)
    .await?;

    Ok(ids.iter().filter(|id| !found.contains(id)).copied().collect())
}

pub struct Datacenters<'c> {
    db: &'c mut PgConnection,
    tenant: Tenant,
}

impl<'c> Datacenters<'c> {
    pub fn new(db: &'c mut PgConnection, tenant: Tenant) -> Self {
        Self { db, tenant }
    }

    /// Lock a datacenter owned by the tenant.
    async fn lock(&mut self, id: DatacenterId) -> Result<Datacenter> {
        sqlx::query_as::<_, Datacenter>(
            "SELECT * FROM datacenter WHERE id = $1 AND ($2::text IS NULL OR project_id = $2) FOR UPDATE",
        )
        .bind(id)
        .bind(self.tenant.project())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// Count the members and geographic maps still pointing at a datacenter.
    async fn references(&mut self, id: DatacenterId) -> Result<(i64, i64)> {
        let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM member WHERE datacenter_id = $1")
            .bind(id)
            .fetch_one(&mut *self.db)
            .await?;
        let maps: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT m.id) FROM geographic_map m
            LEFT JOIN geographic_map_assignment a ON a.geographic_map_id = m.id
            WHERE m.default_datacenter = $1 OR a.datacenter = $1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok((members, maps))
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Datacenters<'c> {
    type CreateRequest = DatacenterCreateDBRequest;
    type UpdateRequest = DatacenterUpdateDBRequest;
    type Response = DatacenterDBResponse;
    type Id = DatacenterId;
    type Filter = DatacenterFilter;

    #[instrument(skip(self, request), fields(project_id = %request.project_id, name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Written<Self::Response>> {
        let datacenter = sqlx::query_as::<_, Datacenter>(
            r#"
            INSERT INTO datacenter (
                project_id, name, admin_state_up, continent, country, state_or_province, city,
                latitude, longitude, scope, provider, provisioning_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&request.project_id)
        .bind(&request.name)
        .bind(request.admin_state_up)
        .bind(request.continent.as_deref())
        .bind(request.country.as_deref())
        .bind(request.state_or_province.as_deref())
        .bind(request.city.as_deref())
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(request.scope.as_str())
        .bind(request.provider.as_str())
        .bind(EntityKind::Datacenter.initial_status().as_str())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(Written::new(datacenter.try_into()?, Vec::new()))
    }

    #[instrument(skip(self), fields(datacenter_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let datacenter = sqlx::query_as::<_, Datacenter>(
            "SELECT * FROM datacenter WHERE id = $1 AND ($2::text IS NULL OR project_id = $2 OR scope = 'public')",
        )
        .bind(id)
        .bind(self.tenant.project())
        .fetch_optional(&mut *self.db)
        .await?;

        match datacenter {
            Some(d) => Ok(Some(d.try_into()?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), err(level = "debug"))]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Page<Self::Response>> {
        let mut query = filter.query.clone();
        if let Some(scope) = visible_to(&self.tenant) {
            query = query.with_filter(scope);
        }
        let page = query.fetch::<Datacenter>(&mut *self.db).await?;
        Ok(page.try_map(DatacenterDBResponse::try_from)?)
    }

    #[instrument(skip(self, request), fields(datacenter_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Written<Self::Response>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let next =
            state::on_user_update(EntityKind::Datacenter, status).map_err(|e| DbError::illegal_transition(id, e))?;

        let datacenter = sqlx::query_as::<_, Datacenter>(
            r#"
            UPDATE datacenter SET
                name = COALESCE($2, name),
                admin_state_up = COALESCE($3, admin_state_up),
                continent = CASE WHEN $4 THEN $5 ELSE continent END,
                country = CASE WHEN $6 THEN $7 ELSE country END,
                state_or_province = CASE WHEN $8 THEN $9 ELSE state_or_province END,
                city = CASE WHEN $10 THEN $11 ELSE city END,
                latitude = CASE WHEN $12 THEN $13 ELSE latitude END,
                longitude = CASE WHEN $14 THEN $15 ELSE longitude END,
                scope = COALESCE($16, scope),
                provisioning_status = $17,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.name.as_deref())
        .bind(request.admin_state_up)
        .bind(request.continent.is_some())
        .bind(request.continent.clone().flatten())
        .bind(request.country.is_some())
        .bind(request.country.clone().flatten())
        .bind(request.state_or_province.is_some())
        .bind(request.state_or_province.clone().flatten())
        .bind(request.city.is_some())
        .bind(request.city.clone().flatten())
        .bind(request.latitude.is_some())
        .bind(request.latitude.flatten())
        .bind(request.longitude.is_some())
        .bind(request.longitude.flatten())
        .bind(request.scope.map(|s| s.as_str()))
        .bind(next.as_str())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(Written::new(datacenter.try_into()?, Vec::new()))
    }

    #[instrument(skip(self), fields(datacenter_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<Written<Option<Self::Response>>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let transition =
            state::on_user_delete(EntityKind::Datacenter, status).map_err(|e| DbError::illegal_transition(id, e))?;

        let (members, maps) = self.references(id).await?;
        if members > 0 || maps > 0 {
            return Err(DbError::conflict(
                "Datacenter",
                id,
                format!("in use by {members} member(s) and {maps} geographic map(s)"),
            ));
        }

        match transition {
            Transition::Set(next) => {
                let datacenter = sqlx::query_as::<_, Datacenter>(
                    "UPDATE datacenter SET provisioning_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
                )
                .bind(id)
                .bind(next.as_str())
                .fetch_one(&mut *self.db)
                .await?;
                Ok(Written::new(Some(datacenter.try_into()?), Vec::new()))
            }
            Transition::Remove => {
                sqlx::query("DELETE FROM datacenter WHERE id = $1")
                    .bind(id)
                    .execute(&mut *self.db)
                    .await?;
                Ok(Written::new(None, Vec::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{PageRequest, PaginationSettings};
    use crate::test_utils::{create_datacenter, create_member, create_pool};
    use crate::types::{Provider, Scope};
    use sqlx::PgPool;

    fn tenant(project: &str) -> Tenant {
        Tenant::Project(project.to_string())
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_public_datacenters_are_shared_read_only(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let public = create_datacenter(&mut conn, "project-a", Scope::Public).await;
        let private = create_datacenter(&mut conn, "project-a", Scope::Private).await;

        let mut repo = Datacenters::new(&mut conn, tenant("project-b"));
        assert!(repo.get_by_id(public).await.unwrap().is_some());
        assert!(repo.get_by_id(private).await.unwrap().is_none());
        assert!(matches!(
            repo.update(public, &DatacenterUpdateDBRequest::default()).await,
            Err(DbError::NotFound)
        ));

        let query =
            KeysetQuery::new::<DatacenterDBResponse>(&PageRequest::default(), &PaginationSettings::default(), vec![])
                .unwrap();
        let page = repo.list(&DatacenterFilter { query }).await.unwrap();
        assert_eq!(page.items.iter().map(|d| d.id).collect::<Vec<_>>(), vec![public]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_datacenter_in_use_cannot_be_deleted(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let datacenter = create_datacenter(&mut conn, "project-a", Scope::Private).await;
        let pool_id = create_pool(&mut conn, "project-a").await;
        let member = create_member(&mut conn, "project-a", pool_id, 80).await;
        sqlx::query("UPDATE member SET datacenter_id = $1 WHERE id = $2")
            .bind(datacenter)
            .bind(member)
            .execute(&mut *conn)
            .await
            .unwrap();

        let result = Datacenters::new(&mut conn, tenant("project-a")).delete(datacenter).await;
        assert!(matches!(result, Err(DbError::Conflict { .. })));

        sqlx::query("DELETE FROM member").execute(&mut *conn).await.unwrap();
        let written = Datacenters::new(&mut conn, tenant("project-a")).delete(datacenter).await.unwrap();
        assert_eq!(
            written.entity.unwrap().provisioning_status,
            ProvisioningStatus::PendingDelete
        );
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_clears_optional_fields(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Datacenters::new(&mut conn, tenant("project-a"));
        let created = repo
            .create(&DatacenterCreateDBRequest {
                project_id: "project-a".to_string(),
                name: "fra".to_string(),
                admin_state_up: true,
                continent: Some("EU".to_string()),
                country: Some("DE".to_string()),
                state_or_province: None,
                city: Some("Frankfurt".to_string()),
                latitude: Some(50.11),
                longitude: Some(8.68),
                scope: Scope::Private,
                provider: Provider::Akamai,
            })
            .await
            .unwrap()
            .entity;

        let updated = repo
            .update(
                created.id,
                &DatacenterUpdateDBRequest {
                    city: Some(None),
                    name: Some("fra1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .entity;
        assert_eq!(updated.name, "fra1");
        assert_eq!(updated.city, None);
        assert_eq!(updated.country.as_deref(), Some("DE"));
        assert_eq!(updated.provisioning_status, ProvisioningStatus::PendingUpdate);
    }
}
