//! Database repository for geographic maps and their country assignments.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::datacenters::missing_datacenters;
use crate::db::handlers::repository::{Repository, Written};
use crate::db::handlers::visible_to;
use crate::db::models::geomaps::{Assignment, GeoMapCreateDBRequest, GeoMapDBResponse, GeoMapUpdateDBRequest};
use crate::lifecycle::state::{self, EntityKind, ProvisioningStatus, Transition};
use crate::pagination::{KeysetQuery, Keyed, Page};
use crate::types::{DatacenterId, GeoMapId, ProjectId, Tenant, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

/// Filter for listing geographic maps
#[derive(Debug, Clone)]
pub struct GeoMapFilter {
    pub query: KeysetQuery,
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct GeoMap {
    pub id: GeoMapId,
    pub project_id: ProjectId,
    pub name: String,
    pub scope: String,
    pub provider: String,
    pub default_datacenter: DatacenterId,
    pub provisioning_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for GeoMap {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

impl GeoMap {
    fn into_response(self, assignments: Vec<Assignment>) -> anyhow::Result<GeoMapDBResponse> {
        Ok(GeoMapDBResponse {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            scope: self.scope.parse()?,
            provider: self.provider.parse()?,
            default_datacenter: self.default_datacenter,
            assignments,
            provisioning_status: self.provisioning_status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct GeoMaps<'c> {
    db: &'c mut PgConnection,
    tenant: Tenant,
}

impl<'c> GeoMaps<'c> {
    pub fn new(db: &'c mut PgConnection, tenant: Tenant) -> Self {
        Self { db, tenant }
    }

    async fn lock(&mut self, id: GeoMapId) -> Result<GeoMap> {
        sqlx::query_as::<_, GeoMap>(
            "SELECT * FROM geographic_map WHERE id = $1 AND ($2::text IS NULL OR project_id = $2) FOR UPDATE",
        )
        .bind(id)
        .bind(self.tenant.project())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }

    async fn assignments(&mut self, ids: &[GeoMapId]) -> Result<HashMap<GeoMapId, Vec<Assignment>>> {
        let mut result: HashMap<GeoMapId, Vec<Assignment>> = HashMap::new();
        if ids.is_empty() {
            return Ok(result);
        }

        let rows: Vec<(GeoMapId, String, DatacenterId)> = sqlx::query_as(
            r#"
            SELECT geographic_map_id, country, datacenter FROM geographic_map_assignment
            WHERE geographic_map_id = ANY($1)
            ORDER BY geographic_map_id, country
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.db)
        .await?;

        for (map_id, country, datacenter) in rows {
            result.entry(map_id).or_default().push(Assignment { country, datacenter });
        }
        Ok(result)
    }

    async fn with_assignments(&mut self, map: GeoMap) -> Result<GeoMapDBResponse> {
        let assignments = self.assignments(&[map.id]).await?.remove(&map.id).unwrap_or_default();
        Ok(map.into_response(assignments)?)
    }

    async fn ensure_datacenters_visible(&mut self, ids: &[DatacenterId]) -> Result<()> {
        let missing = missing_datacenters(&mut *self.db, &self.tenant, ids).await?;
        if !missing.is_empty() {
            return Err(DbError::MissingReferences {
                entity_type: "Datacenter".to_string(),
                ids: missing,
            });
        }
        Ok(())
    }

    async fn replace_assignments(&mut self, id: GeoMapId, assignments: &[Assignment]) -> Result<()> {
        sqlx::query("DELETE FROM geographic_map_assignment WHERE geographic_map_id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        if assignments.is_empty() {
            return Ok(());
        }

        let countries: Vec<String> = assignments.iter().map(|a| a.country.clone()).collect();
        let datacenters: Vec<DatacenterId> = assignments.iter().map(|a| a.datacenter).collect();
        sqlx::query(
            r#"
            INSERT INTO geographic_map_assignment (geographic_map_id, country, datacenter)
            SELECT $1, country, datacenter FROM unnest($2::text[], $3::uuid[]) AS t (country, datacenter)
            "#,
        )
        .bind(id)
        .bind(&countries)
        .bind(&datacenters)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for GeoMaps<'c> {
    type CreateRequest = GeoMapCreateDBRequest;
    type UpdateRequest = GeoMapUpdateDBRequest;
    type Response = GeoMapDBResponse;
    type Id = GeoMapId;
    type Filter = GeoMapFilter;

    #[instrument(skip(self, request), fields(name = %request.name, assignments = request.assignments.len()), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Written<Self::Response>> {
        self.ensure_datacenters_visible(&request.referenced_datacenters()).await?;

        let map = sqlx::query_as::<_, GeoMap>(
            r#"
            INSERT INTO geographic_map (project_id, name, scope, provider, default_datacenter, provisioning_status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&request.project_id)
        .bind(&request.name)
        .bind(request.scope.as_str())
        .bind(request.provider.as_str())
        .bind(request.default_datacenter)
        .bind(EntityKind::GeoMap.initial_status().as_str())
        .fetch_one(&mut *self.db)
        .await?;

        self.replace_assignments(map.id, &request.assignments).await?;
        Ok(Written::new(self.with_assignments(map).await?, Vec::new()))
    }

    #[instrument(skip(self), fields(geomap_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let map = sqlx::query_as::<_, GeoMap>(
            "SELECT * FROM geographic_map WHERE id = $1 AND ($2::text IS NULL OR project_id = $2 OR scope = 'public')",
        )
        .bind(id)
        .bind(self.tenant.project())
        .fetch_optional(&mut *self.db)
        .await?;

        match map {
            Some(m) => Ok(Some(self.with_assignments(m).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), err(level = "debug"))]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Page<Self::Response>> {
        let mut query = filter.query.clone();
        if let Some(scope) = visible_to(&self.tenant) {
            query = query.with_filter(scope);
        }
        let page = query.fetch::<GeoMap>(&mut *self.db).await?;
        let ids: Vec<GeoMapId> = page.items.iter().map(|m| m.id).collect();
        let mut assignments = self.assignments(&ids).await?;

        Ok(page.try_map(|map| {
            let rows = assignments.remove(&map.id).unwrap_or_default();
            map.into_response(rows)
        })?)
    }

    #[instrument(skip(self, request), fields(geomap_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Written<Self::Response>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let next = state::on_user_update(EntityKind::GeoMap, status).map_err(|e| DbError::illegal_transition(id, e))?;

        let mut referenced: Vec<DatacenterId> = request.default_datacenter.into_iter().collect();
        if let Some(assignments) = &request.assignments {
            referenced.extend(assignments.iter().map(|a| a.datacenter));
        }
        referenced.sort_unstable();
        referenced.dedup();
        self.ensure_datacenters_visible(&referenced).await?;

        if let Some(assignments) = &request.assignments {
            self.replace_assignments(id, assignments).await?;
        }

        let map = sqlx::query_as::<_, GeoMap>(
            r#"
            UPDATE geographic_map SET
                name = COALESCE($2, name),
                scope = COALESCE($3, scope),
                default_datacenter = COALESCE($4, default_datacenter),
                provisioning_status = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.name.as_deref())
        .bind(request.scope.map(|s| s.as_str()))
        .bind(request.default_datacenter)
        .bind(next.as_str())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(Written::new(self.with_assignments(map).await?, Vec::new()))
    }

    #[instrument(skip(self), fields(geomap_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<Written<Option<Self::Response>>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let transition =
            state::on_user_delete(EntityKind::GeoMap, status).map_err(|e| DbError::illegal_transition(id, e))?;

        match transition {
            Transition::Set(next) => {
                let map = sqlx::query_as::<_, GeoMap>(
                    "UPDATE geographic_map SET provisioning_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
                )
                .bind(id)
                .bind(next.as_str())
                .fetch_one(&mut *self.db)
                .await?;
                Ok(Written::new(Some(self.with_assignments(map).await?), Vec::new()))
            }
            Transition::Remove => {
                sqlx::query("DELETE FROM geographic_map WHERE id = $1")
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
    use crate::test_utils::create_datacenter;
    use crate::types::{Provider, Scope};
    use sqlx::PgPool;

    fn tenant() -> Tenant {
        Tenant::Project("project-a".to_string())
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_replace_assignments(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let fra = create_datacenter(&mut conn, "project-a", Scope::Private).await;
        let iad = create_datacenter(&mut conn, "project-a", Scope::Private).await;

        let mut repo = GeoMaps::new(&mut conn, tenant());
        let map = repo
            .create(&GeoMapCreateDBRequest {
                project_id: "project-a".to_string(),
                name: "eu-us".to_string(),
                scope: Scope::Private,
                provider: Provider::Akamai,
                default_datacenter: iad,
                assignments: vec![
                    Assignment {
                        country: "DE".to_string(),
                        datacenter: fra,
                    },
                    Assignment {
                        country: "US".to_string(),
                        datacenter: iad,
                    },
                ],
            })
            .await
            .unwrap()
            .entity;
        assert_eq!(map.assignments.len(), 2);
        assert_eq!(map.assignments[0].country, "DE");

        let updated = repo
            .update(
                map.id,
                &GeoMapUpdateDBRequest {
                    assignments: Some(vec![Assignment {
                        country: "FR".to_string(),
                        datacenter: fra,
                    }]),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .entity;
        assert_eq!(
            updated.assignments,
            vec![Assignment {
                country: "FR".to_string(),
                datacenter: fra
            }]
        );
        assert_eq!(updated.provisioning_status, ProvisioningStatus::PendingUpdate);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invisible_datacenter_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let foreign = create_datacenter(&mut conn, "project-b", Scope::Private).await;

        let result = GeoMaps::new(&mut conn, tenant())
            .create(&GeoMapCreateDBRequest {
                project_id: "project-a".to_string(),
                name: "map".to_string(),
                scope: Scope::Private,
                provider: Provider::Akamai,
                default_datacenter: foreign,
                assignments: vec![],
            })
            .await;
        assert!(matches!(result, Err(DbError::MissingReferences { .. })));
    }
}
