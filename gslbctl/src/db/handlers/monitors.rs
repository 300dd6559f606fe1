//! Database repository for health monitors.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::owned_by;
use crate::db::handlers::repository::{Repository, Written};
use crate::db::models::monitors::{MonitorCreateDBRequest, MonitorDBResponse, MonitorUpdateDBRequest};
use crate::lifecycle::cascade::{self, CascadeUpdater, Change};
use crate::lifecycle::state::{self, EntityKind, ProvisioningStatus, Transition};
use crate::pagination::{Filter, KeysetQuery, Keyed, Page};
use crate::types::{MonitorId, PoolId, ProjectId, Tenant, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Filter for listing monitors
#[derive(Debug, Clone)]
pub struct MonitorFilter {
    pub pool_id: Option<PoolId>,
    pub query: KeysetQuery,
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Monitor {
    pub id: MonitorId,
    pub project_id: ProjectId,
    pub pool_id: PoolId,
    pub name: String,
    #[sqlx(rename = "type")]
    pub monitor_type: String,
    pub interval_seconds: i32,
    pub timeout_seconds: i32,
    pub send: Option<String>,
    pub receive: Option<String>,
    pub http_method: String,
    pub domain_name: Option<String>,
    pub admin_state_up: bool,
    pub provisioning_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for Monitor {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

impl TryFrom<Monitor> for MonitorDBResponse {
    type Error = anyhow::Error;

    fn try_from(src: Monitor) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: src.id,
            project_id: src.project_id,
            pool_id: src.pool_id,
            name: src.name,
            monitor_type: src.monitor_type.parse()?,
            interval: src.interval_seconds,
            timeout: src.timeout_seconds,
            send: src.send,
            receive: src.receive,
            http_method: src.http_method,
            domain_name: src.domain_name,
            admin_state_up: src.admin_state_up,
            provisioning_status: src.provisioning_status.parse()?,
            created_at: src.created_at,
            updated_at: src.updated_at,
        })
    }
}

pub struct Monitors<'c> {
    db: &'c mut PgConnection,
    tenant: Tenant,
}

impl<'c> Monitors<'c> {
    pub fn new(db: &'c mut PgConnection, tenant: Tenant) -> Self {
        Self { db, tenant }
    }

    async fn lock(&mut self, id: MonitorId) -> Result<Monitor> {
        sqlx::query_as::<_, Monitor>(
            "SELECT * FROM monitor WHERE id = $1 AND ($2::text IS NULL OR project_id = $2) FOR UPDATE",
        )
        .bind(id)
        .bind(self.tenant.project())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }

    async fn cascade(&mut self, pool_id: PoolId) -> Result<Vec<uuid::Uuid>> {
        let outcome = CascadeUpdater::new(&mut *self.db)
            .apply(&cascade::plan(&Change::Monitor { pool_id }))
            .await?;
        Ok(outcome.domains)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Monitors<'c> {
    type CreateRequest = MonitorCreateDBRequest;
    type UpdateRequest = MonitorUpdateDBRequest;
    type Response = MonitorDBResponse;
    type Id = MonitorId;
    type Filter = MonitorFilter;

    #[instrument(skip(self, request), fields(pool_id = %abbrev_uuid(&request.pool_id), monitor_type = %request.monitor_type), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Written<Self::Response>> {
        let pool: Option<PoolId> =
            sqlx::query_scalar("SELECT id FROM pool WHERE id = $1 AND ($2::text IS NULL OR project_id = $2) FOR SHARE")
                .bind(request.pool_id)
                .bind(self.tenant.project())
                .fetch_optional(&mut *self.db)
                .await?;
        if pool.is_none() {
            return Err(DbError::MissingReferences {
                entity_type: "Pool".to_string(),
                ids: vec![request.pool_id],
            });
        }
        CascadeUpdater::new(&mut *self.db)
            .ensure_pool_mutable(request.pool_id)
            .await?;

        let monitor = sqlx::query_as::<_, Monitor>(
            r#"
            INSERT INTO monitor (
                project_id, pool_id, name, type, interval_seconds, timeout_seconds, send, receive,
                http_method, domain_name, admin_state_up, provisioning_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&request.project_id)
        .bind(request.pool_id)
        .bind(&request.name)
        .bind(request.monitor_type.as_str())
        .bind(request.interval)
        .bind(request.timeout)
        .bind(request.send.as_deref())
        .bind(request.receive.as_deref())
        .bind(&request.http_method)
        .bind(request.domain_name.as_deref())
        .bind(request.admin_state_up)
        .bind(EntityKind::Monitor.initial_status().as_str())
        .fetch_one(&mut *self.db)
        .await?;

        let domains = self.cascade(request.pool_id).await?;
        Ok(Written::new(monitor.try_into()?, domains))
    }

    #[instrument(skip(self), fields(monitor_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let monitor =
            sqlx::query_as::<_, Monitor>("SELECT * FROM monitor WHERE id = $1 AND ($2::text IS NULL OR project_id = $2)")
                .bind(id)
                .bind(self.tenant.project())
                .fetch_optional(&mut *self.db)
                .await?;

        match monitor {
            Some(m) => Ok(Some(m.try_into()?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), err(level = "debug"))]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Page<Self::Response>> {
        let mut query = filter.query.clone();
        if let Some(pool_id) = filter.pool_id {
            query = query.with_filter(Filter::eq_uuid("pool_id", pool_id));
        }
        if let Some(scope) = owned_by(&self.tenant) {
            query = query.with_filter(scope);
        }
        let page = query.fetch::<Monitor>(&mut *self.db).await?;
        Ok(page.try_map(MonitorDBResponse::try_from)?)
    }

    #[instrument(skip(self, request), fields(monitor_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Written<Self::Response>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let next = state::on_user_update(EntityKind::Monitor, status).map_err(|e| DbError::illegal_transition(id, e))?;

        CascadeUpdater::new(&mut *self.db)
            .ensure_pool_mutable(current.pool_id)
            .await?;

        let monitor = sqlx::query_as::<_, Monitor>(
            r#"
            UPDATE monitor SET
                name = COALESCE($2, name),
                type = COALESCE($3, type),
                interval_seconds = COALESCE($4, interval_seconds),
                timeout_seconds = COALESCE($5, timeout_seconds),
                send = CASE WHEN $6 THEN $7 ELSE send END,
                receive = CASE WHEN $8 THEN $9 ELSE receive END,
                http_method = COALESCE($10, http_method),
                domain_name = CASE WHEN $11 THEN $12 ELSE domain_name END,
                admin_state_up = COALESCE($13, admin_state_up),
                provisioning_status = $14,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.name.as_deref())
        .bind(request.monitor_type.map(|t| t.as_str()))
        .bind(request.interval)
        .bind(request.timeout)
        .bind(request.send.is_some())
        .bind(request.send.clone().flatten())
        .bind(request.receive.is_some())
        .bind(request.receive.clone().flatten())
        .bind(request.http_method.as_deref())
        .bind(request.domain_name.is_some())
        .bind(request.domain_name.clone().flatten())
        .bind(request.admin_state_up)
        .bind(next.as_str())
        .fetch_one(&mut *self.db)
        .await?;

        let domains = self.cascade(current.pool_id).await?;
        Ok(Written::new(monitor.try_into()?, domains))
    }

    #[instrument(skip(self), fields(monitor_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<Written<Option<Self::Response>>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let transition =
            state::on_user_delete(EntityKind::Monitor, status).map_err(|e| DbError::illegal_transition(id, e))?;

        CascadeUpdater::new(&mut *self.db)
            .ensure_pool_mutable(current.pool_id)
            .await?;

        let monitor = match transition {
            Transition::Set(next) => {
                let monitor = sqlx::query_as::<_, Monitor>(
                    "UPDATE monitor SET provisioning_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
                )
                .bind(id)
                .bind(next.as_str())
                .fetch_one(&mut *self.db)
                .await?;
                Some(monitor.try_into()?)
            }
            Transition::Remove => {
                sqlx::query("DELETE FROM monitor WHERE id = $1")
                    .bind(id)
                    .execute(&mut *self.db)
                    .await?;
                None
            }
        };

        let domains = self.cascade(current.pool_id).await?;
        Ok(Written::new(monitor, domains))
    }
}
