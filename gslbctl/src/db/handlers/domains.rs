//! Database repository for domains and their pool attachments.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::owned_by;
use crate::db::handlers::repository::{Repository, Written};
use crate::db::models::domains::{DomainCreateDBRequest, DomainDBResponse, DomainUpdateDBRequest, cname_target};
use crate::lifecycle::cascade::{self, CascadeUpdater, Change};
use crate::lifecycle::state::{self, EntityKind, ProvisioningStatus, Transition};
use crate::pagination::{Filter, KeysetQuery, Keyed, Page};
use crate::types::{DomainId, PoolId, ProjectId, Provider, Tenant, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::{BTreeSet, HashMap};
use tracing::instrument;

/// Filter for listing domains
#[derive(Debug, Clone)]
pub struct DomainFilter {
    pub query: KeysetQuery,
    pub provider: Option<Provider>,
    /// Only domains an agent still has to apply
    pub pending_only: bool,
}

impl DomainFilter {
    pub fn new(query: KeysetQuery) -> Self {
        Self {
            query,
            provider: None,
            pending_only: false,
        }
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Domain {
    pub id: DomainId,
    pub project_id: ProjectId,
    pub name: String,
    pub fqdn: String,
    pub provider: String,
    pub record_type: String,
    pub mode: String,
    pub admin_state_up: bool,
    pub cname_target: Option<String>,
    pub status: String,
    pub provisioning_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for Domain {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

impl Domain {
    fn into_response(self, pools: Vec<PoolId>) -> anyhow::Result<DomainDBResponse> {
        Ok(DomainDBResponse {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            fqdn: self.fqdn,
            provider: self.provider.parse()?,
            record_type: self.record_type.parse()?,
            mode: self.mode.parse()?,
            admin_state_up: self.admin_state_up,
            cname_target: self.cname_target,
            status: self.status,
            provisioning_status: self.provisioning_status.parse()?,
            pools,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct Domains<'c> {
    db: &'c mut PgConnection,
    tenant: Tenant,
}

impl<'c> Domains<'c> {
    pub fn new(db: &'c mut PgConnection, tenant: Tenant) -> Self {
        Self { db, tenant }
    }

    /// Lock a live domain. Rows in `DELETED` are gone as far as users are concerned.
    async fn lock(&mut self, id: DomainId) -> Result<Domain> {
        sqlx::query_as::<_, Domain>(
            r#"
            SELECT * FROM domain
            WHERE id = $1 AND ($2::text IS NULL OR project_id = $2) AND provisioning_status <> 'DELETED'
            FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(self.tenant.project())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// Pool attachments of each of the given domains.
    async fn attachments(&mut self, ids: &[DomainId]) -> Result<HashMap<DomainId, Vec<PoolId>>> {
        let mut result: HashMap<DomainId, Vec<PoolId>> = HashMap::new();
        if ids.is_empty() {
            return Ok(result);
        }

        let rows: Vec<(DomainId, PoolId)> = sqlx::query_as(
            "SELECT domain_id, pool_id FROM domain_pool_relation WHERE domain_id = ANY($1) ORDER BY domain_id, pool_id",
        )
        .bind(ids)
        .fetch_all(&mut *self.db)
        .await?;

        for (domain_id, pool_id) in rows {
            result.entry(domain_id).or_default().push(pool_id);
        }
        Ok(result)
    }

    async fn with_attachments(&mut self, domain: Domain) -> Result<DomainDBResponse> {
        let pools = self.attachments(&[domain.id]).await?.remove(&domain.id).unwrap_or_default();
        Ok(domain.into_response(pools)?)
    }

    /// Reject pools that do not exist for this tenant.
    async fn ensure_pools_visible(&mut self, pools: &BTreeSet<PoolId>) -> Result<()> {
        if pools.is_empty() {
            return Ok(());
        }
        let ids: Vec<PoolId> = pools.iter().copied().collect();
        let found: Vec<PoolId> =
            sqlx::query_scalar("SELECT id FROM pool WHERE id = ANY($1) AND ($2::text IS NULL OR project_id = $2) FOR SHARE")
                .bind(&ids)
                .bind(self.tenant.project())
                .fetch_all(&mut *self.db)
                .await?;
        let missing: Vec<PoolId> = ids.into_iter().filter(|id| !found.contains(id)).collect();
        if !missing.is_empty() {
            return Err(DbError::MissingReferences {
                entity_type: "Pool".to_string(),
                ids: missing,
            });
        }
        Ok(())
    }

    async fn attach(&mut self, domain_id: DomainId, pools: &[PoolId]) -> Result<()> {
        if pools.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO domain_pool_relation (domain_id, pool_id) SELECT $1, unnest($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(domain_id)
        .bind(pools)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    async fn detach(&mut self, domain_id: DomainId, pools: &[PoolId]) -> Result<()> {
        if pools.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM domain_pool_relation WHERE domain_id = $1 AND pool_id = ANY($2)")
            .bind(domain_id)
            .bind(pools)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Domains<'c> {
    type CreateRequest = DomainCreateDBRequest;
    type UpdateRequest = DomainUpdateDBRequest;
    type Response = DomainDBResponse;
    type Id = DomainId;
    type Filter = DomainFilter;

    #[instrument(skip(self, request), fields(fqdn = %request.fqdn, provider = %request.provider), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Written<Self::Response>> {
        let pools: BTreeSet<PoolId> = request.pools.iter().copied().collect();
        self.ensure_pools_visible(&pools).await?;

        let domain = sqlx::query_as::<_, Domain>(
            r#"
            INSERT INTO domain (
                project_id, name, fqdn, provider, record_type, mode, admin_state_up, cname_target, provisioning_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&request.project_id)
        .bind(&request.name)
        .bind(&request.fqdn)
        .bind(request.provider.as_str())
        .bind(request.record_type.as_str())
        .bind(request.mode.as_str())
        .bind(request.admin_state_up)
        .bind(cname_target(request.provider, &request.fqdn, &request.cname_suffix))
        .bind(EntityKind::Domain.initial_status().as_str())
        .fetch_one(&mut *self.db)
        .await?;

        let attached: Vec<PoolId> = pools.into_iter().collect();
        self.attach(domain.id, &attached).await?;

        let id = domain.id;
        Ok(Written::new(domain.into_response(attached)?, vec![id]))
    }

    #[instrument(skip(self), fields(domain_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let domain = sqlx::query_as::<_, Domain>(
            r#"
            SELECT * FROM domain
            WHERE id = $1 AND ($2::text IS NULL OR project_id = $2) AND provisioning_status <> 'DELETED'
            "#,
        )
        .bind(id)
        .bind(self.tenant.project())
        .fetch_optional(&mut *self.db)
        .await?;

        match domain {
            Some(d) => Ok(Some(self.with_attachments(d).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(provider = ?filter.provider, pending_only = filter.pending_only), err(level = "debug"))]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Page<Self::Response>> {
        let mut query = filter.query.clone().with_filter(Filter::NotDeleted);
        if let Some(scope) = owned_by(&self.tenant) {
            query = query.with_filter(scope);
        }
        if let Some(provider) = filter.provider {
            query = query.with_filter(Filter::eq_text("provider", provider.as_str()));
        }
        if filter.pending_only {
            query = query.with_filter(Filter::Pending);
        }

        let page = query.fetch::<Domain>(&mut *self.db).await?;
        let ids: Vec<DomainId> = page.items.iter().map(|d| d.id).collect();
        let mut attachments = self.attachments(&ids).await?;

        Ok(page.try_map(|domain| {
            let pools = attachments.remove(&domain.id).unwrap_or_default();
            domain.into_response(pools)
        })?)
    }

    #[instrument(skip(self, request), fields(domain_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Written<Self::Response>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let next = state::on_user_update(EntityKind::Domain, status).map_err(|e| DbError::illegal_transition(id, e))?;
        let provider: Provider = current.provider.parse()?;

        let fqdn = request.fqdn.clone().unwrap_or_else(|| current.fqdn.clone());
        if fqdn != current.fqdn && provider.fqdn_immutable_once_provisioned() && status != ProvisioningStatus::PendingCreate
        {
            return Err(DbError::conflict(
                "Domain",
                id,
                format!("the fqdn of a provisioned {provider} domain cannot change"),
            ));
        }

        let mut change = Change::Attachment {
            domain_id: id,
            attached: Vec::new(),
            detached: Vec::new(),
        };
        if let Some(requested) = &request.pools {
            let requested: BTreeSet<PoolId> = requested.iter().copied().collect();
            self.ensure_pools_visible(&requested).await?;

            let existing: BTreeSet<PoolId> = self
                .attachments(&[id])
                .await?
                .remove(&id)
                .unwrap_or_default()
                .into_iter()
                .collect();
            let attached: Vec<PoolId> = requested.difference(&existing).copied().collect();
            let detached: Vec<PoolId> = existing.difference(&requested).copied().collect();

            self.detach(id, &detached).await?;
            self.attach(id, &attached).await?;
            change = Change::Attachment {
                domain_id: id,
                attached,
                detached,
            };
        }

        let domain = sqlx::query_as::<_, Domain>(
            r#"
            UPDATE domain SET
                name = COALESCE($2, name),
                fqdn = $3,
                record_type = COALESCE($4, record_type),
                mode = COALESCE($5, mode),
                admin_state_up = COALESCE($6, admin_state_up),
                cname_target = $7,
                provisioning_status = $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.name.as_deref())
        .bind(&fqdn)
        .bind(request.record_type.map(|t| t.as_str()))
        .bind(request.mode.map(|m| m.as_str()))
        .bind(request.admin_state_up)
        .bind(cname_target(provider, &fqdn, &request.cname_suffix))
        .bind(next.as_str())
        .fetch_one(&mut *self.db)
        .await?;

        CascadeUpdater::new(&mut *self.db)
            .apply(&cascade::plan(&change))
            .await?;

        let response = self.with_attachments(domain).await?;
        Ok(Written::new(response, vec![id]))
    }

    #[instrument(skip(self), fields(domain_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<Written<Option<Self::Response>>> {
        let current = self.lock(id).await?;
        let status: ProvisioningStatus = current.provisioning_status.parse()?;
        let transition =
            state::on_user_delete(EntityKind::Domain, status).map_err(|e| DbError::illegal_transition(id, e))?;

        // Attachments stay until an agent confirms, it needs them to tear the domain down
        let domain = match transition {
            Transition::Set(next) => {
                let domain = sqlx::query_as::<_, Domain>(
                    "UPDATE domain SET provisioning_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
                )
                .bind(id)
                .bind(next.as_str())
                .fetch_one(&mut *self.db)
                .await?;
                Some(self.with_attachments(domain).await?)
            }
            Transition::Remove => {
                sqlx::query("DELETE FROM domain WHERE id = $1")
                    .bind(id)
                    .execute(&mut *self.db)
                    .await?;
                None
            }
        };

        Ok(Written::new(domain, vec![id]))
    }
}
