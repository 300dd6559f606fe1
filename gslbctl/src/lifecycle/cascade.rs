//! Cascade of "needs re-sync" markers up the entity graph.
//!
//! The graph has a fixed depth: members and monitors belong to a pool, pools are attached to
//! domains. When something below a domain changes, every ancestor has to be re-applied by the
//! agents, so ancestors move to `PENDING_UPDATE`. Ancestors never move to `PENDING_DELETE`, not even
//! when the change was a child delete, and rows already on their way out are left alone.
//!
//! Planning ([`plan`]) is pure and knows nothing about storage. [`CascadeUpdater`] applies a plan
//! with plain `UPDATE ... WHERE` statements on the caller's connection, so the cascade commits or
//! rolls back together with the change that caused it.

use crate::db::errors::{DbError, Result};
use crate::lifecycle::state::ProvisioningStatus;
use crate::types::{DomainId, PoolId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// A relation-level change that may require ancestors to re-sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A member was created, updated or deleted
    Member { pool_id: PoolId },
    /// A monitor was created, updated or deleted
    Monitor { pool_id: PoolId },
    /// A pool itself was updated
    Pool { pool_id: PoolId },
    /// Pools were attached to or detached from a domain
    Attachment {
        domain_id: DomainId,
        attached: Vec<PoolId>,
        detached: Vec<PoolId>,
    },
}

/// Ancestors that need to move to `PENDING_UPDATE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadePlan {
    /// Pools to mark directly
    pub pools: BTreeSet<PoolId>,
    /// Pools whose attached domains are to be marked
    pub domains_of_pools: BTreeSet<PoolId>,
    /// Domains to mark directly
    pub domains: BTreeSet<DomainId>,
}

impl CascadePlan {
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty() && self.domains_of_pools.is_empty() && self.domains.is_empty()
    }

    /// Union of two plans, for requests that touch several relations.
    pub fn merge(mut self, other: CascadePlan) -> Self {
        self.pools.extend(other.pools);
        self.domains_of_pools.extend(other.domains_of_pools);
        self.domains.extend(other.domains);
        self
    }
}

/// Work out which ancestors a change affects.
pub fn plan(change: &Change) -> CascadePlan {
    let mut plan = CascadePlan::default();
    match change {
        Change::Member { pool_id } | Change::Monitor { pool_id } => {
            plan.pools.insert(*pool_id);
            plan.domains_of_pools.insert(*pool_id);
        }
        Change::Pool { pool_id } => {
            plan.domains_of_pools.insert(*pool_id);
        }
        Change::Attachment {
            domain_id,
            attached,
            detached,
        } => {
            // The pools themselves are untouched by a relation change
            if !attached.is_empty() || !detached.is_empty() {
                plan.domains.insert(*domain_id);
            }
        }
    }
    plan
}

/// Domains and pools actually moved by an applied plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub pools: Vec<PoolId>,
    pub domains: Vec<DomainId>,
}

/// Applies cascade plans and guards pool mutations within a transaction.
pub struct CascadeUpdater<'c> {
    db: &'c mut PgConnection,
}

impl<'c> CascadeUpdater<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Mark every ancestor in `plan` as `PENDING_UPDATE`.
    ///
    /// Rows in `PENDING_DELETE` or `DELETED` are skipped. Re-applying a plan leaves already pending
    /// rows pending, so concurrent cascades converge.
    #[instrument(skip(self, plan), fields(pools = plan.pools.len(), domains = plan.domains.len()), err)]
    pub async fn apply(&mut self, plan: &CascadePlan) -> Result<CascadeOutcome> {
        let mut outcome = CascadeOutcome::default();
        if plan.is_empty() {
            return Ok(outcome);
        }

        let pending = ProvisioningStatus::PendingUpdate.as_str();

        if !plan.pools.is_empty() {
            let pool_ids: Vec<PoolId> = plan.pools.iter().copied().collect();
            outcome.pools = sqlx::query_scalar(
                r#"
                UPDATE pool SET provisioning_status = $2, updated_at = NOW()
                WHERE id = ANY($1) AND provisioning_status NOT IN ('PENDING_DELETE', 'DELETED')
                RETURNING id
                "#,
            )
            .bind(&pool_ids)
            .bind(pending)
            .fetch_all(&mut *self.db)
            .await?;
        }

        let mut domain_ids: Vec<DomainId> = plan.domains.iter().copied().collect();
        if !plan.domains_of_pools.is_empty() {
            let pool_ids: Vec<PoolId> = plan.domains_of_pools.iter().copied().collect();
            let attached: Vec<DomainId> =
                sqlx::query_scalar("SELECT DISTINCT domain_id FROM domain_pool_relation WHERE pool_id = ANY($1)")
                    .bind(&pool_ids)
                    .fetch_all(&mut *self.db)
                    .await?;
            domain_ids.extend(attached);
        }
        domain_ids.sort_unstable();
        domain_ids.dedup();

        if !domain_ids.is_empty() {
            outcome.domains = sqlx::query_scalar(
                r#"
                UPDATE domain SET provisioning_status = $2, updated_at = NOW()
                WHERE id = ANY($1) AND provisioning_status NOT IN ('PENDING_DELETE', 'DELETED')
                RETURNING id
                "#,
            )
            .bind(&domain_ids)
            .bind(pending)
            .fetch_all(&mut *self.db)
            .await?;
        }

        debug!(pools = ?outcome.pools, domains = ?outcome.domains, "Cascade applied");
        Ok(outcome)
    }

    /// Refuse a pool mutation while any attached domain is not `ACTIVE`.
    ///
    /// The attachment rows are locked until the transaction ends, so an attachment cannot appear
    /// or change between this check and the write that follows it.
    #[instrument(skip(self), fields(pool_id = %abbrev_uuid(&pool_id)), err)]
    pub async fn ensure_pool_mutable(&mut self, pool_id: PoolId) -> Result<()> {
        let statuses = self.lock_attached_domain_statuses(pool_id).await?;
        let pending = statuses.iter().filter(|s| s.as_str() != ProvisioningStatus::Active.as_str()).count();
        if pending > 0 {
            return Err(DbError::Conflict {
                entity_type: "Pool".to_string(),
                entity_id: pool_id.to_string(),
                reason: format!("{pending} attached domain(s) are not ACTIVE"),
            });
        }
        Ok(())
    }

    /// Refuse a pool delete while the pool is attached to any domain.
    #[instrument(skip(self), fields(pool_id = %abbrev_uuid(&pool_id)), err)]
    pub async fn ensure_pool_detached(&mut self, pool_id: PoolId) -> Result<()> {
        let statuses = self.lock_attached_domain_statuses(pool_id).await?;
        if statuses.iter().any(|s| s.as_str() != ProvisioningStatus::Active.as_str()) {
            return Err(DbError::Conflict {
                entity_type: "Pool".to_string(),
                entity_id: pool_id.to_string(),
                reason: "attached domain(s) are not ACTIVE".to_string(),
            });
        }
        if !statuses.is_empty() {
            return Err(DbError::Conflict {
                entity_type: "Pool".to_string(),
                entity_id: pool_id.to_string(),
                reason: format!("still attached to {} domain(s)", statuses.len()),
            });
        }
        Ok(())
    }

    async fn lock_attached_domain_statuses(&mut self, pool_id: PoolId) -> Result<Vec<String>> {
        let statuses: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT d.provisioning_status
            FROM domain_pool_relation r
            JOIN domain d ON d.id = r.domain_id
            WHERE r.pool_id = $1
            FOR UPDATE OF r
            "#,
        )
        .bind(pool_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{attach, create_domain, create_pool, set_status, status_of};
    use sqlx::PgPool;
    use uuid::Uuid;

    /// An active pool with one active and one deleting domain attached.
    async fn attached_pool(pool: &PgPool) -> (PoolId, DomainId, DomainId) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let live = create_domain(&mut conn, "project-a", "www.example.com").await;
        let deleting = create_domain(&mut conn, "project-a", "old.example.com").await;
        attach(&mut conn, live, pool_id).await;
        attach(&mut conn, deleting, pool_id).await;
        set_status(&mut conn, "pool", pool_id, "ACTIVE").await;
        set_status(&mut conn, "domain", live, "ACTIVE").await;
        set_status(&mut conn, "domain", deleting, "PENDING_DELETE").await;
        (pool_id, live, deleting)
    }

    async fn assert_converged(pool: &PgPool, pool_id: PoolId, live: DomainId, deleting: DomainId) {
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(status_of(&mut conn, "pool", pool_id).await, "PENDING_UPDATE");
        assert_eq!(status_of(&mut conn, "domain", live).await, "PENDING_UPDATE");
        assert_eq!(status_of(&mut conn, "domain", deleting).await, "PENDING_DELETE");
    }

    #[test]
    fn test_member_and_monitor_changes_reach_pool_and_domains() {
        let pool_id = Uuid::new_v4();
        for change in [Change::Member { pool_id }, Change::Monitor { pool_id }] {
            let plan = plan(&change);
            assert_eq!(plan.pools, BTreeSet::from([pool_id]));
            assert_eq!(plan.domains_of_pools, BTreeSet::from([pool_id]));
            assert!(plan.domains.is_empty());
        }
    }

    #[test]
    fn test_pool_change_reaches_only_domains() {
        let pool_id = Uuid::new_v4();
        let plan = plan(&Change::Pool { pool_id });
        assert!(plan.pools.is_empty());
        assert_eq!(plan.domains_of_pools, BTreeSet::from([pool_id]));
    }

    #[test]
    fn test_attachment_change_marks_domain_not_pools() {
        let domain_id = Uuid::new_v4();
        let plan = plan(&Change::Attachment {
            domain_id,
            attached: vec![Uuid::new_v4()],
            detached: vec![],
        });
        assert!(plan.pools.is_empty());
        assert!(plan.domains_of_pools.is_empty());
        assert_eq!(plan.domains, BTreeSet::from([domain_id]));

        let unchanged = super::plan(&Change::Attachment {
            domain_id,
            attached: vec![],
            detached: vec![],
        });
        assert!(unchanged.is_empty());
    }

    #[test]
    fn test_plans_merge() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = plan(&Change::Member { pool_id: a }).merge(plan(&Change::Pool { pool_id: b }));
        assert_eq!(merged.pools, BTreeSet::from([a]));
        assert_eq!(merged.domains_of_pools, BTreeSet::from([a, b]));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_repeated_cascade_is_idempotent(pool: PgPool) {
        let (pool_id, live, deleting) = attached_pool(&pool).await;
        let plan = plan(&Change::Member { pool_id });

        let mut tx = pool.begin().await.unwrap();
        let first = CascadeUpdater::new(&mut tx).apply(&plan).await.unwrap();
        let second = CascadeUpdater::new(&mut tx).apply(&plan).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.pools, vec![pool_id]);
        assert_eq!(first.domains, vec![live]);
        assert_converged(&pool, pool_id, live, deleting).await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_cascades_converge(pool: PgPool) {
        let (pool_id, live, deleting) = attached_pool(&pool).await;
        let plan = plan(&Change::Member { pool_id });

        let run = || async {
            let mut tx = pool.begin().await?;
            let outcome = CascadeUpdater::new(&mut tx).apply(&plan).await?;
            tx.commit().await?;
            Ok::<_, DbError>(outcome)
        };
        let (a, b) = tokio::join!(run(), run());

        for outcome in [a.unwrap(), b.unwrap()] {
            assert_eq!(outcome.domains, vec![live]);
        }
        assert_converged(&pool, pool_id, live, deleting).await;
    }
}
