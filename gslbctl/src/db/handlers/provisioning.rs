//! Agent reports on provisioning progress.
//!
//! Agents never write entity rows directly. They report one outcome per entity they attempted to
//! apply, and each report runs through the state machine under a row lock so that a report racing
//! with a user mutation either lands before it (and is then superseded by `PENDING_UPDATE`) or is
//! refused because the row is no longer pending.

use crate::db::errors::Result;
use crate::db::models::provisioning::{AgentReportDBRequest, AgentReportDBResponse};
use crate::lifecycle::state::{self, EntityKind, ProvisioningStatus, Transition};
use crate::types::abbrev_uuid;
use sqlx::PgConnection;
use tracing::instrument;

pub struct Provisioning<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Provisioning<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Apply a single report. Refused reports are not errors: they come back with `applied: false`
    /// and the reason, so one stale item does not fail a whole batch.
    #[instrument(skip(self, report), fields(kind = ?report.kind, id = %abbrev_uuid(&report.id), outcome = ?report.outcome), err)]
    pub async fn apply_report(&mut self, report: &AgentReportDBRequest) -> Result<AgentReportDBResponse> {
        let table = report.kind.table();
        let current: Option<String> =
            sqlx::query_scalar(&format!("SELECT provisioning_status FROM {table} WHERE id = $1 FOR UPDATE"))
                .bind(report.id)
                .fetch_optional(&mut *self.db)
                .await?;

        let Some(current) = current else {
            return Ok(refused(report, None, "not found".to_string()));
        };
        let current: ProvisioningStatus = current.parse()?;

        let transition = match state::apply_agent_report(report.kind, current, report.outcome) {
            Ok(transition) => transition,
            Err(err) => {
                tracing::debug!("Refusing stale agent report: {}", err);
                return Ok(refused(report, Some(current), err.to_string()));
            }
        };

        let provisioning_status = match transition {
            Transition::Set(next) => {
                sqlx::query(&format!(
                    "UPDATE {table} SET provisioning_status = $2, updated_at = NOW() WHERE id = $1"
                ))
                .bind(report.id)
                .bind(next.as_str())
                .execute(&mut *self.db)
                .await?;

                // A confirmed domain removal drops the attachments so the pools become deletable
                if report.kind == EntityKind::Domain && next == ProvisioningStatus::Deleted {
                    sqlx::query("DELETE FROM domain_pool_relation WHERE domain_id = $1")
                        .bind(report.id)
                        .execute(&mut *self.db)
                        .await?;
                }
                Some(next)
            }
            Transition::Remove => {
                sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
                    .bind(report.id)
                    .execute(&mut *self.db)
                    .await?;
                None
            }
        };

        Ok(AgentReportDBResponse {
            kind: report.kind,
            id: report.id,
            applied: true,
            provisioning_status,
            reason: None,
        })
    }
}

fn refused(report: &AgentReportDBRequest, status: Option<ProvisioningStatus>, reason: String) -> AgentReportDBResponse {
    AgentReportDBResponse {
        kind: report.kind,
        id: report.id,
        applied: false,
        provisioning_status: status,
        reason: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state::AgentOutcome;
    use crate::test_utils::{attach, create_domain, create_member, create_pool, set_status, status_of};
    use sqlx::PgPool;
    use uuid::Uuid;

    fn report(kind: EntityKind, id: Uuid, outcome: AgentOutcome) -> AgentReportDBRequest {
        AgentReportDBRequest { kind, id, outcome }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_success_activates_pending_row(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;

        let result = Provisioning::new(&mut conn)
            .apply_report(&report(EntityKind::Pool, pool_id, AgentOutcome::Success))
            .await
            .unwrap();
        assert!(result.applied);
        assert_eq!(result.provisioning_status, Some(ProvisioningStatus::Active));
        assert_eq!(status_of(&mut conn, "pool", pool_id).await, "ACTIVE");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_error_is_not_reactivated_by_agent(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let member_id = create_member(&mut conn, "project-a", pool_id, 80).await;

        let failed = Provisioning::new(&mut conn)
            .apply_report(&report(EntityKind::Member, member_id, AgentOutcome::Failure))
            .await
            .unwrap();
        assert_eq!(failed.provisioning_status, Some(ProvisioningStatus::Error));

        let stale = Provisioning::new(&mut conn)
            .apply_report(&report(EntityKind::Member, member_id, AgentOutcome::Success))
            .await
            .unwrap();
        assert!(!stale.applied);
        assert!(stale.reason.is_some());
        assert_eq!(status_of(&mut conn, "member", member_id).await, "ERROR");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_confirmed_member_delete_removes_row(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let member_id = create_member(&mut conn, "project-a", pool_id, 80).await;
        set_status(&mut conn, "member", member_id, "PENDING_DELETE").await;

        let result = Provisioning::new(&mut conn)
            .apply_report(&report(EntityKind::Member, member_id, AgentOutcome::Success))
            .await
            .unwrap();
        assert!(result.applied);
        assert_eq!(result.provisioning_status, None);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM member WHERE id = $1")
            .bind(member_id)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_confirmed_domain_delete_marks_deleted_and_detaches(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let pool_id = create_pool(&mut conn, "project-a").await;
        let domain_id = create_domain(&mut conn, "project-a", "www.example.com").await;
        attach(&mut conn, domain_id, pool_id).await;
        set_status(&mut conn, "domain", domain_id, "PENDING_DELETE").await;

        let result = Provisioning::new(&mut conn)
            .apply_report(&report(EntityKind::Domain, domain_id, AgentOutcome::Success))
            .await
            .unwrap();
        assert_eq!(result.provisioning_status, Some(ProvisioningStatus::Deleted));
        assert_eq!(status_of(&mut conn, "domain", domain_id).await, "DELETED");

        let attachments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM domain_pool_relation WHERE pool_id = $1")
            .bind(pool_id)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(attachments, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_entity_is_refused(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let result = Provisioning::new(&mut conn)
            .apply_report(&report(EntityKind::Monitor, Uuid::new_v4(), AgentOutcome::Success))
            .await
            .unwrap();
        assert!(!result.applied);
        assert_eq!(result.provisioning_status, None);
        assert_eq!(result.reason.as_deref(), Some("not found"));
    }
}
