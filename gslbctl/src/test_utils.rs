//! Test utilities: raw fixtures that bypass the repositories, and an in-process API server.

use crate::config::{Config, DatabaseConfig, DispatcherKind, HousekeepingConfig, PoolSettings, QuotaConfig, SyncConfig};
use crate::types::{DatacenterId, DomainId, MemberId, PoolId, Scope};
use axum_test::TestServer;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Header carrying the caller's project on API requests.
pub const PROJECT_HEADER: &str = "X-Project-Id";

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        debug: true,
        database: DatabaseConfig {
            // The pool is handed in by the test harness
            url: "Something".to_string(),
            pool: PoolSettings {
                max_connections: 2,
                min_connections: 0,
                ..Default::default()
            },
            ..Default::default()
        },
        quota: QuotaConfig {
            enabled: false,
            ..Default::default()
        },
        housekeeping: HousekeepingConfig {
            enabled: false,
            ..Default::default()
        },
        sync: SyncConfig {
            dispatcher: DispatcherKind::Disabled,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub async fn create_test_app(pool: PgPool) -> (TestServer, crate::BackgroundServices) {
    create_test_app_with_config(pool, create_test_config()).await
}

pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> (TestServer, crate::BackgroundServices) {
    let app = crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");
    app.into_test_server()
}

pub async fn create_pool(conn: &mut PgConnection, project: &str) -> PoolId {
    sqlx::query_scalar("INSERT INTO pool (project_id, name) VALUES ($1, 'pool') RETURNING id")
        .bind(project)
        .fetch_one(&mut *conn)
        .await
        .expect("Failed to create test pool")
}

pub async fn create_domain(conn: &mut PgConnection, project: &str, fqdn: &str) -> DomainId {
    sqlx::query_scalar("INSERT INTO domain (project_id, name, fqdn, provider) VALUES ($1, 'domain', $2, 'akamai') RETURNING id")
        .bind(project)
        .bind(fqdn)
        .fetch_one(&mut *conn)
        .await
        .expect("Failed to create test domain")
}

pub async fn attach(conn: &mut PgConnection, domain_id: DomainId, pool_id: PoolId) {
    sqlx::query("INSERT INTO domain_pool_relation (domain_id, pool_id) VALUES ($1, $2)")
        .bind(domain_id)
        .bind(pool_id)
        .execute(&mut *conn)
        .await
        .expect("Failed to attach test pool");
}

pub async fn create_datacenter(conn: &mut PgConnection, project: &str, scope: Scope) -> DatacenterId {
    sqlx::query_scalar("INSERT INTO datacenter (project_id, name, scope) VALUES ($1, 'dc', $2) RETURNING id")
        .bind(project)
        .bind(scope.as_str())
        .fetch_one(&mut *conn)
        .await
        .expect("Failed to create test datacenter")
}

pub async fn create_member(conn: &mut PgConnection, project: &str, pool_id: PoolId, port: i32) -> MemberId {
    sqlx::query_scalar("INSERT INTO member (project_id, pool_id, address, port) VALUES ($1, $2, '10.0.0.1', $3) RETURNING id")
        .bind(project)
        .bind(pool_id)
        .bind(port)
        .fetch_one(&mut *conn)
        .await
        .expect("Failed to create test member")
}

/// Force a row's provisioning status, standing in for an agent.
pub async fn set_status(conn: &mut PgConnection, table: &str, id: Uuid, status: &str) {
    sqlx::query(&format!("UPDATE {table} SET provisioning_status = $2 WHERE id = $1"))
        .bind(id)
        .bind(status)
        .execute(&mut *conn)
        .await
        .expect("Failed to set provisioning status");
}

pub async fn status_of(conn: &mut PgConnection, table: &str, id: Uuid) -> String {
    sqlx::query_scalar(&format!("SELECT provisioning_status FROM {table} WHERE id = $1"))
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .expect("Failed to read provisioning status")
}
