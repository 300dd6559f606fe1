//! Per-project admission control for resource creation.
//!
//! The guard runs in front of the create handlers as axum middleware. It seeds the project's quota
//! row from the configured defaults on first use, counts the project's live rows of the requested
//! type and rejects the request with 403 once the ceiling is reached. The check and the insert are
//! not serialized, so concurrent creates may overshoot a limit by the number of racing requests.

use crate::AppState;
use crate::api::extractors::project_from_parts;
use crate::config::QuotaConfig;
use crate::db::handlers::Quotas;
use crate::db::models::quotas::{QuotaLimits, QuotaUsage, UNLIMITED};
use crate::errors::{Error, Result};
use crate::types::Provider;
use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use sqlx::PgConnection;
use std::fmt;
use tracing::{debug, instrument};

/// A resource type that counts against a project's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaResource {
    Domain(Provider),
    Pool,
    Member,
    Monitor,
    Datacenter,
}

impl QuotaResource {
    pub fn name(&self) -> &'static str {
        match self {
            QuotaResource::Domain(_) => "domain",
            QuotaResource::Pool => "pool",
            QuotaResource::Member => "member",
            QuotaResource::Monitor => "monitor",
            QuotaResource::Datacenter => "datacenter",
        }
    }

    fn limit(&self, limits: &QuotaLimits) -> i64 {
        match self {
            QuotaResource::Domain(Provider::Akamai) => limits.domain_akamai,
            QuotaResource::Domain(Provider::F5) => limits.domain_f5,
            QuotaResource::Pool => limits.pool,
            QuotaResource::Member => limits.member,
            QuotaResource::Monitor => limits.monitor,
            QuotaResource::Datacenter => limits.datacenter,
        }
    }

    fn used(&self, usage: &QuotaUsage) -> i64 {
        match self {
            QuotaResource::Domain(Provider::Akamai) => usage.domain_akamai,
            QuotaResource::Domain(Provider::F5) => usage.domain_f5,
            QuotaResource::Pool => usage.pool,
            QuotaResource::Member => usage.member,
            QuotaResource::Monitor => usage.monitor,
            QuotaResource::Datacenter => usage.datacenter,
        }
    }
}

impl fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaResource::Domain(provider) => write!(f, "domain ({provider})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Whether one more resource fits under `limit`.
pub fn admits(limit: i64, used: i64) -> bool {
    limit == UNLIMITED || limit - used >= 1
}

/// Admit or reject the creation of one `resource` for `project`.
#[instrument(skip(conn, config), fields(resource = %resource), err)]
pub async fn check(conn: &mut PgConnection, project: &str, resource: QuotaResource, config: &QuotaConfig) -> Result<()> {
    let mut quotas = Quotas::new(conn);
    let quota = quotas.ensure_exists(project, QuotaLimits::from(config)).await?;
    let usage = quotas.usage(project).await?;

    let (limit, used) = (resource.limit(&quota.limits), resource.used(&usage));
    if admits(limit, used) {
        return Ok(());
    }

    metrics::counter!("gslbctl_quota_rejections_total", "resource" => resource.name()).increment(1);
    debug!(limit, used, "Quota met");
    Err(Error::QuotaExceeded {
        resource: resource.name().to_string(),
    })
}

#[derive(Deserialize)]
struct DomainBody {
    domain: DomainProvider,
}

#[derive(Deserialize)]
struct DomainProvider {
    provider: Provider,
}

/// Middleware enforcing quotas on the create routes. Mount with `route_layer` so the matched
/// route template is available.
pub async fn quota_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match admit(&state, request).await {
        Ok(request) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

async fn admit(state: &AppState, request: Request) -> Result<Request> {
    if !state.config.quota.enabled || request.method() != Method::POST {
        return Ok(request);
    }
    let Some(route) = request.extensions().get::<MatchedPath>().map(|p| p.as_str().to_owned()) else {
        return Ok(request);
    };

    let (parts, body) = request.into_parts();
    let (resource, body) = match route.as_str() {
        "/pools" => (QuotaResource::Pool, body),
        "/pools/{pool_id}/members" => (QuotaResource::Member, body),
        "/monitors" => (QuotaResource::Monitor, body),
        "/datacenters" => (QuotaResource::Datacenter, body),
        "/domains" => {
            let bytes = axum::body::to_bytes(body, state.config.api.max_quota_body_bytes)
                .await
                .map_err(|_| Error::PayloadTooLarge {
                    limit: state.config.api.max_quota_body_bytes,
                })?;
            let provider = serde_json::from_slice::<DomainBody>(&bytes).ok().map(|b| b.domain.provider);
            let body = Body::from(bytes);
            match provider {
                Some(provider) => (QuotaResource::Domain(provider), body),
                // Malformed bodies are the handler's to reject
                None => return Ok(Request::from_parts(parts, body)),
            }
        }
        _ => return Ok(Request::from_parts(parts, body)),
    };

    // Anonymous requests are rejected by the handler's extractor
    let Some(project) = project_from_parts(&parts) else {
        return Ok(Request::from_parts(parts, body));
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    check(&mut conn, project.id(), resource, &state.config.quota).await?;
    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{PROJECT_HEADER, create_pool, create_test_app_with_config, create_test_config};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    fn config(pools: i64) -> QuotaConfig {
        QuotaConfig {
            enabled: true,
            pools,
            ..Default::default()
        }
    }

    #[test]
    fn test_admits_boundary() {
        assert!(admits(1, 0));
        assert!(!admits(1, 1));
        assert!(!admits(0, 0));
        assert!(admits(UNLIMITED, 10_000));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_counts_live_rows(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();

        check(&mut conn, "project-a", QuotaResource::Pool, &config(1)).await.unwrap();
        create_pool(&mut conn, "project-a").await;

        let err = check(&mut conn, "project-a", QuotaResource::Pool, &config(1))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Quota has been met for resource: pool");

        // Rows of other projects do not count
        check(&mut conn, "project-b", QuotaResource::Pool, &config(1)).await.unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_stored_row_wins_over_defaults(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        create_pool(&mut conn, "project-a").await;

        check(&mut conn, "project-a", QuotaResource::Pool, &config(5)).await.unwrap();
        // The row seeded above keeps limit 5 even though the defaults shrink
        check(&mut conn, "project-a", QuotaResource::Pool, &config(1)).await.unwrap();

        sqlx::query("UPDATE quota SET pool = -1 WHERE project_id = 'project-a'")
            .execute(&mut *conn)
            .await
            .unwrap();
        check(&mut conn, "project-a", QuotaResource::Pool, &config(0)).await.unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_middleware_rejects_create_over_quota(pool: PgPool) {
        let mut test_config = create_test_config();
        test_config.quota = QuotaConfig {
            enabled: true,
            pools: 1,
            domains_akamai: 1,
            domains_f5: 0,
            ..Default::default()
        };
        let (app, _bg) = create_test_app_with_config(pool.clone(), test_config).await;

        app.post("/pools")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"pool": {}}))
            .await
            .assert_status(StatusCode::CREATED);

        let response = app
            .post("/pools")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"pool": {}}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        let body: serde_json::Value = response.json();
        assert_eq!(body["message"], "Quota has been met for resource: pool");

        // Domain limits are per provider and the body is still readable by the handler
        app.post("/domains")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"domain": {"fqdn": "www.example.com", "provider": "akamai"}}))
            .await
            .assert_status(StatusCode::CREATED);
        app.post("/domains")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"domain": {"fqdn": "api.example.com", "provider": "f5"}}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_disabled_quota_admits_everything(pool: PgPool) {
        let mut test_config = create_test_config();
        test_config.quota = QuotaConfig {
            enabled: false,
            pools: 0,
            ..Default::default()
        };
        let (app, _bg) = create_test_app_with_config(pool.clone(), test_config).await;

        app.post("/pools")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"pool": {}}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_oversized_domain_body_is_payload_too_large(pool: PgPool) {
        let mut test_config = create_test_config();
        test_config.quota.enabled = true;
        test_config.api.max_quota_body_bytes = 64;
        let (app, _bg) = create_test_app_with_config(pool.clone(), test_config).await;

        let response = app
            .post("/domains")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"domain": {"fqdn": "www.example.com", "provider": "akamai", "name": "x".repeat(128)}}))
            .await;
        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "payload_too_large");
    }
}
