//! # gslbctl: Control Plane for Global Server Load Balancing
//!
//! `gslbctl` keeps the desired state of a multi-provider GSLB deployment and drives it to
//! convergence. Tenants describe what they want (domains, pools of endpoints, health monitors,
//! datacenters and geographic routing maps) through a REST API; provider agents (Akamai, F5) apply
//! that state to the real load balancers and report back.
//!
//! ## Overview
//!
//! Every write is accepted immediately and recorded in a *pending* provisioning state. The caller
//! gets the new desired state back at once, but the change is only *live* once an agent reports
//! that it has been applied. Agents learn about changes from a best-effort notification naming the
//! affected domains, read the desired state through the API, and confirm each entity they applied.
//!
//! Because the objects form a hierarchy (a domain references pools, a pool owns members and at
//! most one monitor), a change to a child re-queues its ancestors: editing a member marks its pool
//! and every domain using that pool as `PENDING_UPDATE`, since the agent has to re-apply the whole
//! domain configuration.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); all state lives in PostgreSQL (or
//! CockroachDB, which is driven through the same protocol with transaction retries).
//!
//! - The **API layer** ([`api`]) maps requests onto repository calls. Each mutation is one unit of
//!   work run by the [`db::transaction::TransactionExecutor`]: guard checks, the row change and its
//!   cascade commit together or not at all.
//! - The **lifecycle** ([`lifecycle`]) holds the provisioning state machine and the cascade rules.
//! - The **database layer** ([`db`]) implements one repository per resource, scoped to a project.
//! - **Quotas** ([`quota`]) are checked as middleware before any create reaches a handler.
//! - **Sync** ([`sync`]) tells agents which domains to re-read after a commit.
//! - **Housekeeping** ([`housekeeping`]) settles pools no agent will ever see and garbage collects
//!   confirmed domain deletions.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use gslbctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = gslbctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     gslbctl::telemetry::init_telemetry(config.log_format)?;
//!
//!     Application::new(config)
//!         .await?
//!         .serve(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod housekeeping;
pub mod lifecycle;
mod openapi;
pub mod pagination;
pub mod quota;
pub mod sync;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::db::transaction::TransactionExecutor;
use crate::housekeeping::Housekeeper;
use crate::openapi::ApiDoc;
use crate::pagination::PaginationSettings;
use crate::sync::Notifier;
use axum::{
    Json, Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgConnection, PgPool};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;

pub use types::{DatacenterId, DomainId, GeoMapId, MemberId, MonitorId, PoolId, ProjectId};

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .tx_executor(TransactionExecutor::Plain)
///     .notifier(notifier)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub tx_executor: TransactionExecutor,
    pub notifier: Notifier,
}

impl AppState {
    /// Run a unit of work in one transaction, re-running it on backends that abort under contention.
    pub async fn transaction<T, F>(&self, work: F) -> errors::Result<T>
    where
        F: for<'c> FnMut(&'c mut PgConnection) -> BoxFuture<'c, errors::Result<T>> + Send,
        T: Send,
    {
        self.tx_executor.execute(&self.db, work).await
    }

    pub fn pagination(&self) -> PaginationSettings {
        (&self.config.api).into()
    }
}

/// Get the gslbctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Open the connection pool described by `config.database`.
async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let statement_timeout_ms = config.database.statement_timeout.as_millis();
    let seconds = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(seconds(settings.idle_timeout_secs))
        .max_lifetime(seconds(settings.max_lifetime_secs))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {statement_timeout_ms}").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database.url)
        .await?;
    Ok(pool)
}

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    use api::handlers::{agent, datacenters, domains, geomaps, health, members, monitors, pools, quotas, sync};

    let api_routes = Router::new()
        .route("/domains", get(domains::list_domains).post(domains::create_domain))
        .route(
            "/domains/{domain_id}",
            get(domains::get_domain).put(domains::update_domain).delete(domains::delete_domain),
        )
        .route("/pools", get(pools::list_pools).post(pools::create_pool))
        .route(
            "/pools/{pool_id}",
            get(pools::get_pool).put(pools::update_pool).delete(pools::delete_pool),
        )
        .route(
            "/pools/{pool_id}/members",
            get(members::list_members).post(members::create_member),
        )
        .route(
            "/pools/{pool_id}/members/{member_id}",
            get(members::get_member).put(members::update_member).delete(members::delete_member),
        )
        .route("/monitors", get(monitors::list_monitors).post(monitors::create_monitor))
        .route(
            "/monitors/{monitor_id}",
            get(monitors::get_monitor).put(monitors::update_monitor).delete(monitors::delete_monitor),
        )
        .route(
            "/datacenters",
            get(datacenters::list_datacenters).post(datacenters::create_datacenter),
        )
        .route(
            "/datacenters/{datacenter_id}",
            get(datacenters::get_datacenter)
                .put(datacenters::update_datacenter)
                .delete(datacenters::delete_datacenter),
        )
        .route("/geomaps", get(geomaps::list_geomaps).post(geomaps::create_geomap))
        .route(
            "/geomaps/{geomap_id}",
            get(geomaps::get_geomap).put(geomaps::update_geomap).delete(geomaps::delete_geomap),
        )
        .route("/quotas", get(quotas::list_quotas))
        .route("/quotas/defaults", get(quotas::get_quota_defaults))
        .route(
            "/quotas/{project_id}",
            get(quotas::get_quota).put(quotas::update_quota).delete(quotas::delete_quota),
        )
        .route("/sync", post(sync::trigger_sync))
        .route("/agent/provisioning-status", post(agent::report_provisioning_status))
        .route("/agent/domains", get(agent::list_agent_domains))
        // Route layer so the quota check sees the matched path template
        .route_layer(from_fn_with_state(state.clone(), quota::quota_middleware));

    let mut router = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(api_routes)
        .with_state(state.clone());

    if state.config.debug {
        router = router.layer(from_fn(errors::verbose_errors));
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Container for background services and their lifecycle management.
///
/// Holds the housekeeping loops. Dropping it (through `drop_guard`) cancels them; [`shutdown`]
/// cancels them and waits for the current iteration to finish.
///
/// [`shutdown`]: BackgroundServices::shutdown
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

fn setup_background_services(state: &AppState, shutdown_token: CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    if state.config.housekeeping.enabled {
        let housekeeper = Housekeeper::new(
            state.db.clone(),
            state.tx_executor.clone(),
            state.config.housekeeping.clone(),
        );
        background_tasks.extend(housekeeper.spawn(shutdown_token.clone()));
    } else {
        info!("Housekeeping disabled; unbound pools and deleted domains are left as they are");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create an application on an existing pool, or connect one from configuration.
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting gslbctl with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => pool,
            None => {
                info!(backend = ?config.database.backend, "Connecting to database");
                connect(&config).await?
            }
        };
        migrator().run(&pool).await?;

        let dispatcher = sync::create_dispatcher(&config.sync, pool.clone());
        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .tx_executor(TransactionExecutor::for_database(&config.database))
            .notifier(Notifier::new(dispatcher, &config.sync))
            .build();

        let bg_services = setup_background_services(&app_state, CancellationToken::new());
        let router = build_router(app_state);

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("gslbctl listening on http://{}", bind_addr);

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::test_utils::{PROJECT_HEADER, create_test_app, create_test_config};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_openapi_document_is_served(pool: PgPool) {
        let (server, _bg) = create_test_app(pool).await;
        let response = server.get("/api-docs/openapi.json").await;
        response.assert_status_ok();

        let doc: serde_json::Value = response.json();
        assert!(doc["paths"]["/pools/{pool_id}/members"].is_object());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_client_errors_carry_stable_code(pool: PgPool) {
        let mut config = create_test_config();
        config.debug = false;
        let (server, _bg) = crate::test_utils::create_test_app_with_config(pool, config).await;

        let response = server
            .post("/pools")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"pool": {"name": "x".repeat(300)}}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "validation_failed");
        assert!(body.get("detail").is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_background_services_stop_on_shutdown(pool: PgPool) {
        let mut config = create_test_config();
        config.housekeeping.enabled = true;
        let app = crate::Application::new_with_pool(config, Some(pool)).await.unwrap();
        let (_server, bg) = app.into_test_server();

        tokio::time::timeout(std::time::Duration::from_secs(5), bg.shutdown())
            .await
            .expect("background services did not stop");
    }
}
