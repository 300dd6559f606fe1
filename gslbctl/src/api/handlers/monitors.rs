use crate::api::extractors::{Project, RequestUrl};
use crate::api::models::ListQuery;
use crate::api::models::monitors::{CreateMonitorRequest, MonitorEnvelope, MonitorList, MonitorsQuery, UpdateMonitorRequest};
use crate::db::handlers::{Monitors, Repository, monitors::MonitorFilter};
use crate::db::models::monitors::{MonitorDBResponse, MonitorUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::pagination::KeysetQuery;
use crate::{AppState, types::MonitorId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/monitors",
    tag = "monitors",
    summary = "List monitors",
    params(ListQuery, MonitorsQuery),
    responses(
        (status = 200, description = "One page of the project's monitors", body = MonitorList),
        (status = 400, description = "Invalid sort key or marker"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_monitors(
    State(state): State<AppState>,
    project: Project,
    RequestUrl(url): RequestUrl,
    Query(query): Query<ListQuery>,
    Query(filter): Query<MonitorsQuery>,
) -> Result<Json<MonitorList>> {
    let keyset = KeysetQuery::new::<MonitorDBResponse>(&query.page_request(), &state.pagination(), vec![])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let page = Monitors::new(&mut conn, project.tenant())
        .list(&MonitorFilter {
            pool_id: filter.pool_id,
            query: keyset,
        })
        .await?;

    Ok(Json(MonitorList {
        links: page.links.render(&url),
        monitors: page.items.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/monitors",
    tag = "monitors",
    summary = "Create monitor",
    request_body = CreateMonitorRequest,
    responses(
        (status = 201, description = "Monitor created; the pool and its domains await the agents", body = MonitorEnvelope),
        (status = 403, description = "Monitor quota met"),
        (status = 404, description = "Pool not found"),
        (status = 409, description = "Pool already has a monitor, or an attached domain is syncing"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_monitor(
    State(state): State<AppState>,
    project: Project,
    Json(body): Json<CreateMonitorRequest>,
) -> Result<(StatusCode, Json<MonitorEnvelope>)> {
    let request = body.monitor.into_db_request(project.0.clone())?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Monitors::new(conn, tenant).create(&request).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok((
        StatusCode::CREATED,
        Json(MonitorEnvelope {
            monitor: written.entity.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/monitors/{monitor_id}",
    tag = "monitors",
    summary = "Get monitor",
    params(("monitor_id" = uuid::Uuid, Path, description = "Monitor ID")),
    responses(
        (status = 200, description = "Monitor", body = MonitorEnvelope),
        (status = 404, description = "Monitor not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_monitor(
    State(state): State<AppState>,
    project: Project,
    Path(monitor_id): Path<MonitorId>,
) -> Result<Json<MonitorEnvelope>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let monitor = Monitors::new(&mut conn, project.tenant())
        .get_by_id(monitor_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Monitor".to_string(),
            id: monitor_id.to_string(),
        })?;

    Ok(Json(MonitorEnvelope { monitor: monitor.into() }))
}

#[utoipa::path(
    put,
    path = "/monitors/{monitor_id}",
    tag = "monitors",
    summary = "Update monitor",
    request_body = UpdateMonitorRequest,
    params(("monitor_id" = uuid::Uuid, Path, description = "Monitor ID")),
    responses(
        (status = 200, description = "Monitor updated", body = MonitorEnvelope),
        (status = 404, description = "Monitor not found"),
        (status = 409, description = "Monitor is being deleted, or an attached domain is syncing"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_monitor(
    State(state): State<AppState>,
    project: Project,
    Path(monitor_id): Path<MonitorId>,
    Json(body): Json<UpdateMonitorRequest>,
) -> Result<Json<MonitorEnvelope>> {
    let request: MonitorUpdateDBRequest = body.monitor.try_into()?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Monitors::new(conn, tenant).update(monitor_id, &request).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok(Json(MonitorEnvelope {
        monitor: written.entity.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/monitors/{monitor_id}",
    tag = "monitors",
    summary = "Delete monitor",
    params(("monitor_id" = uuid::Uuid, Path, description = "Monitor ID")),
    responses(
        (status = 204, description = "Deletion accepted"),
        (status = 404, description = "Monitor not found"),
        (status = 409, description = "Monitor is already being deleted, or an attached domain is syncing"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_monitor(
    State(state): State<AppState>,
    project: Project,
    Path(monitor_id): Path<MonitorId>,
) -> Result<StatusCode> {
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Monitors::new(conn, tenant).delete(monitor_id).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok(StatusCode::NO_CONTENT)
}
