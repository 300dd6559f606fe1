use crate::api::extractors::{Project, RequestUrl};
use crate::api::models::ListQuery;
use crate::api::models::pools::{CreatePoolRequest, PoolEnvelope, PoolList, UpdatePoolRequest};
use crate::db::handlers::{Pools, Repository, pools::PoolFilter};
use crate::db::models::pools::{PoolDBResponse, PoolUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::pagination::KeysetQuery;
use crate::{AppState, types::PoolId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/pools",
    tag = "pools",
    summary = "List pools",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of the project's pools", body = PoolList),
        (status = 400, description = "Invalid sort key or marker"),
        (status = 401, description = "Missing project"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_pools(
    State(state): State<AppState>,
    project: Project,
    RequestUrl(url): RequestUrl,
    Query(query): Query<ListQuery>,
) -> Result<Json<PoolList>> {
    let keyset = KeysetQuery::new::<PoolDBResponse>(&query.page_request(), &state.pagination(), vec![])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let page = Pools::new(&mut conn, project.tenant())
        .list(&PoolFilter { query: keyset })
        .await?;

    Ok(Json(PoolList {
        links: page.links.render(&url),
        pools: page.items.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/pools",
    tag = "pools",
    summary = "Create pool",
    request_body = CreatePoolRequest,
    responses(
        (status = 201, description = "Pool created in PENDING_CREATE", body = PoolEnvelope),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Pool quota met"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_pool(
    State(state): State<AppState>,
    project: Project,
    Json(body): Json<CreatePoolRequest>,
) -> Result<(StatusCode, Json<PoolEnvelope>)> {
    let request = body.pool.into_db_request(project.0.clone())?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Pools::new(conn, tenant).create(&request).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok((StatusCode::CREATED, Json(PoolEnvelope { pool: written.entity.into() })))
}

#[utoipa::path(
    get,
    path = "/pools/{pool_id}",
    tag = "pools",
    summary = "Get pool",
    params(("pool_id" = uuid::Uuid, Path, description = "Pool ID")),
    responses(
        (status = 200, description = "Pool", body = PoolEnvelope),
        (status = 404, description = "Pool not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_pool(
    State(state): State<AppState>,
    project: Project,
    Path(pool_id): Path<PoolId>,
) -> Result<Json<PoolEnvelope>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let pool = Pools::new(&mut conn, project.tenant())
        .get_by_id(pool_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Pool".to_string(),
            id: pool_id.to_string(),
        })?;

    Ok(Json(PoolEnvelope { pool: pool.into() }))
}

#[utoipa::path(
    put,
    path = "/pools/{pool_id}",
    tag = "pools",
    summary = "Update pool",
    request_body = UpdatePoolRequest,
    params(("pool_id" = uuid::Uuid, Path, description = "Pool ID")),
    responses(
        (status = 200, description = "Pool updated and awaiting the agents", body = PoolEnvelope),
        (status = 404, description = "Pool not found"),
        (status = 409, description = "Pool or an attached domain is not in a mutable state"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_pool(
    State(state): State<AppState>,
    project: Project,
    Path(pool_id): Path<PoolId>,
    Json(body): Json<UpdatePoolRequest>,
) -> Result<Json<PoolEnvelope>> {
    let request: PoolUpdateDBRequest = body.pool.try_into()?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Pools::new(conn, tenant).update(pool_id, &request).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok(Json(PoolEnvelope { pool: written.entity.into() }))
}

#[utoipa::path(
    delete,
    path = "/pools/{pool_id}",
    tag = "pools",
    summary = "Delete pool",
    params(("pool_id" = uuid::Uuid, Path, description = "Pool ID")),
    responses(
        (status = 204, description = "Pool deleted"),
        (status = 404, description = "Pool not found"),
        (status = 409, description = "Pool is still attached to a domain"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_pool(
    State(state): State<AppState>,
    project: Project,
    Path(pool_id): Path<PoolId>,
) -> Result<StatusCode> {
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Pools::new(conn, tenant).delete(pool_id).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok(StatusCode::NO_CONTENT)
}
