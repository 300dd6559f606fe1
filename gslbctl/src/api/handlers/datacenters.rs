use crate::api::extractors::{Project, RequestUrl};
use crate::api::models::ListQuery;
use crate::api::models::datacenters::{
    CreateDatacenterRequest, DatacenterEnvelope, DatacenterList, UpdateDatacenterRequest,
};
use crate::db::handlers::{Datacenters, Repository, datacenters::DatacenterFilter};
use crate::db::models::datacenters::{DatacenterDBResponse, DatacenterUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::pagination::KeysetQuery;
use crate::{AppState, types::DatacenterId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

// Agents program datacenters alongside the domains whose members and maps reference them, and
// those references are not tracked per write, so every datacenter change asks for a full resync.

#[utoipa::path(
    get,
    path = "/datacenters",
    tag = "datacenters",
    summary = "List datacenters",
    description = "Lists the project's datacenters together with every public one.",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of visible datacenters", body = DatacenterList),
        (status = 400, description = "Invalid sort key or marker"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_datacenters(
    State(state): State<AppState>,
    project: Project,
    RequestUrl(url): RequestUrl,
    Query(query): Query<ListQuery>,
) -> Result<Json<DatacenterList>> {
    let keyset = KeysetQuery::new::<DatacenterDBResponse>(&query.page_request(), &state.pagination(), vec![])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let page = Datacenters::new(&mut conn, project.tenant())
        .list(&DatacenterFilter { query: keyset })
        .await?;

    Ok(Json(DatacenterList {
        links: page.links.render(&url),
        datacenters: page.items.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/datacenters",
    tag = "datacenters",
    summary = "Create datacenter",
    request_body = CreateDatacenterRequest,
    responses(
        (status = 201, description = "Datacenter created in PENDING_CREATE", body = DatacenterEnvelope),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Datacenter quota met"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_datacenter(
    State(state): State<AppState>,
    project: Project,
    Json(body): Json<CreateDatacenterRequest>,
) -> Result<(StatusCode, Json<DatacenterEnvelope>)> {
    let request = body.datacenter.into_db_request(project.0.clone())?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Datacenters::new(conn, tenant).create(&request).await?) })
        })
        .await?;
    state.notifier.resync_all().await;

    Ok((
        StatusCode::CREATED,
        Json(DatacenterEnvelope {
            datacenter: written.entity.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/datacenters/{datacenter_id}",
    tag = "datacenters",
    summary = "Get datacenter",
    params(("datacenter_id" = uuid::Uuid, Path, description = "Datacenter ID")),
    responses(
        (status = 200, description = "Datacenter", body = DatacenterEnvelope),
        (status = 404, description = "Datacenter not found or not visible"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_datacenter(
    State(state): State<AppState>,
    project: Project,
    Path(datacenter_id): Path<DatacenterId>,
) -> Result<Json<DatacenterEnvelope>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let datacenter = Datacenters::new(&mut conn, project.tenant())
        .get_by_id(datacenter_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Datacenter".to_string(),
            id: datacenter_id.to_string(),
        })?;

    Ok(Json(DatacenterEnvelope {
        datacenter: datacenter.into(),
    }))
}

#[utoipa::path(
    put,
    path = "/datacenters/{datacenter_id}",
    tag = "datacenters",
    summary = "Update datacenter",
    request_body = UpdateDatacenterRequest,
    params(("datacenter_id" = uuid::Uuid, Path, description = "Datacenter ID")),
    responses(
        (status = 200, description = "Datacenter updated", body = DatacenterEnvelope),
        (status = 404, description = "Datacenter not found"),
        (status = 409, description = "Datacenter is being deleted"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_datacenter(
    State(state): State<AppState>,
    project: Project,
    Path(datacenter_id): Path<DatacenterId>,
    Json(body): Json<UpdateDatacenterRequest>,
) -> Result<Json<DatacenterEnvelope>> {
    let request: DatacenterUpdateDBRequest = body.datacenter.try_into()?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move {
                Ok(Datacenters::new(conn, tenant)
                    .update(datacenter_id, &request)
                    .await?)
            })
        })
        .await?;
    state.notifier.resync_all().await;

    Ok(Json(DatacenterEnvelope {
        datacenter: written.entity.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/datacenters/{datacenter_id}",
    tag = "datacenters",
    summary = "Delete datacenter",
    params(("datacenter_id" = uuid::Uuid, Path, description = "Datacenter ID")),
    responses(
        (status = 204, description = "Deletion accepted"),
        (status = 404, description = "Datacenter not found"),
        (status = 409, description = "Datacenter is referenced by a member or geographic map"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_datacenter(
    State(state): State<AppState>,
    project: Project,
    Path(datacenter_id): Path<DatacenterId>,
) -> Result<StatusCode> {
    let tenant = project.tenant();

    state
        .transaction(|conn| {
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Datacenters::new(conn, tenant).delete(datacenter_id).await?) })
        })
        .await?;
    state.notifier.resync_all().await;

    Ok(StatusCode::NO_CONTENT)
}
