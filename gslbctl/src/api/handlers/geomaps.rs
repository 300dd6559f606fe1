use crate::api::extractors::{Project, RequestUrl};
use crate::api::models::ListQuery;
use crate::api::models::geomaps::{CreateGeoMapRequest, GeoMapEnvelope, GeoMapList, UpdateGeoMapRequest};
use crate::db::handlers::{GeoMaps, Repository, geomaps::GeoMapFilter};
use crate::db::models::geomaps::{GeoMapDBResponse, GeoMapUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::pagination::KeysetQuery;
use crate::{AppState, types::GeoMapId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/geomaps",
    tag = "geomaps",
    summary = "List geographic maps",
    description = "Lists the project's maps together with every public one.",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of visible maps", body = GeoMapList),
        (status = 400, description = "Invalid sort key or marker"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_geomaps(
    State(state): State<AppState>,
    project: Project,
    RequestUrl(url): RequestUrl,
    Query(query): Query<ListQuery>,
) -> Result<Json<GeoMapList>> {
    let keyset = KeysetQuery::new::<GeoMapDBResponse>(&query.page_request(), &state.pagination(), vec![])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let page = GeoMaps::new(&mut conn, project.tenant())
        .list(&GeoMapFilter { query: keyset })
        .await?;

    Ok(Json(GeoMapList {
        links: page.links.render(&url),
        geomaps: page.items.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/geomaps",
    tag = "geomaps",
    summary = "Create geographic map",
    request_body = CreateGeoMapRequest,
    responses(
        (status = 201, description = "Map created in PENDING_CREATE", body = GeoMapEnvelope),
        (status = 400, description = "Invalid or repeated country code"),
        (status = 404, description = "A referenced datacenter is not visible"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_geomap(
    State(state): State<AppState>,
    project: Project,
    Json(body): Json<CreateGeoMapRequest>,
) -> Result<(StatusCode, Json<GeoMapEnvelope>)> {
    let request = body.geomap.into_db_request(project.0.clone())?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(GeoMaps::new(conn, tenant).create(&request).await?) })
        })
        .await?;
    state.notifier.resync_all().await;

    Ok((
        StatusCode::CREATED,
        Json(GeoMapEnvelope {
            geomap: written.entity.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/geomaps/{geomap_id}",
    tag = "geomaps",
    summary = "Get geographic map",
    params(("geomap_id" = uuid::Uuid, Path, description = "Geographic map ID")),
    responses(
        (status = 200, description = "Map with its assignments", body = GeoMapEnvelope),
        (status = 404, description = "Map not found or not visible"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_geomap(
    State(state): State<AppState>,
    project: Project,
    Path(geomap_id): Path<GeoMapId>,
) -> Result<Json<GeoMapEnvelope>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let geomap = GeoMaps::new(&mut conn, project.tenant())
        .get_by_id(geomap_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Geographic map".to_string(),
            id: geomap_id.to_string(),
        })?;

    Ok(Json(GeoMapEnvelope { geomap: geomap.into() }))
}

#[utoipa::path(
    put,
    path = "/geomaps/{geomap_id}",
    tag = "geomaps",
    summary = "Update geographic map",
    request_body = UpdateGeoMapRequest,
    params(("geomap_id" = uuid::Uuid, Path, description = "Geographic map ID")),
    responses(
        (status = 200, description = "Map updated", body = GeoMapEnvelope),
        (status = 404, description = "Map or a referenced datacenter not found"),
        (status = 409, description = "Map is being deleted"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_geomap(
    State(state): State<AppState>,
    project: Project,
    Path(geomap_id): Path<GeoMapId>,
    Json(body): Json<UpdateGeoMapRequest>,
) -> Result<Json<GeoMapEnvelope>> {
    let request: GeoMapUpdateDBRequest = body.geomap.try_into()?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(GeoMaps::new(conn, tenant).update(geomap_id, &request).await?) })
        })
        .await?;
    state.notifier.resync_all().await;

    Ok(Json(GeoMapEnvelope {
        geomap: written.entity.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/geomaps/{geomap_id}",
    tag = "geomaps",
    summary = "Delete geographic map",
    params(("geomap_id" = uuid::Uuid, Path, description = "Geographic map ID")),
    responses(
        (status = 204, description = "Deletion accepted"),
        (status = 404, description = "Map not found"),
        (status = 409, description = "Map is already being deleted"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_geomap(
    State(state): State<AppState>,
    project: Project,
    Path(geomap_id): Path<GeoMapId>,
) -> Result<StatusCode> {
    let tenant = project.tenant();

    state
        .transaction(|conn| {
            let tenant = tenant.clone();
            Box::pin(async move { Ok(GeoMaps::new(conn, tenant).delete(geomap_id).await?) })
        })
        .await?;
    state.notifier.resync_all().await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::models::geomaps::GeoMapEnvelope;
    use crate::test_utils::{PROJECT_HEADER, create_datacenter, create_test_app};
    use crate::types::Scope;
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_replace_assignments(pool: PgPool) {
        let (app, _bg) = create_test_app(pool.clone()).await;
        let mut conn = pool.acquire().await.unwrap();
        let fra = create_datacenter(&mut conn, "project-a", Scope::Private).await;
        let shared = create_datacenter(&mut conn, "project-b", Scope::Public).await;

        let response = app
            .post("/geomaps")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"geomap": {
                "provider": "akamai",
                "default_datacenter": fra,
                "assignments": [{"country": "de", "datacenter": fra}, {"country": "US", "datacenter": shared}]
            }}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: GeoMapEnvelope = response.json();
        let mut countries: Vec<_> = created.geomap.assignments.iter().map(|a| a.country.clone()).collect();
        countries.sort();
        assert_eq!(countries, vec!["DE", "US"]);

        let response = app
            .put(&format!("/geomaps/{}", created.geomap.id))
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"geomap": {"assignments": [{"country": "FR", "datacenter": shared}]}}))
            .await;
        response.assert_status_ok();
        let updated: GeoMapEnvelope = response.json();
        assert_eq!(updated.geomap.assignments.len(), 1);
        assert_eq!(updated.geomap.assignments[0].country, "FR");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_foreign_private_datacenter_is_not_found(pool: PgPool) {
        let (app, _bg) = create_test_app(pool.clone()).await;
        let mut conn = pool.acquire().await.unwrap();
        let foreign = create_datacenter(&mut conn, "project-b", Scope::Private).await;

        app.post("/geomaps")
            .add_header(PROJECT_HEADER, "project-a")
            .json(&json!({"geomap": {"provider": "f5", "default_datacenter": foreign}}))
            .await
            .assert_status_not_found();
    }
}
