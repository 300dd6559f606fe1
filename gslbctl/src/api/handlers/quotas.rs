use crate::api::extractors::RequestUrl;
use crate::api::models::ListQuery;
use crate::api::models::quotas::{QuotaDefaults, QuotaEnvelope, QuotaList, QuotaResponse, UpdateQuotaRequest};
use crate::db::handlers::Quotas;
use crate::db::models::quotas::{QuotaDBResponse, QuotaLimits, QuotaUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::pagination::KeysetQuery;
use crate::{AppState, types::ProjectId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/quotas",
    tag = "quotas",
    summary = "List project quotas",
    description = "Lists the projects holding a quota row. Projects without one run on the defaults.",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of project quotas", body = QuotaList),
        (status = 400, description = "Invalid sort key or marker"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_quotas(
    State(state): State<AppState>,
    RequestUrl(url): RequestUrl,
    Query(query): Query<ListQuery>,
) -> Result<Json<QuotaList>> {
    let keyset = KeysetQuery::new::<QuotaDBResponse>(&query.page_request(), &state.pagination(), vec![])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let page = Quotas::new(&mut conn).list(&keyset).await?;

    Ok(Json(QuotaList {
        links: page.links.render(&url),
        quotas: page.items.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/quotas/defaults",
    tag = "quotas",
    summary = "Get default quota",
    responses((status = 200, description = "Limits applied to projects without a quota row", body = QuotaDefaults))
)]
#[tracing::instrument(skip_all)]
pub async fn get_quota_defaults(State(state): State<AppState>) -> Json<QuotaDefaults> {
    Json(QuotaDefaults {
        quota: QuotaLimits::from(&state.config.quota).into(),
    })
}

#[utoipa::path(
    get,
    path = "/quotas/{project_id}",
    tag = "quotas",
    summary = "Get project quota",
    params(("project_id" = String, Path, description = "Project ID")),
    responses((status = 200, description = "The project's limits and live usage", body = QuotaEnvelope))
)]
#[tracing::instrument(skip_all)]
pub async fn get_quota(State(state): State<AppState>, Path(project_id): Path<ProjectId>) -> Result<Json<QuotaEnvelope>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut quotas = Quotas::new(&mut conn);

    let quota = match quotas.get(&project_id).await? {
        Some(row) => QuotaResponse::from(row),
        None => QuotaResponse::from_defaults(project_id.clone(), QuotaLimits::from(&state.config.quota)),
    };
    let usage = quotas.usage(&project_id).await?;

    Ok(Json(QuotaEnvelope {
        quota: quota.with_usage(usage),
    }))
}

#[utoipa::path(
    put,
    path = "/quotas/{project_id}",
    tag = "quotas",
    summary = "Set project quota",
    request_body = UpdateQuotaRequest,
    params(("project_id" = String, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Stored limits", body = QuotaEnvelope),
        (status = 400, description = "Limit below -1"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_quota(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<UpdateQuotaRequest>,
) -> Result<Json<QuotaEnvelope>> {
    let request: QuotaUpdateDBRequest = body.quota.try_into()?;
    let limits = request.resolve(QuotaLimits::from(&state.config.quota));

    let quota = state
        .transaction(|conn| {
            let project_id = project_id.clone();
            Box::pin(async move { Ok(Quotas::new(conn).set(&project_id, limits).await?) })
        })
        .await?;

    Ok(Json(QuotaEnvelope { quota: quota.into() }))
}

#[utoipa::path(
    delete,
    path = "/quotas/{project_id}",
    tag = "quotas",
    summary = "Reset project quota",
    description = "Removes the project's row; it falls back to the defaults on its next create.",
    params(("project_id" = String, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Quota removed"),
        (status = 404, description = "Project has no quota row"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_quota(State(state): State<AppState>, Path(project_id): Path<ProjectId>) -> Result<StatusCode> {
    let removed = state
        .transaction(|conn| {
            let project_id = project_id.clone();
            Box::pin(async move { Ok(Quotas::new(conn).delete(&project_id).await?) })
        })
        .await?;

    if !removed {
        return Err(Error::NotFound {
            resource: "Quota".to_string(),
            id: project_id,
        });
    }
    Ok(StatusCode::NO_CONTENT)
}
