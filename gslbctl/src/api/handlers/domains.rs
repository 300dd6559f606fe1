use crate::api::extractors::{Project, RequestUrl};
use crate::api::models::ListQuery;
use crate::api::models::domains::{CreateDomainRequest, DomainEnvelope, DomainList, UpdateDomainRequest};
use crate::db::handlers::{Domains, Repository, domains::DomainFilter};
use crate::db::models::domains::DomainDBResponse;
use crate::errors::{Error, Result};
use crate::pagination::KeysetQuery;
use crate::{AppState, types::DomainId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/domains",
    tag = "domains",
    summary = "List domains",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of the project's domains", body = DomainList),
        (status = 400, description = "Invalid sort key or marker"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_domains(
    State(state): State<AppState>,
    project: Project,
    RequestUrl(url): RequestUrl,
    Query(query): Query<ListQuery>,
) -> Result<Json<DomainList>> {
    let keyset = KeysetQuery::new::<DomainDBResponse>(&query.page_request(), &state.pagination(), vec![])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let page = Domains::new(&mut conn, project.tenant())
        .list(&DomainFilter::new(keyset))
        .await?;

    Ok(Json(DomainList {
        links: page.links.render(&url),
        domains: page.items.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/domains",
    tag = "domains",
    summary = "Create domain",
    request_body = CreateDomainRequest,
    responses(
        (status = 201, description = "Domain created in PENDING_CREATE", body = DomainEnvelope),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Domain quota met for the provider"),
        (status = 404, description = "A referenced pool does not exist"),
        (status = 409, description = "FQDN already taken for the provider"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_domain(
    State(state): State<AppState>,
    project: Project,
    Json(body): Json<CreateDomainRequest>,
) -> Result<(StatusCode, Json<DomainEnvelope>)> {
    let request = body
        .domain
        .into_db_request(project.0.clone(), &state.config.api.akamai_domain_suffix)?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Domains::new(conn, tenant).create(&request).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok((
        StatusCode::CREATED,
        Json(DomainEnvelope {
            domain: written.entity.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/domains/{domain_id}",
    tag = "domains",
    summary = "Get domain",
    params(("domain_id" = uuid::Uuid, Path, description = "Domain ID")),
    responses(
        (status = 200, description = "Domain with its attached pools", body = DomainEnvelope),
        (status = 404, description = "Domain not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_domain(
    State(state): State<AppState>,
    project: Project,
    Path(domain_id): Path<DomainId>,
) -> Result<Json<DomainEnvelope>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let domain = Domains::new(&mut conn, project.tenant())
        .get_by_id(domain_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Domain".to_string(),
            id: domain_id.to_string(),
        })?;

    Ok(Json(DomainEnvelope { domain: domain.into() }))
}

#[utoipa::path(
    put,
    path = "/domains/{domain_id}",
    tag = "domains",
    summary = "Update domain",
    request_body = UpdateDomainRequest,
    params(("domain_id" = uuid::Uuid, Path, description = "Domain ID")),
    responses(
        (status = 200, description = "Domain updated and awaiting the agents", body = DomainEnvelope),
        (status = 404, description = "Domain or a referenced pool not found"),
        (status = 409, description = "Domain is being deleted, or the FQDN is pinned by the provider"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_domain(
    State(state): State<AppState>,
    project: Project,
    Path(domain_id): Path<DomainId>,
    Json(body): Json<UpdateDomainRequest>,
) -> Result<Json<DomainEnvelope>> {
    let request = body.domain.into_db_request(&state.config.api.akamai_domain_suffix)?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Domains::new(conn, tenant).update(domain_id, &request).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok(Json(DomainEnvelope {
        domain: written.entity.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/domains/{domain_id}",
    tag = "domains",
    summary = "Delete domain",
    description = "Moves the domain to PENDING_DELETE; it disappears once an agent confirms the removal.",
    params(("domain_id" = uuid::Uuid, Path, description = "Domain ID")),
    responses(
        (status = 204, description = "Deletion accepted"),
        (status = 404, description = "Domain not found"),
        (status = 409, description = "Domain is already being deleted"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_domain(
    State(state): State<AppState>,
    project: Project,
    Path(domain_id): Path<DomainId>,
) -> Result<StatusCode> {
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Domains::new(conn, tenant).delete(domain_id).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok(StatusCode::NO_CONTENT)
}
