use crate::api::extractors::{Project, RequestUrl};
use crate::api::models::ListQuery;
use crate::api::models::members::{CreateMemberRequest, MemberEnvelope, MemberList, UpdateMemberRequest};
use crate::db::handlers::{Members, Repository, members::MemberFilter};
use crate::db::models::members::{MemberDBResponse, MemberUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::pagination::KeysetQuery;
use crate::{
    AppState,
    types::{MemberId, PoolId},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/pools/{pool_id}/members",
    tag = "members",
    summary = "List pool members",
    params(("pool_id" = uuid::Uuid, Path, description = "Pool ID"), ListQuery),
    responses(
        (status = 200, description = "One page of the pool's members", body = MemberList),
        (status = 404, description = "Pool not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_members(
    State(state): State<AppState>,
    project: Project,
    RequestUrl(url): RequestUrl,
    Path(pool_id): Path<PoolId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MemberList>> {
    let keyset = KeysetQuery::new::<MemberDBResponse>(&query.page_request(), &state.pagination(), vec![])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let page = Members::new(&mut conn, project.tenant())
        .list(&MemberFilter { pool_id, query: keyset })
        .await?;

    Ok(Json(MemberList {
        links: page.links.render(&url),
        members: page.items.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/pools/{pool_id}/members",
    tag = "members",
    summary = "Add pool member",
    request_body = CreateMemberRequest,
    params(("pool_id" = uuid::Uuid, Path, description = "Pool ID")),
    responses(
        (status = 201, description = "Member created; the pool and its domains await the agents", body = MemberEnvelope),
        (status = 403, description = "Member quota met"),
        (status = 404, description = "Pool or datacenter not found"),
        (status = 409, description = "Endpoint already in the pool, or an attached domain is syncing"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_member(
    State(state): State<AppState>,
    project: Project,
    Path(pool_id): Path<PoolId>,
    Json(body): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<MemberEnvelope>)> {
    let request = body.member.into_db_request(project.0.clone(), pool_id)?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Members::new(conn, tenant).create(&request).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok((
        StatusCode::CREATED,
        Json(MemberEnvelope {
            member: written.entity.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/pools/{pool_id}/members/{member_id}",
    tag = "members",
    summary = "Get pool member",
    params(
        ("pool_id" = uuid::Uuid, Path, description = "Pool ID"),
        ("member_id" = uuid::Uuid, Path, description = "Member ID"),
    ),
    responses(
        (status = 200, description = "Member", body = MemberEnvelope),
        (status = 404, description = "Member not found in the pool"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_member(
    State(state): State<AppState>,
    project: Project,
    Path((pool_id, member_id)): Path<(PoolId, MemberId)>,
) -> Result<Json<MemberEnvelope>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let member = Members::new(&mut conn, project.tenant())
        .get_by_id((pool_id, member_id))
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Member".to_string(),
            id: member_id.to_string(),
        })?;

    Ok(Json(MemberEnvelope { member: member.into() }))
}

#[utoipa::path(
    put,
    path = "/pools/{pool_id}/members/{member_id}",
    tag = "members",
    summary = "Update pool member",
    request_body = UpdateMemberRequest,
    params(
        ("pool_id" = uuid::Uuid, Path, description = "Pool ID"),
        ("member_id" = uuid::Uuid, Path, description = "Member ID"),
    ),
    responses(
        (status = 200, description = "Member updated", body = MemberEnvelope),
        (status = 404, description = "Member or datacenter not found"),
        (status = 409, description = "Member is being deleted, or an attached domain is syncing"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_member(
    State(state): State<AppState>,
    project: Project,
    Path((pool_id, member_id)): Path<(PoolId, MemberId)>,
    Json(body): Json<UpdateMemberRequest>,
) -> Result<Json<MemberEnvelope>> {
    let request: MemberUpdateDBRequest = body.member.try_into()?;
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let request = request.clone();
            let tenant = tenant.clone();
            Box::pin(async move {
                Ok(Members::new(conn, tenant)
                    .update((pool_id, member_id), &request)
                    .await?)
            })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok(Json(MemberEnvelope {
        member: written.entity.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/pools/{pool_id}/members/{member_id}",
    tag = "members",
    summary = "Delete pool member",
    params(
        ("pool_id" = uuid::Uuid, Path, description = "Pool ID"),
        ("member_id" = uuid::Uuid, Path, description = "Member ID"),
    ),
    responses(
        (status = 204, description = "Deletion accepted"),
        (status = 404, description = "Member not found"),
        (status = 409, description = "Member is already being deleted, or an attached domain is syncing"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_member(
    State(state): State<AppState>,
    project: Project,
    Path((pool_id, member_id)): Path<(PoolId, MemberId)>,
) -> Result<StatusCode> {
    let tenant = project.tenant();

    let written = state
        .transaction(|conn| {
            let tenant = tenant.clone();
            Box::pin(async move { Ok(Members::new(conn, tenant).delete((pool_id, member_id)).await?) })
        })
        .await?;
    state.notifier.domains_changed(&written.domains).await;

    Ok(StatusCode::NO_CONTENT)
}
