//! Endpoints used by the provider agents.
//!
//! Agents work across projects, so nothing here is scoped by `X-Project-Id`.

use crate::api::extractors::RequestUrl;
use crate::api::models::ListQuery;
use crate::api::models::agent::{AgentDomainsQuery, AgentReportRequest, AgentReportResponse, AgentReportResult};
use crate::api::models::domains::DomainList;
use crate::db::handlers::{Domains, Provisioning, Repository, domains::DomainFilter};
use crate::db::models::domains::DomainDBResponse;
use crate::db::models::provisioning::AgentReportDBRequest;
use crate::errors::{Error, Result};
use crate::pagination::KeysetQuery;
use crate::{AppState, types::Tenant};
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(
    post,
    path = "/agent/provisioning-status",
    tag = "agent",
    summary = "Report provisioning outcomes",
    description = "Applies each report on its own. Reports for rows that are no longer pending are refused \
                   with `applied: false` rather than failing the batch.",
    request_body = AgentReportRequest,
    responses((status = 200, description = "Per-report result", body = AgentReportResponse))
)]
#[tracing::instrument(skip_all)]
pub async fn report_provisioning_status(
    State(state): State<AppState>,
    Json(body): Json<AgentReportRequest>,
) -> Result<Json<AgentReportResponse>> {
    let mut results = Vec::with_capacity(body.reports.len());
    for report in body.reports {
        let report = AgentReportDBRequest::from(report);
        let result = state
            .transaction(|conn| {
                let report = report.clone();
                Box::pin(async move { Ok(Provisioning::new(conn).apply_report(&report).await?) })
            })
            .await?;

        let outcome = if result.applied { "applied" } else { "refused" };
        metrics::counter!("gslbctl_agent_reports_total", "outcome" => outcome).increment(1);
        results.push(AgentReportResult::from(result));
    }

    Ok(Json(AgentReportResponse { results }))
}

#[utoipa::path(
    get,
    path = "/agent/domains",
    tag = "agent",
    summary = "List domains for agents",
    description = "Domains of every project with their attached pools, optionally narrowed to one provider \
                   and to those waiting on an agent.",
    params(ListQuery, AgentDomainsQuery),
    responses((status = 200, description = "One page of domains", body = DomainList))
)]
#[tracing::instrument(skip_all)]
pub async fn list_agent_domains(
    State(state): State<AppState>,
    RequestUrl(url): RequestUrl,
    Query(query): Query<ListQuery>,
    Query(filter): Query<AgentDomainsQuery>,
) -> Result<Json<DomainList>> {
    let keyset = KeysetQuery::new::<DomainDBResponse>(&query.page_request(), &state.pagination(), vec![])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let page = Domains::new(&mut conn, Tenant::Any)
        .list(&DomainFilter {
            query: keyset,
            provider: filter.provider,
            pending_only: filter.pending.unwrap_or(false),
        })
        .await?;

    Ok(Json(DomainList {
        links: page.links.render(&url),
        domains: page.items.into_iter().map(Into::into).collect(),
    }))
}
