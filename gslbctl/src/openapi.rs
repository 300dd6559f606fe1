//! OpenAPI document for the control-plane API, served at `/api-docs/openapi.json`.

use crate::api;
use crate::api::extractors::PROJECT_HEADER;
use crate::lifecycle::state::{AgentOutcome, EntityKind, ProvisioningStatus};
use crate::pagination::Link;
use crate::types::{DomainMode, MonitorType, Provider, RecordType, Scope};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// The project header set by the authenticating proxy in front of the API.
struct ProjectAddon;

impl Modify for ProjectAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "ProjectHeader",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    PROJECT_HEADER,
                    "Project the request acts on behalf of. Set by the authenticating proxy.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&ProjectAddon),
    security(("ProjectHeader" = [])),
    paths(
        api::handlers::domains::list_domains,
        api::handlers::domains::create_domain,
        api::handlers::domains::get_domain,
        api::handlers::domains::update_domain,
        api::handlers::domains::delete_domain,
        api::handlers::pools::list_pools,
        api::handlers::pools::create_pool,
        api::handlers::pools::get_pool,
        api::handlers::pools::update_pool,
        api::handlers::pools::delete_pool,
        api::handlers::members::list_members,
        api::handlers::members::create_member,
        api::handlers::members::get_member,
        api::handlers::members::update_member,
        api::handlers::members::delete_member,
        api::handlers::monitors::list_monitors,
        api::handlers::monitors::create_monitor,
        api::handlers::monitors::get_monitor,
        api::handlers::monitors::update_monitor,
        api::handlers::monitors::delete_monitor,
        api::handlers::datacenters::list_datacenters,
        api::handlers::datacenters::create_datacenter,
        api::handlers::datacenters::get_datacenter,
        api::handlers::datacenters::update_datacenter,
        api::handlers::datacenters::delete_datacenter,
        api::handlers::geomaps::list_geomaps,
        api::handlers::geomaps::create_geomap,
        api::handlers::geomaps::get_geomap,
        api::handlers::geomaps::update_geomap,
        api::handlers::geomaps::delete_geomap,
        api::handlers::quotas::list_quotas,
        api::handlers::quotas::get_quota_defaults,
        api::handlers::quotas::get_quota,
        api::handlers::quotas::update_quota,
        api::handlers::quotas::delete_quota,
        api::handlers::sync::trigger_sync,
        api::handlers::agent::report_provisioning_status,
        api::handlers::agent::list_agent_domains,
        api::handlers::health::healthz,
    ),
    components(
        schemas(
            ProvisioningStatus,
            EntityKind,
            AgentOutcome,
            Provider,
            Scope,
            RecordType,
            DomainMode,
            MonitorType,
            Link,
            api::models::domains::DomainCreate,
            api::models::domains::DomainUpdate,
            api::models::domains::CreateDomainRequest,
            api::models::domains::UpdateDomainRequest,
            api::models::domains::DomainResponse,
            api::models::domains::DomainEnvelope,
            api::models::domains::DomainList,
            api::models::pools::PoolCreate,
            api::models::pools::PoolUpdate,
            api::models::pools::CreatePoolRequest,
            api::models::pools::UpdatePoolRequest,
            api::models::pools::PoolResponse,
            api::models::pools::PoolEnvelope,
            api::models::pools::PoolList,
            api::models::members::MemberCreate,
            api::models::members::MemberUpdate,
            api::models::members::CreateMemberRequest,
            api::models::members::UpdateMemberRequest,
            api::models::members::MemberResponse,
            api::models::members::MemberEnvelope,
            api::models::members::MemberList,
            api::models::monitors::MonitorCreate,
            api::models::monitors::MonitorUpdate,
            api::models::monitors::CreateMonitorRequest,
            api::models::monitors::UpdateMonitorRequest,
            api::models::monitors::MonitorResponse,
            api::models::monitors::MonitorEnvelope,
            api::models::monitors::MonitorList,
            api::models::datacenters::DatacenterCreate,
            api::models::datacenters::DatacenterUpdate,
            api::models::datacenters::CreateDatacenterRequest,
            api::models::datacenters::UpdateDatacenterRequest,
            api::models::datacenters::DatacenterResponse,
            api::models::datacenters::DatacenterEnvelope,
            api::models::datacenters::DatacenterList,
            api::models::geomaps::CountryAssignment,
            api::models::geomaps::GeoMapCreate,
            api::models::geomaps::GeoMapUpdate,
            api::models::geomaps::CreateGeoMapRequest,
            api::models::geomaps::UpdateGeoMapRequest,
            api::models::geomaps::GeoMapResponse,
            api::models::geomaps::GeoMapEnvelope,
            api::models::geomaps::GeoMapList,
            api::models::quotas::QuotaSet,
            api::models::quotas::QuotaUpdate,
            api::models::quotas::UpdateQuotaRequest,
            api::models::quotas::QuotaResponse,
            api::models::quotas::QuotaEnvelope,
            api::models::quotas::QuotaList,
            api::models::quotas::QuotaDefaults,
            api::models::sync::SyncRequest,
            api::models::sync::SyncAccepted,
            api::models::agent::AgentReport,
            api::models::agent::AgentReportRequest,
            api::models::agent::AgentReportResult,
            api::models::agent::AgentReportResponse,
            api::handlers::health::Health,
        )
    ),
    tags(
        (name = "domains", description = "Global names answered by the load balancers. Writes are accepted in a pending state and applied by the agents."),
        (name = "pools", description = "Groups of endpoints a domain balances across."),
        (name = "members", description = "Endpoints inside a pool."),
        (name = "monitors", description = "Health probes; at most one per pool."),
        (name = "datacenters", description = "Locations that members and geographic maps refer to."),
        (name = "geomaps", description = "Country to datacenter routing tables."),
        (name = "quotas", description = "Per-project resource limits. Not project scoped; intended for operators."),
        (name = "sync", description = "Ask the agents to re-read desired state."),
        (name = "agent", description = "Endpoints used by the provider agents."),
        (name = "health", description = "Liveness of the service and its database."),
    ),
    info(
        title = "gslbctl",
        description = "Desired-state API for multi-provider global server load balancing.",
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_resource() {
        let doc = ApiDoc::openapi();
        for path in [
            "/domains",
            "/domains/{domain_id}",
            "/pools/{pool_id}/members/{member_id}",
            "/geomaps/{geomap_id}",
            "/quotas/defaults",
            "/agent/provisioning-status",
            "/sync",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }

        let schemes = doc.components.expect("components").security_schemes;
        assert!(schemes.contains_key("ProjectHeader"));
    }
}
