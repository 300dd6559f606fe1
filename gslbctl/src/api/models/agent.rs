//! API models for the agent boundary: provisioning reports and the domain feed.

use crate::db::models::provisioning::{AgentReportDBRequest, AgentReportDBResponse};
use crate::lifecycle::state::{AgentOutcome, EntityKind, ProvisioningStatus};
use crate::types::Provider;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Outcome of applying one entity
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentReport {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub kind: EntityKind,
    pub outcome: AgentOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentReportRequest {
    pub reports: Vec<AgentReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentReportResult {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub kind: EntityKind,
    pub applied: bool,
    /// Status after the report; absent once the row has been removed
    pub provisioning_status: Option<ProvisioningStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentReportResponse {
    pub results: Vec<AgentReportResult>,
}

impl From<AgentReport> for AgentReportDBRequest {
    fn from(report: AgentReport) -> Self {
        Self {
            kind: report.kind,
            id: report.id,
            outcome: report.outcome,
        }
    }
}

impl From<AgentReportDBResponse> for AgentReportResult {
    fn from(db: AgentReportDBResponse) -> Self {
        Self {
            id: db.id,
            kind: db.kind,
            applied: db.applied,
            provisioning_status: db.provisioning_status,
            reason: db.reason,
        }
    }
}

/// Filters of the agent domain feed
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AgentDomainsQuery {
    /// Only domains programmed by this provider
    pub provider: Option<Provider>,

    /// Only domains waiting on an agent
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub pending: Option<bool>,
}
