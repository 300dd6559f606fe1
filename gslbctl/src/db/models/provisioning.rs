use crate::lifecycle::state::{AgentOutcome, EntityKind, ProvisioningStatus};
use uuid::Uuid;

/// An agent's report on one entity it tried to apply.
#[derive(Debug, Clone)]
pub struct AgentReportDBRequest {
    pub kind: EntityKind,
    pub id: Uuid,
    pub outcome: AgentOutcome,
}

/// What a report did to the stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReportDBResponse {
    pub kind: EntityKind,
    pub id: Uuid,
    /// Whether the report changed anything
    pub applied: bool,
    /// Status after the report; `None` once the row is gone
    pub provisioning_status: Option<ProvisioningStatus>,
    /// Why a report was refused
    pub reason: Option<String>,
}
