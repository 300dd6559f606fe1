use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Listable;
use crate::types::{PoolId, ProjectId};
use chrono::{DateTime, Utc};

/// Database request for creating a new pool
#[derive(Debug, Clone)]
pub struct PoolCreateDBRequest {
    pub project_id: ProjectId,
    pub name: String,
    pub admin_state_up: bool,
}

/// Database request for updating a pool
#[derive(Debug, Clone, Default)]
pub struct PoolUpdateDBRequest {
    pub name: Option<String>,
    pub admin_state_up: Option<bool>,
}

/// Database response for a pool
#[derive(Debug, Clone)]
pub struct PoolDBResponse {
    pub id: PoolId,
    pub project_id: ProjectId,
    pub name: String,
    pub admin_state_up: bool,
    pub status: String,
    pub provisioning_status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listable for PoolDBResponse {
    const TABLE: &'static str = "pool";
    const SORTABLE_COLUMNS: &'static [&'static str] = &[
        "id",
        "created_at",
        "updated_at",
        "name",
        "admin_state_up",
        "status",
        "provisioning_status",
    ];
}
