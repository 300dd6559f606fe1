use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Listable;
use crate::types::{MonitorId, MonitorType, PoolId, ProjectId};
use chrono::{DateTime, Utc};

/// Database request for creating a new monitor
#[derive(Debug, Clone)]
pub struct MonitorCreateDBRequest {
    pub project_id: ProjectId,
    pub pool_id: PoolId,
    pub name: String,
    pub monitor_type: MonitorType,
    pub interval: i32,
    pub timeout: i32,
    pub send: Option<String>,
    pub receive: Option<String>,
    pub http_method: String,
    pub domain_name: Option<String>,
    pub admin_state_up: bool,
}

/// Database request for updating a monitor. The owning pool is fixed at creation.
#[derive(Debug, Clone, Default)]
pub struct MonitorUpdateDBRequest {
    pub name: Option<String>,
    pub monitor_type: Option<MonitorType>,
    pub interval: Option<i32>,
    pub timeout: Option<i32>,
    pub send: Option<Option<String>>,
    pub receive: Option<Option<String>>,
    pub http_method: Option<String>,
    pub domain_name: Option<Option<String>>,
    pub admin_state_up: Option<bool>,
}

/// Database response for a monitor
#[derive(Debug, Clone)]
pub struct MonitorDBResponse {
    pub id: MonitorId,
    pub project_id: ProjectId,
    pub pool_id: PoolId,
    pub name: String,
    pub monitor_type: MonitorType,
    pub interval: i32,
    pub timeout: i32,
    pub send: Option<String>,
    pub receive: Option<String>,
    pub http_method: String,
    pub domain_name: Option<String>,
    pub admin_state_up: bool,
    pub provisioning_status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listable for MonitorDBResponse {
    const TABLE: &'static str = "monitor";
    const SORTABLE_COLUMNS: &'static [&'static str] = &[
        "id",
        "created_at",
        "updated_at",
        "name",
        "interval_seconds",
        "timeout_seconds",
        "admin_state_up",
        "provisioning_status",
    ];
}
