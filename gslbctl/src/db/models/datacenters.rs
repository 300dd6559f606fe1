use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Listable;
use crate::types::{DatacenterId, ProjectId, Provider, Scope};
use chrono::{DateTime, Utc};

/// Database request for creating a new datacenter
#[derive(Debug, Clone)]
pub struct DatacenterCreateDBRequest {
    pub project_id: ProjectId,
    pub name: String,
    pub admin_state_up: bool,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub state_or_province: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub scope: Scope,
    pub provider: Provider,
}

/// Database request for updating a datacenter
#[derive(Debug, Clone, Default)]
pub struct DatacenterUpdateDBRequest {
    pub name: Option<String>,
    pub admin_state_up: Option<bool>,
    pub continent: Option<Option<String>>,
    pub country: Option<Option<String>>,
    pub state_or_province: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub latitude: Option<Option<f64>>,
    pub longitude: Option<Option<f64>>,
    pub scope: Option<Scope>,
}

/// Database response for a datacenter
#[derive(Debug, Clone)]
pub struct DatacenterDBResponse {
    pub id: DatacenterId,
    pub project_id: ProjectId,
    pub name: String,
    pub admin_state_up: bool,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub state_or_province: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub scope: Scope,
    pub provider: Provider,
    pub provisioning_status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listable for DatacenterDBResponse {
    const TABLE: &'static str = "datacenter";
    const SORTABLE_COLUMNS: &'static [&'static str] = &[
        "id",
        "created_at",
        "updated_at",
        "name",
        "scope",
        "provider",
        "admin_state_up",
        "provisioning_status",
    ];
}
