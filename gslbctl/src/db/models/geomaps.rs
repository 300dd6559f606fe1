use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Listable;
use crate::types::{DatacenterId, GeoMapId, ProjectId, Provider, Scope};
use chrono::{DateTime, Utc};

/// One country routed to a datacenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// ISO 3166-1 alpha-2, upper case
    pub country: String,
    pub datacenter: DatacenterId,
}

/// Database request for creating a new geographic map
#[derive(Debug, Clone)]
pub struct GeoMapCreateDBRequest {
    pub project_id: ProjectId,
    pub name: String,
    pub scope: Scope,
    pub provider: Provider,
    pub default_datacenter: DatacenterId,
    pub assignments: Vec<Assignment>,
}

/// Database request for updating a geographic map
#[derive(Debug, Clone, Default)]
pub struct GeoMapUpdateDBRequest {
    pub name: Option<String>,
    pub scope: Option<Scope>,
    pub default_datacenter: Option<DatacenterId>,
    /// Replaces every assignment when present
    pub assignments: Option<Vec<Assignment>>,
}

/// Database response for a geographic map
#[derive(Debug, Clone)]
pub struct GeoMapDBResponse {
    pub id: GeoMapId,
    pub project_id: ProjectId,
    pub name: String,
    pub scope: Scope,
    pub provider: Provider,
    pub default_datacenter: DatacenterId,
    pub assignments: Vec<Assignment>,
    pub provisioning_status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listable for GeoMapDBResponse {
    const TABLE: &'static str = "geographic_map";
    const SORTABLE_COLUMNS: &'static [&'static str] = &[
        "id",
        "created_at",
        "updated_at",
        "name",
        "scope",
        "provider",
        "provisioning_status",
    ];
}

impl GeoMapCreateDBRequest {
    /// Every datacenter the map references, default included, without duplicates.
    pub fn referenced_datacenters(&self) -> Vec<DatacenterId> {
        let mut ids: Vec<DatacenterId> = self.assignments.iter().map(|a| a.datacenter).collect();
        ids.push(self.default_datacenter);
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}
