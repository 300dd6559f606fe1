use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Listable;
use crate::types::{DomainId, DomainMode, PoolId, ProjectId, Provider, RecordType};
use chrono::{DateTime, Utc};

/// Database request for creating a new domain
#[derive(Debug, Clone)]
pub struct DomainCreateDBRequest {
    pub project_id: ProjectId,
    pub name: String,
    pub fqdn: String,
    pub provider: Provider,
    pub record_type: RecordType,
    pub mode: DomainMode,
    pub admin_state_up: bool,
    /// Pools to attach, all of which must belong to the project
    pub pools: Vec<PoolId>,
    /// Zone under which akamai domains receive their CNAME target
    pub cname_suffix: String,
}

/// Database request for updating a domain. The provider cannot be changed.
#[derive(Debug, Clone, Default)]
pub struct DomainUpdateDBRequest {
    pub name: Option<String>,
    pub fqdn: Option<String>,
    pub record_type: Option<RecordType>,
    pub mode: Option<DomainMode>,
    pub admin_state_up: Option<bool>,
    /// Replaces the attached pool set when present
    pub pools: Option<Vec<PoolId>>,
    pub cname_suffix: String,
}

/// Database response for a domain
#[derive(Debug, Clone)]
pub struct DomainDBResponse {
    pub id: DomainId,
    pub project_id: ProjectId,
    pub name: String,
    pub fqdn: String,
    pub provider: Provider,
    pub record_type: RecordType,
    pub mode: DomainMode,
    pub admin_state_up: bool,
    pub cname_target: Option<String>,
    pub status: String,
    pub provisioning_status: ProvisioningStatus,
    pub pools: Vec<PoolId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listable for DomainDBResponse {
    const TABLE: &'static str = "domain";
    const SORTABLE_COLUMNS: &'static [&'static str] = &[
        "id",
        "created_at",
        "updated_at",
        "name",
        "fqdn",
        "provider",
        "record_type",
        "mode",
        "admin_state_up",
        "status",
        "provisioning_status",
    ];
}

/// CNAME the provider expects clients to point at, if it hands one out.
///
/// Akamai serves every GTM property under its own zone, so the target is derived from the FQDN.
pub fn cname_target(provider: Provider, fqdn: &str, suffix: &str) -> Option<String> {
    match provider {
        Provider::Akamai => Some(format!("{}.{}", fqdn.trim_end_matches('.'), suffix.trim_matches('.'))),
        Provider::F5 => None,
    }
}
