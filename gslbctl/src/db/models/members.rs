use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Listable;
use crate::types::{DatacenterId, MemberId, PoolId, ProjectId};
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Database request for creating a new member
#[derive(Debug, Clone)]
pub struct MemberCreateDBRequest {
    pub project_id: ProjectId,
    pub pool_id: PoolId,
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub datacenter_id: Option<DatacenterId>,
    pub admin_state_up: bool,
}

/// Database request for updating a member. The owning pool is fixed at creation.
#[derive(Debug, Clone, Default)]
pub struct MemberUpdateDBRequest {
    pub name: Option<String>,
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
    /// `Some(None)` clears the datacenter
    pub datacenter_id: Option<Option<DatacenterId>>,
    pub admin_state_up: Option<bool>,
}

/// Database response for a member
#[derive(Debug, Clone)]
pub struct MemberDBResponse {
    pub id: MemberId,
    pub project_id: ProjectId,
    pub pool_id: PoolId,
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub datacenter_id: Option<DatacenterId>,
    pub admin_state_up: bool,
    pub status: String,
    pub provisioning_status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listable for MemberDBResponse {
    const TABLE: &'static str = "member";
    const SORTABLE_COLUMNS: &'static [&'static str] = &[
        "id",
        "created_at",
        "updated_at",
        "name",
        "address",
        "port",
        "admin_state_up",
        "status",
        "provisioning_status",
    ];
}
