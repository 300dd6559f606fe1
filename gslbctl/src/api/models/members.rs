//! API request/response models for pool members.

use crate::db::models::members::{MemberCreateDBRequest, MemberDBResponse, MemberUpdateDBRequest};
use crate::errors::Result;
use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Link;
use crate::types::{DatacenterId, MemberId, PoolId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use utoipa::ToSchema;

use super::validate_name;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MemberCreate {
    #[serde(default)]
    pub name: String,
    #[schema(value_type = String, example = "192.0.2.10")]
    pub address: IpAddr,
    #[schema(example = 443)]
    pub port: u16,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub datacenter_id: Option<DatacenterId>,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
}

/// Changes to a member. The owning pool cannot be changed; `datacenter_id: null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MemberUpdate {
    pub name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub datacenter_id: Option<Option<DatacenterId>>,
    pub admin_state_up: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateMemberRequest {
    pub member: MemberCreate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateMemberRequest {
    pub member: MemberUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: MemberId,
    pub project_id: ProjectId,
    #[schema(value_type = String, format = "uuid")]
    pub pool_id: PoolId,
    pub name: String,
    #[schema(value_type = String)]
    pub address: IpAddr,
    pub port: u16,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub datacenter_id: Option<DatacenterId>,
    pub admin_state_up: bool,
    pub status: String,
    pub provisioning_status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberEnvelope {
    pub member: MemberResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberList {
    pub members: Vec<MemberResponse>,
    pub links: Vec<Link>,
}

fn default_true() -> bool {
    true
}

impl MemberCreate {
    pub fn into_db_request(self, project_id: ProjectId, pool_id: PoolId) -> Result<MemberCreateDBRequest> {
        validate_name(&self.name)?;
        Ok(MemberCreateDBRequest {
            project_id,
            pool_id,
            name: self.name,
            address: self.address,
            port: self.port,
            datacenter_id: self.datacenter_id,
            admin_state_up: self.admin_state_up,
        })
    }
}

impl TryFrom<MemberUpdate> for MemberUpdateDBRequest {
    type Error = crate::errors::Error;

    fn try_from(update: MemberUpdate) -> Result<Self> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        Ok(Self {
            name: update.name,
            address: update.address,
            port: update.port,
            datacenter_id: update.datacenter_id,
            admin_state_up: update.admin_state_up,
        })
    }
}

impl From<MemberDBResponse> for MemberResponse {
    fn from(db: MemberDBResponse) -> Self {
        Self {
            id: db.id,
            project_id: db.project_id,
            pool_id: db.pool_id,
            name: db.name,
            address: db.address,
            port: db.port,
            datacenter_id: db.datacenter_id,
            admin_state_up: db.admin_state_up,
            status: db.status,
            provisioning_status: db.provisioning_status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let keep: MemberUpdate = serde_json::from_value(json!({"port": 8080})).unwrap();
        assert_eq!(keep.datacenter_id, None);

        let clear: MemberUpdate = serde_json::from_value(json!({"datacenter_id": null})).unwrap();
        assert_eq!(clear.datacenter_id, Some(None));
    }

    #[test]
    fn test_pool_cannot_be_moved() {
        let result: std::result::Result<MemberUpdate, _> =
            serde_json::from_value(json!({"pool_id": "6f0c1a52-64c1-4f3e-a3d4-9d1fd1c0b7a1"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_port_range_is_enforced_by_type() {
        let result: std::result::Result<MemberCreate, _> =
            serde_json::from_value(json!({"address": "10.0.0.1", "port": 70000}));
        assert!(result.is_err());
    }
}
