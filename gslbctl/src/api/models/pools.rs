//! API request/response models for pools.

use crate::db::models::pools::{PoolCreateDBRequest, PoolDBResponse, PoolUpdateDBRequest};
use crate::errors::Result;
use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Link;
use crate::types::{PoolId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::validate_name;

/// Fields of a new pool
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PoolCreate {
    #[serde(default)]
    #[schema(example = "web-frontends")]
    pub name: String,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
}

/// Changes to a pool; absent fields are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PoolUpdate {
    pub name: Option<String>,
    pub admin_state_up: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePoolRequest {
    pub pool: PoolCreate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePoolRequest {
    pub pool: PoolUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PoolId,
    pub project_id: ProjectId,
    pub name: String,
    pub admin_state_up: bool,
    /// Aggregate health reported by the agents
    pub status: String,
    pub provisioning_status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolEnvelope {
    pub pool: PoolResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolList {
    pub pools: Vec<PoolResponse>,
    pub links: Vec<Link>,
}

fn default_true() -> bool {
    true
}

impl PoolCreate {
    pub fn into_db_request(self, project_id: ProjectId) -> Result<PoolCreateDBRequest> {
        validate_name(&self.name)?;
        Ok(PoolCreateDBRequest {
            project_id,
            name: self.name,
            admin_state_up: self.admin_state_up,
        })
    }
}

impl TryFrom<PoolUpdate> for PoolUpdateDBRequest {
    type Error = crate::errors::Error;

    fn try_from(update: PoolUpdate) -> Result<Self> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        Ok(Self {
            name: update.name,
            admin_state_up: update.admin_state_up,
        })
    }
}

impl From<PoolDBResponse> for PoolResponse {
    fn from(db: PoolDBResponse) -> Self {
        Self {
            id: db.id,
            project_id: db.project_id,
            name: db.name,
            admin_state_up: db.admin_state_up,
            status: db.status,
            provisioning_status: db.provisioning_status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
