//! API request/response models for datacenters.

use crate::db::models::datacenters::{DatacenterCreateDBRequest, DatacenterDBResponse, DatacenterUpdateDBRequest};
use crate::errors::Result;
use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Link;
use crate::types::{DatacenterId, ProjectId, Provider, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{bad_request, validate_name};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DatacenterCreate {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub state_or_province: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// `public` datacenters can be referenced by members and maps of every project
    #[serde(default)]
    pub scope: Scope,
    pub provider: Provider,
}

/// Changes to a datacenter. Location fields accept `null` to clear them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DatacenterUpdate {
    pub name: Option<String>,
    pub admin_state_up: Option<bool>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub continent: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub country: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub state_or_province: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub city: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f64>)]
    pub latitude: Option<Option<f64>>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f64>)]
    pub longitude: Option<Option<f64>>,
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDatacenterRequest {
    pub datacenter: DatacenterCreate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateDatacenterRequest {
    pub datacenter: DatacenterUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatacenterResponse {
    #[schema(value_type = String, format = "uuid")]
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

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatacenterEnvelope {
    pub datacenter: DatacenterResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatacenterList {
    pub datacenters: Vec<DatacenterResponse>,
    pub links: Vec<Link>,
}

fn default_true() -> bool {
    true
}

fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<()> {
    if latitude.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
        return Err(bad_request("latitude must be between -90 and 90"));
    }
    if longitude.is_some_and(|lon| !(-180.0..=180.0).contains(&lon)) {
        return Err(bad_request("longitude must be between -180 and 180"));
    }
    Ok(())
}

impl DatacenterCreate {
    pub fn into_db_request(self, project_id: ProjectId) -> Result<DatacenterCreateDBRequest> {
        validate_name(&self.name)?;
        validate_coordinates(self.latitude, self.longitude)?;
        Ok(DatacenterCreateDBRequest {
            project_id,
            name: self.name,
            admin_state_up: self.admin_state_up,
            continent: self.continent,
            country: self.country,
            state_or_province: self.state_or_province,
            city: self.city,
            latitude: self.latitude,
            longitude: self.longitude,
            scope: self.scope,
            provider: self.provider,
        })
    }
}

impl TryFrom<DatacenterUpdate> for DatacenterUpdateDBRequest {
    type Error = crate::errors::Error;

    fn try_from(update: DatacenterUpdate) -> Result<Self> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        validate_coordinates(update.latitude.flatten(), update.longitude.flatten())?;
        Ok(Self {
            name: update.name,
            admin_state_up: update.admin_state_up,
            continent: update.continent,
            country: update.country,
            state_or_province: update.state_or_province,
            city: update.city,
            latitude: update.latitude,
            longitude: update.longitude,
            scope: update.scope,
        })
    }
}

impl From<DatacenterDBResponse> for DatacenterResponse {
    fn from(db: DatacenterDBResponse) -> Self {
        Self {
            id: db.id,
            project_id: db.project_id,
            name: db.name,
            admin_state_up: db.admin_state_up,
            continent: db.continent,
            country: db.country,
            state_or_province: db.state_or_province,
            city: db.city,
            latitude: db.latitude,
            longitude: db.longitude,
            scope: db.scope,
            provider: db.provider,
            provisioning_status: db.provisioning_status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
