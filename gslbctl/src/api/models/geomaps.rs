//! API request/response models for geographic maps.

use crate::db::models::geomaps::{Assignment, GeoMapCreateDBRequest, GeoMapDBResponse, GeoMapUpdateDBRequest};
use crate::errors::Result;
use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Link;
use crate::types::{DatacenterId, GeoMapId, ProjectId, Provider, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;

use super::{bad_request, validate_name};

/// One country routed to a datacenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CountryAssignment {
    /// ISO 3166-1 alpha-2 code
    #[schema(example = "DE")]
    pub country: String,
    #[schema(value_type = String, format = "uuid")]
    pub datacenter: DatacenterId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct GeoMapCreate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub scope: Scope,
    pub provider: Provider,
    /// Datacenter serving countries without an assignment
    #[schema(value_type = String, format = "uuid")]
    pub default_datacenter: DatacenterId,
    #[serde(default)]
    pub assignments: Vec<CountryAssignment>,
}

/// Changes to a map. `assignments`, when present, replaces every assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct GeoMapUpdate {
    pub name: Option<String>,
    pub scope: Option<Scope>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub default_datacenter: Option<DatacenterId>,
    pub assignments: Option<Vec<CountryAssignment>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateGeoMapRequest {
    pub geomap: GeoMapCreate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateGeoMapRequest {
    pub geomap: GeoMapUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoMapResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GeoMapId,
    pub project_id: ProjectId,
    pub name: String,
    pub scope: Scope,
    pub provider: Provider,
    #[schema(value_type = String, format = "uuid")]
    pub default_datacenter: DatacenterId,
    pub assignments: Vec<CountryAssignment>,
    pub provisioning_status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoMapEnvelope {
    pub geomap: GeoMapResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoMapList {
    pub geomaps: Vec<GeoMapResponse>,
    pub links: Vec<Link>,
}

/// Normalize country codes to upper case and reject malformed or repeated ones.
fn into_assignments(assignments: Vec<CountryAssignment>) -> Result<Vec<Assignment>> {
    let mut seen = HashSet::new();
    assignments
        .into_iter()
        .map(|a| {
            let country = a.country.trim().to_ascii_uppercase();
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(bad_request(format!("'{}' is not a two letter country code", a.country)));
            }
            if !seen.insert(country.clone()) {
                return Err(bad_request(format!("country {country} is assigned more than once")));
            }
            Ok(Assignment {
                country,
                datacenter: a.datacenter,
            })
        })
        .collect()
}

impl GeoMapCreate {
    pub fn into_db_request(self, project_id: ProjectId) -> Result<GeoMapCreateDBRequest> {
        validate_name(&self.name)?;
        Ok(GeoMapCreateDBRequest {
            project_id,
            name: self.name,
            scope: self.scope,
            provider: self.provider,
            default_datacenter: self.default_datacenter,
            assignments: into_assignments(self.assignments)?,
        })
    }
}

impl TryFrom<GeoMapUpdate> for GeoMapUpdateDBRequest {
    type Error = crate::errors::Error;

    fn try_from(update: GeoMapUpdate) -> Result<Self> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        Ok(Self {
            name: update.name,
            scope: update.scope,
            default_datacenter: update.default_datacenter,
            assignments: update.assignments.map(into_assignments).transpose()?,
        })
    }
}

impl From<GeoMapDBResponse> for GeoMapResponse {
    fn from(db: GeoMapDBResponse) -> Self {
        Self {
            id: db.id,
            project_id: db.project_id,
            name: db.name,
            scope: db.scope,
            provider: db.provider,
            default_datacenter: db.default_datacenter,
            assignments: db
                .assignments
                .into_iter()
                .map(|a| CountryAssignment {
                    country: a.country,
                    datacenter: a.datacenter,
                })
                .collect(),
            provisioning_status: db.provisioning_status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn assignment(country: &str) -> CountryAssignment {
        CountryAssignment {
            country: country.to_string(),
            datacenter: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_country_codes_are_normalized() {
        let assignments = into_assignments(vec![assignment("de"), assignment(" FR ")]).unwrap();
        assert_eq!(assignments[0].country, "DE");
        assert_eq!(assignments[1].country, "FR");
    }

    #[test]
    fn test_bad_or_repeated_country_is_rejected() {
        assert!(into_assignments(vec![assignment("DEU")]).is_err());
        assert!(into_assignments(vec![assignment("D1")]).is_err());
        assert!(into_assignments(vec![assignment("DE"), assignment("de")]).is_err());
    }
}
