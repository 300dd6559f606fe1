//! API request/response models for domains.

use crate::db::models::domains::{DomainCreateDBRequest, DomainDBResponse, DomainUpdateDBRequest};
use crate::errors::Result;
use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Link;
use crate::types::{DomainId, DomainMode, PoolId, ProjectId, Provider, RecordType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{bad_request, validate_name};

/// Longest name DNS can carry.
const MAX_FQDN_LENGTH: usize = 253;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DomainCreate {
    #[serde(default)]
    pub name: String,
    #[schema(example = "www.example.com")]
    pub fqdn: String,
    pub provider: Provider,
    #[serde(default)]
    pub record_type: RecordType,
    #[serde(default)]
    pub mode: DomainMode,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    /// Pools to attach; they must belong to the same project
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub pools: Vec<PoolId>,
}

/// Changes to a domain. `pools`, when present, replaces the attached set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DomainUpdate {
    pub name: Option<String>,
    pub fqdn: Option<String>,
    pub record_type: Option<RecordType>,
    pub mode: Option<DomainMode>,
    pub admin_state_up: Option<bool>,
    #[schema(value_type = Option<Vec<String>>)]
    pub pools: Option<Vec<PoolId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDomainRequest {
    pub domain: DomainCreate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateDomainRequest {
    pub domain: DomainUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: DomainId,
    pub project_id: ProjectId,
    pub name: String,
    pub fqdn: String,
    pub provider: Provider,
    pub record_type: RecordType,
    pub mode: DomainMode,
    pub admin_state_up: bool,
    /// Name clients should alias the FQDN to, for providers that serve their own zone
    pub cname_target: Option<String>,
    pub status: String,
    pub provisioning_status: ProvisioningStatus,
    #[schema(value_type = Vec<String>)]
    pub pools: Vec<PoolId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainEnvelope {
    pub domain: DomainResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainList {
    pub domains: Vec<DomainResponse>,
    pub links: Vec<Link>,
}

fn default_true() -> bool {
    true
}

/// Loose hostname check: dot separated labels of letters, digits, `-`, `_` and `*`.
pub(crate) fn validate_fqdn(fqdn: &str) -> Result<()> {
    let trimmed = fqdn.trim_end_matches('.');
    if trimmed.is_empty() || trimmed.len() > MAX_FQDN_LENGTH {
        return Err(bad_request("fqdn must be between 1 and 253 characters"));
    }
    let valid_label = |label: &str| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'*')
    };
    if !trimmed.split('.').all(valid_label) {
        return Err(bad_request(format!("invalid fqdn '{fqdn}'")));
    }
    Ok(())
}

fn dedup(mut pools: Vec<PoolId>) -> Vec<PoolId> {
    pools.sort_unstable();
    pools.dedup();
    pools
}

impl DomainCreate {
    pub fn into_db_request(self, project_id: ProjectId, cname_suffix: &str) -> Result<DomainCreateDBRequest> {
        validate_name(&self.name)?;
        validate_fqdn(&self.fqdn)?;
        Ok(DomainCreateDBRequest {
            project_id,
            name: self.name,
            fqdn: self.fqdn,
            provider: self.provider,
            record_type: self.record_type,
            mode: self.mode,
            admin_state_up: self.admin_state_up,
            pools: dedup(self.pools),
            cname_suffix: cname_suffix.to_string(),
        })
    }
}

impl DomainUpdate {
    pub fn into_db_request(self, cname_suffix: &str) -> Result<DomainUpdateDBRequest> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(fqdn) = &self.fqdn {
            validate_fqdn(fqdn)?;
        }
        Ok(DomainUpdateDBRequest {
            name: self.name,
            fqdn: self.fqdn,
            record_type: self.record_type,
            mode: self.mode,
            admin_state_up: self.admin_state_up,
            pools: self.pools.map(dedup),
            cname_suffix: cname_suffix.to_string(),
        })
    }
}

impl From<DomainDBResponse> for DomainResponse {
    fn from(db: DomainDBResponse) -> Self {
        Self {
            id: db.id,
            project_id: db.project_id,
            name: db.name,
            fqdn: db.fqdn,
            provider: db.provider,
            record_type: db.record_type,
            mode: db.mode,
            admin_state_up: db.admin_state_up,
            cname_target: db.cname_target,
            status: db.status,
            provisioning_status: db.provisioning_status,
            pools: db.pools,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
