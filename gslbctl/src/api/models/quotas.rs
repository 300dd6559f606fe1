//! API request/response models for quota administration.

use crate::db::models::quotas::{QuotaDBResponse, QuotaLimits, QuotaUpdateDBRequest, QuotaUsage, UNLIMITED};
use crate::errors::Result;
use crate::pagination::Link;
use crate::types::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::bad_request;

/// Per-resource ceilings. `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuotaSet {
    pub domain_akamai: i64,
    pub domain_f5: i64,
    pub pool: i64,
    pub member: i64,
    pub monitor: i64,
    pub datacenter: i64,
}

impl From<QuotaLimits> for QuotaSet {
    fn from(limits: QuotaLimits) -> Self {
        Self {
            domain_akamai: limits.domain_akamai,
            domain_f5: limits.domain_f5,
            pool: limits.pool,
            member: limits.member,
            monitor: limits.monitor,
            datacenter: limits.datacenter,
        }
    }
}

impl From<QuotaUsage> for QuotaSet {
    fn from(usage: QuotaUsage) -> Self {
        Self {
            domain_akamai: usage.domain_akamai,
            domain_f5: usage.domain_f5,
            pool: usage.pool,
            member: usage.member,
            monitor: usage.monitor,
            datacenter: usage.datacenter,
        }
    }
}

/// New limits for a project; absent fields take the configured defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct QuotaUpdate {
    pub domain_akamai: Option<i64>,
    pub domain_f5: Option<i64>,
    pub pool: Option<i64>,
    pub member: Option<i64>,
    pub monitor: Option<i64>,
    pub datacenter: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateQuotaRequest {
    pub quota: QuotaUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuotaResponse {
    pub project_id: ProjectId,
    #[serde(flatten)]
    pub limits: QuotaSet,
    /// Live resources counting against the limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_use: Option<QuotaSet>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl QuotaResponse {
    pub fn from_defaults(project_id: ProjectId, defaults: QuotaLimits) -> Self {
        Self {
            project_id,
            limits: defaults.into(),
            in_use: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_usage(mut self, usage: QuotaUsage) -> Self {
        self.in_use = Some(usage.into());
        self
    }
}

impl From<QuotaDBResponse> for QuotaResponse {
    fn from(db: QuotaDBResponse) -> Self {
        Self {
            project_id: db.project_id,
            limits: db.limits.into(),
            in_use: None,
            created_at: Some(db.created_at),
            updated_at: Some(db.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuotaEnvelope {
    pub quota: QuotaResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuotaList {
    pub quotas: Vec<QuotaResponse>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuotaDefaults {
    pub quota: QuotaSet,
}

impl TryFrom<QuotaUpdate> for QuotaUpdateDBRequest {
    type Error = crate::errors::Error;

    fn try_from(update: QuotaUpdate) -> Result<Self> {
        let values = [
            ("domain_akamai", update.domain_akamai),
            ("domain_f5", update.domain_f5),
            ("pool", update.pool),
            ("member", update.member),
            ("monitor", update.monitor),
            ("datacenter", update.datacenter),
        ];
        for (field, value) in values {
            if value.is_some_and(|v| v < UNLIMITED) {
                return Err(bad_request(format!("{field} must be -1 (unlimited) or a non-negative count")));
            }
        }
        Ok(Self {
            domain_akamai: update.domain_akamai,
            domain_f5: update.domain_f5,
            pool: update.pool,
            member: update.member,
            monitor: update.monitor,
            datacenter: update.datacenter,
        })
    }
}
