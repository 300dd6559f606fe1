use crate::config::QuotaConfig;
use crate::pagination::Listable;
use crate::types::ProjectId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Value meaning "no ceiling" for a quota limit.
pub const UNLIMITED: i64 = -1;

/// Per-resource ceilings of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub domain_akamai: i64,
    pub domain_f5: i64,
    pub pool: i64,
    pub member: i64,
    pub monitor: i64,
    pub datacenter: i64,
}

impl From<&QuotaConfig> for QuotaLimits {
    fn from(config: &QuotaConfig) -> Self {
        Self {
            domain_akamai: config.domains_akamai,
            domain_f5: config.domains_f5,
            pool: config.pools,
            member: config.members,
            monitor: config.monitors,
            datacenter: config.datacenters,
        }
    }
}

/// Database request for setting a project's limits. Missing values take the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct QuotaUpdateDBRequest {
    pub domain_akamai: Option<i64>,
    pub domain_f5: Option<i64>,
    pub pool: Option<i64>,
    pub member: Option<i64>,
    pub monitor: Option<i64>,
    pub datacenter: Option<i64>,
}

impl QuotaUpdateDBRequest {
    pub fn resolve(&self, defaults: QuotaLimits) -> QuotaLimits {
        QuotaLimits {
            domain_akamai: self.domain_akamai.unwrap_or(defaults.domain_akamai),
            domain_f5: self.domain_f5.unwrap_or(defaults.domain_f5),
            pool: self.pool.unwrap_or(defaults.pool),
            member: self.member.unwrap_or(defaults.member),
            monitor: self.monitor.unwrap_or(defaults.monitor),
            datacenter: self.datacenter.unwrap_or(defaults.datacenter),
        }
    }
}

/// Database response for a project's quota row
#[derive(Debug, Clone)]
pub struct QuotaDBResponse {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub limits: QuotaLimits,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listable for QuotaDBResponse {
    const TABLE: &'static str = "quota";
    const SORTABLE_COLUMNS: &'static [&'static str] = &["id", "created_at", "updated_at", "project_id"];
}

/// Live resource counts of a project, excluding rows on their way out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaUsage {
    pub domain_akamai: i64,
    pub domain_f5: i64,
    pub pool: i64,
    pub member: i64,
    pub monitor: i64,
    pub datacenter: i64,
}
