//! API request/response models for health monitors.

use crate::db::models::monitors::{MonitorCreateDBRequest, MonitorDBResponse, MonitorUpdateDBRequest};
use crate::errors::Result;
use crate::lifecycle::state::ProvisioningStatus;
use crate::pagination::Link;
use crate::types::{MonitorId, MonitorType, PoolId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

use super::{bad_request, validate_name};

const HTTP_METHODS: [&str; 5] = ["GET", "POST", "PUT", "HEAD", "OPTIONS"];

#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MonitorsQuery {
    /// Only the monitor of this pool
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    #[param(value_type = Option<String>, format = "uuid")]
    pub pool_id: Option<PoolId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MonitorCreate {
    #[schema(value_type = String, format = "uuid")]
    pub pool_id: PoolId,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub monitor_type: MonitorType,
    /// Seconds between probes
    #[serde(default = "default_seconds")]
    pub interval: i32,
    /// Seconds before a probe counts as failed
    #[serde(default = "default_seconds")]
    pub timeout: i32,
    pub send: Option<String>,
    pub receive: Option<String>,
    #[serde(default = "default_http_method")]
    pub http_method: String,
    pub domain_name: Option<String>,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
}

/// Changes to a monitor. The pool cannot be changed; `null` clears the optional probe fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MonitorUpdate {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub monitor_type: Option<MonitorType>,
    pub interval: Option<i32>,
    pub timeout: Option<i32>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub send: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub receive: Option<Option<String>>,
    pub http_method: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub domain_name: Option<Option<String>>,
    pub admin_state_up: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateMonitorRequest {
    pub monitor: MonitorCreate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateMonitorRequest {
    pub monitor: MonitorUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MonitorResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: MonitorId,
    pub project_id: ProjectId,
    #[schema(value_type = String, format = "uuid")]
    pub pool_id: PoolId,
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: MonitorType,
    pub interval: i32,
    pub timeout: i32,
    pub send: Option<String>,
    pub receive: Option<String>,
    pub http_method: String,
    pub domain_name: Option<String>,
    pub admin_state_up: bool,
    pub provisioning_status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MonitorEnvelope {
    pub monitor: MonitorResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MonitorList {
    pub monitors: Vec<MonitorResponse>,
    pub links: Vec<Link>,
}

fn default_true() -> bool {
    true
}

fn default_seconds() -> i32 {
    10
}

fn default_http_method() -> String {
    "GET".to_string()
}

fn validate_probe(interval: Option<i32>, timeout: Option<i32>, http_method: Option<&str>) -> Result<()> {
    if interval.is_some_and(|i| i < 1) {
        return Err(bad_request("interval must be at least 1 second"));
    }
    if timeout.is_some_and(|t| t < 1) {
        return Err(bad_request("timeout must be at least 1 second"));
    }
    if let Some(method) = http_method
        && !HTTP_METHODS.contains(&method)
    {
        return Err(bad_request(format!(
            "http_method must be one of {}",
            HTTP_METHODS.join(", ")
        )));
    }
    Ok(())
}

impl MonitorCreate {
    pub fn into_db_request(self, project_id: ProjectId) -> Result<MonitorCreateDBRequest> {
        validate_name(&self.name)?;
        validate_probe(Some(self.interval), Some(self.timeout), Some(&self.http_method))?;
        Ok(MonitorCreateDBRequest {
            project_id,
            pool_id: self.pool_id,
            name: self.name,
            monitor_type: self.monitor_type,
            interval: self.interval,
            timeout: self.timeout,
            send: self.send,
            receive: self.receive,
            http_method: self.http_method,
            domain_name: self.domain_name,
            admin_state_up: self.admin_state_up,
        })
    }
}

impl TryFrom<MonitorUpdate> for MonitorUpdateDBRequest {
    type Error = crate::errors::Error;

    fn try_from(update: MonitorUpdate) -> Result<Self> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        validate_probe(update.interval, update.timeout, update.http_method.as_deref())?;
        Ok(Self {
            name: update.name,
            monitor_type: update.monitor_type,
            interval: update.interval,
            timeout: update.timeout,
            send: update.send,
            receive: update.receive,
            http_method: update.http_method,
            domain_name: update.domain_name,
            admin_state_up: update.admin_state_up,
        })
    }
}

impl From<MonitorDBResponse> for MonitorResponse {
    fn from(db: MonitorDBResponse) -> Self {
        Self {
            id: db.id,
            project_id: db.project_id,
            pool_id: db.pool_id,
            name: db.name,
            monitor_type: db.monitor_type,
            interval: db.interval,
            timeout: db.timeout,
            send: db.send,
            receive: db.receive,
            http_method: db.http_method,
            domain_name: db.domain_name,
            admin_state_up: db.admin_state_up,
            provisioning_status: db.provisioning_status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
