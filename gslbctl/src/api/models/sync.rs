//! API request model for operator triggered resyncs.

use crate::types::DomainId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Domains to resync. Omit `domains` (or send `null`) to resync everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SyncRequest {
    #[schema(value_type = Option<Vec<String>>)]
    pub domains: Option<Vec<DomainId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncAccepted {
    /// Subject the notification was published on
    pub subject: String,
    #[schema(value_type = Option<Vec<String>>)]
    pub domains: Option<Vec<DomainId>>,
}
