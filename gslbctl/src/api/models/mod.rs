//! API request/response models.
//!
//! Bodies wrap the entity under its singular name (`{"pool": {...}}`) and lists under the plural
//! (`{"pools": [...], "links": [...]}`). Create and update payloads reject unknown fields; update
//! fields that may be cleared use `null` for "clear" and absence for "keep".

use crate::errors::{Error, Result};
use crate::pagination::PageRequest;
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use utoipa::IntoParams;

pub mod agent;
pub mod datacenters;
pub mod domains;
pub mod geomaps;
pub mod members;
pub mod monitors;
pub mod pools;
pub mod quotas;
pub mod sync;

/// Longest accepted `name` of any entity.
pub const MAX_NAME_LENGTH: usize = 255;

/// Keyset pagination parameters shared by every list endpoint.
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListQuery {
    /// Page size, clamped to the configured maximum
    #[param(minimum = 1)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub limit: Option<i64>,

    /// ID of the row the page starts after
    pub marker: Option<String>,

    /// Comma separated sort keys; prefix a key with `-` for descending order
    #[param(example = "-name,created_at")]
    pub sort: Option<String>,

    /// Walk backwards from the marker
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub page_reverse: Option<bool>,
}

impl ListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            limit: self.limit,
            marker: self.marker.clone(),
            sort: self.sort.clone(),
            page_reverse: self.page_reverse.unwrap_or(false),
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::BadRequest {
            message: format!("name must be at most {MAX_NAME_LENGTH} characters"),
        });
    }
    Ok(())
}

pub(crate) fn bad_request(message: impl Into<String>) -> Error {
    Error::BadRequest { message: message.into() }
}
