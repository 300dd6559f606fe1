//! Database record models matching table schemas.
//!
//! Each entity has a create request, an update request and a response type. Rows are read into
//! private `FromRow` structs inside the repositories and converted into the response types here, so
//! text columns (statuses, providers, enums) are parsed exactly once.
//!
//! Response types implement [`crate::pagination::Listable`], which names the table and the columns
//! a caller may sort by when listing them.

pub mod datacenters;
pub mod domains;
pub mod geomaps;
pub mod members;
pub mod monitors;
pub mod pools;
pub mod provisioning;
pub mod quotas;
